use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::warn;

use super::tokenizer::{self, Token, TokenKind, KNOWN_DIRECTIVES};
use super::{Config, LocationBlock, ServerBlock};

const VALID_EXTENSIONS: &[&str] = &[".conf", ".cfg", ".config"];

const SERVER_DIRECTIVES: &[&str] = &[
    "listen",
    "port",
    "host",
    "server_name",
    "root",
    "index",
    "error_page",
    "client_max_body_size",
    "cgi_path",
    "cgi_ext",
];

const LOCATION_DIRECTIVES: &[&str] = &[
    "root",
    "index",
    "autoindex",
    "allow_methods",
    "methods",
    "return",
    "cgi_path",
    "cgi_ext",
    "error_page",
    "client_max_body_size",
];

/// Load and validate a configuration file.
pub fn load(path: &Path) -> Result<Config> {
    validate_file(path)?;
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let mut tokens = tokenizer::tokenize(&content)?;
    tokenizer::classify(&mut tokens);
    let mut config = parse_tokens(&tokens)?;
    config.config_path = path.to_path_buf();
    Ok(config)
}

/// Pre-checks before any parsing: the file must exist, be a regular file
/// with a recognized extension and contain something besides whitespace.
fn validate_file(path: &Path) -> Result<()> {
    if !path.exists() {
        bail!("config file does not exist: {}", path.display());
    }
    if !path.is_file() {
        bail!("config path is not a regular file: {}", path.display());
    }
    let name = path.to_string_lossy();
    if !VALID_EXTENSIONS.iter().any(|ext| name.ends_with(ext)) {
        bail!("unsupported config file extension: {}", path.display());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    if content.trim().is_empty() {
        bail!("config file is empty: {}", path.display());
    }
    Ok(())
}

fn parse_tokens(tokens: &[Token]) -> Result<Config> {
    let mut config = Config::default();
    let mut pos = 0;
    while pos < tokens.len() && tokens[pos].kind != TokenKind::Eof {
        if tokens[pos].kind == TokenKind::Keyword && tokens[pos].text == "server" {
            let server = parse_server_block(tokens, &mut pos)?;
            config.servers.push(server);
        } else {
            warn!(
                token = %tokens[pos].text,
                line = tokens[pos].line,
                "Unexpected token at top level of config, skipping"
            );
            pos += 1;
        }
    }
    if config.servers.is_empty() {
        bail!("config defines no server blocks");
    }
    validate_config(&config)?;
    Ok(config)
}

fn parse_server_block(tokens: &[Token], pos: &mut usize) -> Result<ServerBlock> {
    let opening_line = tokens[*pos].line;
    *pos += 1; // consume "server"
    expect(tokens, pos, TokenKind::OpenBrace, "'{' after 'server'")?;

    let mut server = ServerBlock::default();
    while *pos < tokens.len() && tokens[*pos].kind != TokenKind::CloseBrace {
        if tokens[*pos].kind != TokenKind::Keyword {
            bail!(
                "config parse error on line {}: expected a directive keyword, found '{}'",
                tokens[*pos].line,
                tokens[*pos].text
            );
        }
        if tokens[*pos].text == "location" {
            let location = parse_location_block(&server, tokens, pos)?;
            server.locations.push(location);
        } else {
            parse_server_directive(&mut server, tokens, pos)?;
        }
    }
    expect(tokens, pos, TokenKind::CloseBrace, "'}' closing 'server' block")?;

    if !server.locations.iter().any(|l| l.path == "/") {
        bail!(
            "config parse error: server block starting on line {opening_line} has no '/' location"
        );
    }
    if server.cgi_ext.len() != server.cgi_path.len() {
        bail!(
            "config parse error: server block starting on line {opening_line} has {} cgi_ext entries but {} cgi_path entries",
            server.cgi_ext.len(),
            server.cgi_path.len()
        );
    }
    Ok(server)
}

fn parse_location_block(
    parent: &ServerBlock,
    tokens: &[Token],
    pos: &mut usize,
) -> Result<LocationBlock> {
    let opening_line = tokens[*pos].line;
    *pos += 1; // consume "location"

    let mut location = LocationBlock::inheriting(parent);
    if *pos < tokens.len() && tokens[*pos].kind == TokenKind::Value {
        location.path = tokens[*pos].text.clone();
        *pos += 1;
    } else {
        bail!("config parse error on line {opening_line}: expected a path for location block");
    }
    expect(tokens, pos, TokenKind::OpenBrace, "'{' after location path")?;

    while *pos < tokens.len() && tokens[*pos].kind != TokenKind::CloseBrace {
        if tokens[*pos].kind != TokenKind::Keyword {
            bail!(
                "config parse error on line {}: expected a directive keyword, found '{}'",
                tokens[*pos].line,
                tokens[*pos].text
            );
        }
        parse_location_directive(&mut location, tokens, pos)?;
    }
    expect(tokens, pos, TokenKind::CloseBrace, "'}' closing 'location' block")?;

    if location.cgi_ext.len() != location.cgi_path.len() {
        bail!(
            "config parse error: location '{}' has {} cgi_ext entries but {} cgi_path entries",
            location.path,
            location.cgi_ext.len(),
            location.cgi_path.len()
        );
    }
    Ok(location)
}

fn parse_server_directive(server: &mut ServerBlock, tokens: &[Token], pos: &mut usize) -> Result<()> {
    let keyword = tokens[*pos].clone();
    *pos += 1;
    let values = take_values(&keyword, tokens, pos)?;

    if !KNOWN_DIRECTIVES.contains(&keyword.text.as_str()) {
        warn!(
            directive = %keyword.text,
            line = keyword.line,
            "Unknown directive, ignoring"
        );
        return Ok(());
    }
    if !SERVER_DIRECTIVES.contains(&keyword.text.as_str()) {
        bail!(
            "config parse error on line {}: directive '{}' not allowed in server context",
            keyword.line,
            keyword.text
        );
    }

    match keyword.text.as_str() {
        "listen" | "port" => {
            let raw = first_value(&keyword, &values)?;
            server.port = parse_port(raw, keyword.line)?;
        }
        "host" => server.host = first_value(&keyword, &values)?.to_string(),
        "server_name" => server.server_names = values,
        "root" => server.root = first_value(&keyword, &values)?.to_string(),
        "index" => server.index = first_value(&keyword, &values)?.to_string(),
        "client_max_body_size" => {
            server.client_max_body_size =
                parse_body_size(first_value(&keyword, &values)?, keyword.line)?;
        }
        "error_page" => {
            let (code, page) = parse_error_page(&keyword, &values)?;
            server.error_pages.insert(code, page);
        }
        "cgi_path" => server.cgi_path = values,
        "cgi_ext" => server.cgi_ext = values,
        _ => unreachable!("directive list and match arms diverged"),
    }
    Ok(())
}

fn parse_location_directive(
    location: &mut LocationBlock,
    tokens: &[Token],
    pos: &mut usize,
) -> Result<()> {
    let keyword = tokens[*pos].clone();
    *pos += 1;
    let values = take_values(&keyword, tokens, pos)?;

    if !KNOWN_DIRECTIVES.contains(&keyword.text.as_str()) {
        warn!(
            directive = %keyword.text,
            line = keyword.line,
            "Unknown directive, ignoring"
        );
        return Ok(());
    }
    if !LOCATION_DIRECTIVES.contains(&keyword.text.as_str()) {
        bail!(
            "config parse error on line {}: directive '{}' not allowed in location context",
            keyword.line,
            keyword.text
        );
    }

    match keyword.text.as_str() {
        "root" => location.root = first_value(&keyword, &values)?.to_string(),
        "index" => location.index = first_value(&keyword, &values)?.to_string(),
        "autoindex" => {
            let flag = first_value(&keyword, &values)?;
            location.autoindex = flag == "on" || flag == "true";
        }
        "allow_methods" | "methods" => location.allowed_methods = values,
        "return" => location.redirect_url = first_value(&keyword, &values)?.to_string(),
        "client_max_body_size" => {
            location.client_max_body_size =
                parse_body_size(first_value(&keyword, &values)?, keyword.line)?;
        }
        "error_page" => {
            let (code, page) = parse_error_page(&keyword, &values)?;
            location.error_pages.insert(code, page);
        }
        "cgi_path" => location.cgi_path = values,
        "cgi_ext" => location.cgi_ext = values,
        _ => unreachable!("directive list and match arms diverged"),
    }
    Ok(())
}

/// Consume a directive's values up to and including the trailing semicolon.
fn take_values(keyword: &Token, tokens: &[Token], pos: &mut usize) -> Result<Vec<String>> {
    let mut values = Vec::new();
    while *pos < tokens.len() && tokens[*pos].kind == TokenKind::Value {
        values.push(tokens[*pos].text.clone());
        *pos += 1;
    }
    if *pos >= tokens.len() || tokens[*pos].kind != TokenKind::Semicolon {
        bail!(
            "config parse error on line {}: directive '{}' must end with ';'",
            keyword.line,
            keyword.text
        );
    }
    *pos += 1; // consume ';'
    Ok(values)
}

fn expect(tokens: &[Token], pos: &mut usize, kind: TokenKind, what: &str) -> Result<()> {
    if *pos >= tokens.len() || tokens[*pos].kind != kind {
        let line = tokens
            .get(*pos)
            .or_else(|| tokens.last())
            .map_or(0, |t| t.line);
        bail!("config parse error on line {line}: expected {what}");
    }
    *pos += 1;
    Ok(())
}

fn first_value<'a>(keyword: &Token, values: &'a [String]) -> Result<&'a str> {
    values.first().map(String::as_str).ok_or_else(|| {
        anyhow::anyhow!(
            "config parse error on line {}: directive '{}' requires a value",
            keyword.line,
            keyword.text
        )
    })
}

fn parse_port(value: &str, line: usize) -> Result<u16> {
    match value.parse::<u32>() {
        Ok(port) if (1..=65535).contains(&port) => Ok(port as u16),
        _ => bail!("config parse error on line {line}: port must be between 1 and 65535, got '{value}'"),
    }
}

/// `client_max_body_size` value with optional `K`/`M` suffix.
fn parse_body_size(value: &str, line: usize) -> Result<usize> {
    if value.is_empty() {
        bail!("config parse error on line {line}: empty body size value");
    }
    let (number, multiplier) = match value.as_bytes()[value.len() - 1] {
        b'K' | b'k' => (&value[..value.len() - 1], 1024),
        b'M' | b'm' => (&value[..value.len() - 1], 1024 * 1024),
        _ => (value, 1),
    };
    match number.parse::<usize>() {
        Ok(size) => Ok(size * multiplier),
        Err(_) => bail!("config parse error on line {line}: invalid body size '{value}'"),
    }
}

fn parse_error_page(keyword: &Token, values: &[String]) -> Result<(u16, String)> {
    if values.len() < 2 {
        bail!(
            "config parse error on line {}: error_page requires a status code and a path",
            keyword.line
        );
    }
    let code = values[0].parse::<u16>().with_context(|| {
        format!(
            "config parse error on line {}: invalid error_page status '{}'",
            keyword.line, values[0]
        )
    })?;
    Ok((code, values[1].clone()))
}

/// Cross-server validation: no two blocks may share `(port, server_name)`.
fn validate_config(config: &Config) -> Result<()> {
    let mut seen: HashSet<(u16, &str)> = HashSet::new();
    for server in &config.servers {
        for name in &server.server_names {
            if !seen.insert((server.port, name.as_str())) {
                bail!(
                    "config parse error: duplicate server block for port {} and server_name {}",
                    server.port,
                    name
                );
            }
        }
    }
    Ok(())
}
