use anyhow::{bail, Result};

/// Directive names the parser understands. Anything else tokenizes as a
/// keyword by position and is warned about at parse time.
pub(crate) const KNOWN_DIRECTIVES: &[&str] = &[
    "http",
    "server",
    "location",
    "include",
    "worker_processes",
    "worker_connections",
    "sendfile",
    "listen",
    "port",
    "host",
    "server_name",
    "root",
    "index",
    "error_page",
    "client_max_body_size",
    "autoindex",
    "allow_methods",
    "methods",
    "cgi_pass",
    "return",
    "cgi_path",
    "cgi_ext",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Keyword,
    Value,
    OpenBrace,
    CloseBrace,
    Semicolon,
    Unknown,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, line: usize) -> Self {
        Token {
            kind,
            text: text.into(),
            line,
        }
    }
}

/// Split configuration text into tokens. `#` comments run to end of line;
/// single- and double-quoted strings accept `\`-escapes.
pub fn tokenize(content: &str) -> Result<Vec<Token>> {
    let bytes = content.as_bytes();
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'\n' => {
                line += 1;
                i += 1;
            }
            _ if b.is_ascii_whitespace() => {
                i += 1;
            }
            b'#' => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'{' => {
                tokens.push(Token::new(TokenKind::OpenBrace, "{", line));
                i += 1;
            }
            b'}' => {
                tokens.push(Token::new(TokenKind::CloseBrace, "}", line));
                i += 1;
            }
            b';' => {
                tokens.push(Token::new(TokenKind::Semicolon, ";", line));
                i += 1;
            }
            b'"' | b'\'' => {
                let quote = b;
                i += 1;
                let mut value: Vec<u8> = Vec::new();
                loop {
                    if i >= bytes.len() {
                        bail!("config tokenizer: unterminated string literal on line {line}");
                    }
                    if bytes[i] == quote {
                        i += 1;
                        break;
                    }
                    if bytes[i] == b'\\' && i + 1 < bytes.len() {
                        i += 1;
                    }
                    if bytes[i] == b'\n' {
                        line += 1;
                    }
                    value.push(bytes[i]);
                    i += 1;
                }
                let value = String::from_utf8_lossy(&value).into_owned();
                tokens.push(Token::new(TokenKind::Unknown, value, line));
            }
            _ => {
                let start = i;
                while i < bytes.len()
                    && !bytes[i].is_ascii_whitespace()
                    && !matches!(bytes[i], b'{' | b'}' | b';' | b'#')
                {
                    i += 1;
                }
                tokens.push(Token::new(TokenKind::Unknown, &content[start..i], line));
            }
        }
    }
    tokens.push(Token::new(TokenKind::Eof, "EOF", line));
    Ok(tokens)
}

/// Classify bare words as keywords or values: a word opening a statement
/// (first token, or following `;`, `{` or `}`) is a keyword, the rest are
/// values.
pub fn classify(tokens: &mut [Token]) {
    for i in 0..tokens.len() {
        if tokens[i].kind != TokenKind::Unknown {
            continue;
        }
        let starts_statement = i == 0
            || matches!(
                tokens[i - 1].kind,
                TokenKind::Semicolon | TokenKind::OpenBrace | TokenKind::CloseBrace
            );
        if KNOWN_DIRECTIVES.contains(&tokens[i].text.as_str()) || starts_statement {
            tokens[i].kind = TokenKind::Keyword;
        } else {
            tokens[i].kind = TokenKind::Value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Vec<Token> {
        let mut tokens = tokenize(input).unwrap();
        classify(&mut tokens);
        tokens
    }

    #[test]
    fn test_basic_directive() {
        let tokens = lex("listen 8080;");
        assert_eq!(tokens[0].kind, TokenKind::Keyword);
        assert_eq!(tokens[0].text, "listen");
        assert_eq!(tokens[1].kind, TokenKind::Value);
        assert_eq!(tokens[1].text, "8080");
        assert_eq!(tokens[2].kind, TokenKind::Semicolon);
        assert_eq!(tokens[3].kind, TokenKind::Eof);
    }

    #[test]
    fn test_comments_are_skipped() {
        let tokens = lex("# a comment\nroot /var/www; # trailing\n");
        assert_eq!(tokens[0].text, "root");
        assert_eq!(tokens[1].text, "/var/www");
        assert_eq!(tokens.len(), 4);
    }

    #[test]
    fn test_quoted_value_with_escape() {
        let tokens = lex(r#"server_name "my \"host\"";"#);
        assert_eq!(tokens[1].kind, TokenKind::Value);
        assert_eq!(tokens[1].text, r#"my "host""#);
    }

    #[test]
    fn test_unterminated_string_fails() {
        assert!(tokenize("server_name \"oops;").is_err());
    }

    #[test]
    fn test_line_numbers() {
        let tokens = lex("server {\n  listen 80;\n}\n");
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[2].line, 2);
        let close = tokens.iter().find(|t| t.kind == TokenKind::CloseBrace).unwrap();
        assert_eq!(close.line, 3);
    }
}
