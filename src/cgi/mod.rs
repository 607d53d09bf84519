//! # CGI Module
//!
//! The CGI/1.1 gateway: resolve the script and its interpreter from the
//! location's `cgi_ext`/`cgi_path` pairs, run the interpreter as a child
//! process with piped stdin/stdout, feed it the request body, drain its
//! stdout under a wall-clock deadline, and parse the CGI document it
//! produces into a response.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use std::os::fd::AsRawFd;

use tracing::{error, info, warn};

use crate::config::LocationBlock;
use crate::http::{HttpRequest, HttpResponse, Method};
use crate::server::socket;

/// Wall-clock deadline for one CGI execution.
pub const CGI_TIMEOUT: Duration = Duration::from_secs(30);

/// Sleep between non-blocking drain attempts while the child runs.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

const READ_CHUNK: usize = 4096;

/// Does this target route to CGI? True when the location maps extensions
/// and the file (or, for a directory, its index file) carries one of them.
#[must_use]
pub fn qualifies(file_path: &Path, location: &LocationBlock) -> bool {
    if location.cgi_ext.is_empty() {
        return false;
    }
    let script: PathBuf = if file_path.is_dir() {
        if location.index.is_empty() {
            return false;
        }
        let index_path = file_path.join(&location.index);
        if !index_path.is_file() {
            return false;
        }
        index_path
    } else {
        file_path.to_path_buf()
    };
    match dotted_extension(&script) {
        Some(ext) => location.cgi_ext.iter().any(|e| *e == ext),
        None => false,
    }
}

/// Extension including the dot, to match `cgi_ext` entries like `.py`.
fn dotted_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
}

/// Executes CGI scripts with a configurable deadline.
pub struct CgiGateway {
    timeout: Duration,
}

impl Default for CgiGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl CgiGateway {
    #[must_use]
    pub fn new() -> Self {
        CgiGateway {
            timeout: CGI_TIMEOUT,
        }
    }

    /// Deadline override, used by tests to keep timeout runs short.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        CgiGateway { timeout }
    }

    /// Run the script behind `file_path` and turn its output into a
    /// response. Spawn failures map to 500, a blown deadline to 504.
    pub fn execute(
        &self,
        request: &HttpRequest,
        location: &LocationBlock,
        file_path: &Path,
    ) -> HttpResponse {
        let script_path = match resolve_script(file_path, location) {
            Ok(path) => path,
            Err(response) => return *response,
        };
        let Some(interpreter) = interpreter_for(&script_path, location) else {
            error!(script = %script_path.display(), "No interpreter configured for script");
            return HttpResponse::error(500, "No interpreter configured for script");
        };

        let env = build_environment(request, &script_path);
        let mut child = match Command::new(&interpreter)
            .arg(&script_path)
            .env_clear()
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                error!(interpreter = %interpreter, error = %e, "Failed to spawn CGI process");
                return HttpResponse::error(500, "Failed to spawn CGI process");
            }
        };
        info!(
            script = %script_path.display(),
            interpreter = %interpreter,
            pid = child.id(),
            "CGI process started"
        );

        // Feed the body and close the child's stdin so it sees EOF.
        if let Some(mut stdin) = child.stdin.take() {
            if !request.body().is_empty() {
                if let Err(e) = stdin.write_all(request.body()) {
                    warn!(error = %e, "Failed to write request body to CGI stdin");
                }
            }
        }

        let output = match self.drain_output(&mut child) {
            Ok(bytes) => bytes,
            Err(response) => return *response,
        };

        if let Err(e) = child.wait() {
            warn!(error = %e, "Failed to reap CGI child");
        }

        if output.is_empty() {
            error!(script = %script_path.display(), "CGI produced no output");
            return HttpResponse::error(500, "CGI execution failed");
        }
        parse_output(&output)
    }

    /// Non-blocking reads interleaved with `try_wait` polls; SIGKILL and
    /// 504 once the deadline passes with the child still alive.
    fn drain_output(&self, child: &mut Child) -> Result<Vec<u8>, Box<HttpResponse>> {
        let Some(mut stdout) = child.stdout.take() else {
            kill_and_reap(child);
            return Err(Box::new(HttpResponse::error(500, "CGI stdout unavailable")));
        };
        if let Err(e) = socket::set_nonblocking(stdout.as_raw_fd()) {
            warn!(error = %e, "Failed to set CGI output pipe non-blocking");
        }

        let started = Instant::now();
        let mut output = Vec::new();
        let mut buf = [0u8; READ_CHUNK];
        let mut exited = false;

        loop {
            if !exited && started.elapsed() >= self.timeout {
                match child.try_wait() {
                    Ok(Some(_)) => exited = true,
                    _ => {
                        error!(pid = child.id(), "CGI deadline reached, killing child");
                        kill_and_reap(child);
                        return Err(Box::new(HttpResponse::error(504, "CGI script timed out")));
                    }
                }
            }
            match stdout.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => output.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if exited {
                        break;
                    }
                    match child.try_wait() {
                        Ok(Some(_)) => exited = true,
                        Ok(None) => std::thread::sleep(POLL_INTERVAL),
                        Err(e) => {
                            error!(error = %e, "Failed to poll CGI child");
                            kill_and_reap(child);
                            return Err(Box::new(HttpResponse::error(500, "CGI execution failed")));
                        }
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    error!(error = %e, "Failed to read CGI output");
                    break;
                }
            }
        }
        Ok(output)
    }
}

fn kill_and_reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        warn!(error = %e, "Failed to kill CGI child");
    }
    if let Err(e) = child.wait() {
        warn!(error = %e, "Failed to reap CGI child");
    }
}

/// A directory target resolves through its index file; the final script
/// must be a regular file.
fn resolve_script(
    file_path: &Path,
    location: &LocationBlock,
) -> Result<PathBuf, Box<HttpResponse>> {
    let script = if file_path.is_dir() {
        if location.index.is_empty() {
            return Err(Box::new(HttpResponse::error(
                404,
                "Directory access not allowed",
            )));
        }
        let index_path = file_path.join(&location.index);
        if !index_path.is_file() {
            return Err(Box::new(HttpResponse::error(
                404,
                format!("Index file not found: {}", location.index),
            )));
        }
        index_path
    } else {
        file_path.to_path_buf()
    };
    if !script.is_file() {
        return Err(Box::new(HttpResponse::error(
            404,
            format!("CGI script not found: {}", script.display()),
        )));
    }
    Ok(script)
}

/// Interpreter from the pairwise-aligned `cgi_ext` / `cgi_path` tables.
fn interpreter_for(script_path: &Path, location: &LocationBlock) -> Option<String> {
    let extension = dotted_extension(script_path)?;
    location
        .cgi_ext
        .iter()
        .zip(location.cgi_path.iter())
        .find(|(ext, _)| **ext == extension)
        .map(|(_, path)| path.clone())
}

/// CGI/1.1 environment subset.
fn build_environment(request: &HttpRequest, script_path: &Path) -> Vec<(String, String)> {
    let mut env: Vec<(String, String)> = vec![
        ("GATEWAY_INTERFACE".into(), "CGI/1.1".into()),
        ("REQUEST_METHOD".into(), request.method_raw().to_string()),
        ("SCRIPT_NAME".into(), request.target().to_string()),
        (
            "SCRIPT_FILENAME".into(),
            script_path.to_string_lossy().into_owned(),
        ),
        ("SERVER_PROTOCOL".into(), "HTTP/1.1".into()),
        ("SERVER_SOFTWARE".into(), "WebServ/1.0".into()),
        ("REDIRECT_STATUS".into(), "200".into()),
        ("REMOTE_ADDR".into(), "127.0.0.1".into()),
        ("PATH_INFO".into(), String::new()),
    ];

    let query = match request.target().find('?') {
        Some(pos) => request.target()[pos + 1..].to_string(),
        None => String::new(),
    };
    env.push(("QUERY_STRING".into(), query));

    if let Some(host) = request.header("host") {
        match host.split_once(':') {
            Some((name, port)) => {
                env.push(("SERVER_NAME".into(), name.to_string()));
                env.push(("SERVER_PORT".into(), port.to_string()));
            }
            None => {
                env.push(("SERVER_NAME".into(), host.to_string()));
                env.push(("SERVER_PORT".into(), "80".into()));
            }
        }
    }

    if request.method() == Method::Post {
        env.push(("CONTENT_LENGTH".into(), request.body().len().to_string()));
        if let Some(content_type) = request.header("content-type") {
            env.push(("CONTENT_TYPE".into(), content_type.to_string()));
        }
    }

    if let Some(agent) = request.header("user-agent") {
        env.push(("HTTP_USER_AGENT".into(), agent.to_string()));
    }
    if let Some(accept) = request.header("accept") {
        env.push(("HTTP_ACCEPT".into(), accept.to_string()));
    }

    env
}

/// Parse a CGI document: headers, an empty line (CRLFCRLF or LFLF), then
/// the body. `Status:` sets the response status, `Content-Type` its
/// content type; everything else passes through.
fn parse_output(output: &[u8]) -> HttpResponse {
    let mut response = HttpResponse::new();
    response.set_status(200);

    let (header_region, body) = match find(output, b"\r\n\r\n") {
        Some(pos) => (&output[..pos], &output[pos + 4..]),
        None => match find(output, b"\n\n") {
            Some(pos) => (&output[..pos], &output[pos + 2..]),
            None => {
                response.set_body(output.to_vec());
                return response;
            }
        },
    };

    let headers = String::from_utf8_lossy(header_region);
    for line in headers.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if name.eq_ignore_ascii_case("status") {
            match value.get(..3).and_then(|d| d.parse::<u16>().ok()) {
                Some(status) => response.set_status(status),
                None => warn!(value, "Ignoring invalid CGI Status header"),
            }
        } else {
            response.insert_header(name, value);
        }
    }
    response.set_body(body.to_vec());
    response
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
