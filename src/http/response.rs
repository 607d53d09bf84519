use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::Utc;

use super::mime;
use super::status::reason_phrase;
use crate::fsutil;

/// An HTTP response under construction.
///
/// Headers are stored under lowercased names and rendered capitalized.
/// `Server`, `Date`, `Content-Length` and `Content-Type` are emitted from
/// dedicated slots, never from the header map.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    status: u16,
    headers: BTreeMap<String, String>,
    body: Vec<u8>,
    content_type: String,
    is_error: bool,
    keep_alive: bool,
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpResponse {
    #[must_use]
    pub fn new() -> Self {
        HttpResponse {
            status: 200,
            headers: BTreeMap::new(),
            body: Vec::new(),
            content_type: String::new(),
            is_error: false,
            keep_alive: true,
        }
    }

    /// An error response carrying `message` as its provisional body; the
    /// body is normally replaced by error-page substitution before sending.
    #[must_use]
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        let mut response = HttpResponse::new();
        response.set_error(status, message);
        response
    }

    pub fn set_error(&mut self, status: u16, message: impl Into<String>) {
        self.status = status;
        self.body = message.into().into_bytes();
        self.content_type.clear();
        self.is_error = true;
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.is_error
    }

    #[must_use]
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) {
        self.body = body.into();
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = content_type.into();
    }

    #[must_use]
    pub fn content_type(&self) -> &str {
        if self.content_type.is_empty() {
            "text/plain"
        } else {
            &self.content_type
        }
    }

    /// Insert a header under its lowercased name, replacing any previous
    /// value. `Content-Type` routes to the dedicated slot; `Content-Length`,
    /// `Server` and `Date` are always computed at serialization time and
    /// attempts to set them are dropped.
    pub fn insert_header(&mut self, name: &str, value: &str) {
        let key = name.to_ascii_lowercase();
        match key.as_str() {
            "content-type" => self.content_type = value.to_string(),
            "content-length" | "server" | "date" => {}
            _ => {
                self.headers.insert(key, value.to_string());
            }
        }
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Decide the `Connection` header from the final status and the
    /// request's own `Connection` header and HTTP version.
    pub fn set_connection_header(&mut self, request_connection: &str, request_version: &str) {
        let connection = request_connection.to_ascii_lowercase();
        let close = self.status == 400
            || self.status == 408
            || self.status >= 411
            || connection == "close"
            || (request_version == "HTTP/1.0" && connection != "keep-alive");
        if close {
            self.insert_header("connection", "close");
            self.keep_alive = false;
        } else {
            self.insert_header("connection", "keep-alive");
            self.keep_alive = true;
        }
    }

    /// Replace an error body with the configured error page for the status,
    /// falling back to the built-in document when the page is missing,
    /// unreadable or escapes the root.
    pub fn apply_error_page(&mut self, error_pages: &HashMap<u16, String>, root: &str) {
        let Some(page) = error_pages.get(&self.status) else {
            self.set_default_error_page();
            return;
        };
        let candidate = format!(
            "{}/{}",
            root.trim_end_matches('/'),
            page.trim_start_matches('/')
        );
        let path = Path::new(&candidate);
        if fsutil::is_path_within(path, root) && path.is_file() {
            if let Ok(content) = fs::read(path) {
                let content_type = mime::mime_type(path).to_string();
                self.body = content;
                self.content_type = content_type;
                return;
            }
        }
        self.set_default_error_page();
    }

    /// Built-in error document decorated with the matching http.cat image.
    fn set_default_error_page(&mut self) {
        let status = self.status;
        let reason = String::from_utf8_lossy(&self.body).into_owned();
        let body = format!(
            "<!DOCTYPE html>\n\
             <html>\n\
             <head><title>Error {status}</title></head>\n\
             <body style='text-align:center; font-family:Arial; background-color:black; color:white;'>\n\
             <h1>Oooops!</h1>\n\
             <p><a href='/' style='color:white;'>Go home!</a></p>\n\
             <p>(reason: {reason})</p>\n\
             <img src='https://http.cat/{status}' alt='HTTP Cat {status}' style='max-width:100%; height:auto; margin:20px;'>\n\
             </body></html>"
        );
        self.body = body.into_bytes();
        self.content_type = "text/html".to_string();
    }

    #[must_use]
    pub fn status_line(&self) -> String {
        format!("HTTP/1.1 {} {}", self.status, reason_phrase(self.status))
    }

    /// Serialize: status line, `Server`, `Date`, `Content-Length`,
    /// `Content-Type` (iff the body is non-empty), remaining headers with
    /// capitalized names, CRLFCRLF, body.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut head = String::new();
        head.push_str(&self.status_line());
        head.push_str("\r\n");
        head.push_str("Server: Webserv\r\n");
        head.push_str(&format!("Date: {}\r\n", imf_fixdate_now()));
        head.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        if !self.body.is_empty() {
            head.push_str(&format!("Content-Type: {}\r\n", self.content_type()));
        }
        for (name, value) in &self.headers {
            head.push_str(&format!("{}: {}\r\n", capitalize_field_name(name), value));
        }
        head.push_str("\r\n");

        let mut raw = head.into_bytes();
        raw.extend_from_slice(&self.body);
        raw
    }
}

/// Current time as an RFC 7231 IMF-fixdate, always GMT.
#[must_use]
pub fn imf_fixdate_now() -> String {
    Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// `content-type` -> `Content-Type`: uppercase the first letter of each
/// `-`-separated word.
#[must_use]
pub fn capitalize_field_name(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut uppercase_next = true;
    for ch in name.chars() {
        if uppercase_next && ch.is_ascii_alphabetic() {
            result.push(ch.to_ascii_uppercase());
            uppercase_next = false;
        } else {
            result.push(ch);
            if ch == '-' {
                uppercase_next = true;
            }
        }
    }
    result
}
