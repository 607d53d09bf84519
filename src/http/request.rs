use std::collections::HashMap;

use super::method::Method;

/// Largest request-target the parser accepts, in bytes.
pub const MAX_TARGET_LENGTH: usize = 2048;

/// Consumed-prefix length that triggers buffer compaction.
pub(crate) const COMPACT_THRESHOLD: usize = 4096;

/// Parser position within the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    RequestLine,
    Headers,
    Body,
    ChunkSize,
    ChunkData,
    ChunkTrailer,
    Complete,
}

#[derive(Debug, Clone)]
pub(crate) struct RequestError {
    pub status: u16,
    pub message: String,
}

/// An HTTP request assembled incrementally from socket reads.
///
/// Owns the raw byte buffer plus a parsed-prefix offset; the parser consumes
/// bytes by advancing the offset and the buffer is compacted once the
/// consumed prefix grows past [`COMPACT_THRESHOLD`]. The error slot and the
/// `Complete` state are sticky.
#[derive(Debug)]
pub struct HttpRequest {
    pub(crate) buffer: Vec<u8>,
    pub(crate) parsed_offset: usize,
    pub(crate) state: ParseState,
    pub(crate) method: Method,
    pub(crate) method_raw: String,
    pub(crate) target: String,
    pub(crate) version: String,
    pub(crate) headers: HashMap<String, String>,
    pub(crate) body: Vec<u8>,
    pub(crate) chunked: bool,
    pub(crate) content_length: usize,
    pub(crate) chunk_length: usize,
    pub(crate) error: Option<RequestError>,
}

impl Default for HttpRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpRequest {
    #[must_use]
    pub fn new() -> Self {
        HttpRequest {
            buffer: Vec::new(),
            parsed_offset: 0,
            state: ParseState::RequestLine,
            method: Method::Unknown,
            method_raw: String::new(),
            target: String::new(),
            version: String::new(),
            headers: HashMap::new(),
            body: Vec::new(),
            chunked: false,
            content_length: 0,
            chunk_length: 0,
            error: None,
        }
    }

    /// Clear all state for the next keep-alive round.
    pub fn reset(&mut self) {
        *self = HttpRequest::new();
    }

    /// The not-yet-parsed suffix of the buffer.
    ///
    /// Always computed from the offset, never stored, so compaction can
    /// move the buffer freely between parser steps.
    #[must_use]
    pub fn unparsed(&self) -> &[u8] {
        &self.buffer[self.parsed_offset..]
    }

    pub(crate) fn append(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Advance the parsed prefix by `n` bytes, compacting when due.
    pub(crate) fn consume(&mut self, n: usize) {
        debug_assert!(self.parsed_offset + n <= self.buffer.len());
        self.parsed_offset += n;
        if self.parsed_offset >= COMPACT_THRESHOLD {
            self.buffer.drain(..self.parsed_offset);
            self.parsed_offset = 0;
        }
    }

    pub(crate) fn clear_buffer(&mut self) {
        self.buffer.clear();
        self.parsed_offset = 0;
    }

    /// Record a fatal parse error; the first error sticks.
    pub(crate) fn set_error(&mut self, status: u16, message: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(RequestError {
                status,
                message: message.into(),
            });
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    #[must_use]
    pub fn error_status(&self) -> u16 {
        self.error.as_ref().map_or(200, |e| e.status)
    }

    #[must_use]
    pub fn error_message(&self) -> &str {
        self.error.as_ref().map_or("", |e| e.message.as_str())
    }

    #[must_use]
    pub fn state(&self) -> ParseState {
        self.state
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state == ParseState::Complete
    }

    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    /// Raw method token as it appeared on the wire.
    #[must_use]
    pub fn method_raw(&self) -> &str {
        &self.method_raw
    }

    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    #[must_use]
    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    /// Header value by case-insensitive field name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    #[must_use]
    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains_key(&name.to_ascii_lowercase())
    }

    #[must_use]
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Insert a header under its lowercased name; a repeated name
    /// comma-joins with the existing value (RFC 7230 §3.2.2).
    pub(crate) fn insert_header(&mut self, name: &str, value: &str) {
        let key = name.to_ascii_lowercase();
        match self.headers.get_mut(&key) {
            Some(existing) => {
                existing.push(',');
                existing.push_str(value);
            }
            None => {
                self.headers.insert(key, value.to_string());
            }
        }
    }

    /// Request line for log records, e.g. `GET /index.html HTTP/1.1`.
    #[must_use]
    pub fn request_line(&self) -> String {
        format!("{} {} {}", self.method_raw, self.target, self.version)
    }
}
