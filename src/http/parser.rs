use once_cell::sync::Lazy;
use regex::Regex;

use super::method::Method;
use super::request::{HttpRequest, ParseState, MAX_TARGET_LENGTH};

/// Outcome of feeding bytes to the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    /// The message is incomplete; feed more bytes when they arrive.
    WaitForData,
    /// A full request is materialized and ready for routing.
    Done,
    /// Fatal error; status code and message are sticky on the request.
    Error,
}

/// Result of one state-machine step.
enum Step {
    Continue,
    Wait,
    Done,
    Fail,
}

static VERSION_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^HTTP/\d+\.\d+$").expect("version regex"));

/// Append `data` to the request buffer and drive the state machine until it
/// suspends, completes or fails.
///
/// Byte-for-byte resumable: any split of a request across calls yields the
/// same final request as a single call with the whole message.
pub fn parse(request: &mut HttpRequest, data: &[u8]) -> ParseStatus {
    if request.is_error() {
        return ParseStatus::Error;
    }
    request.append(data);
    loop {
        let step = match request.state {
            ParseState::RequestLine => parse_request_line(request),
            ParseState::Headers => parse_headers(request),
            ParseState::Body => parse_body(request),
            ParseState::ChunkSize => parse_chunk_size(request),
            ParseState::ChunkData => parse_chunk_data(request),
            ParseState::ChunkTrailer => parse_chunk_trailer(request),
            ParseState::Complete => Step::Done,
        };
        match step {
            Step::Continue => {}
            Step::Wait => return ParseStatus::WaitForData,
            Step::Done => return ParseStatus::Done,
            Step::Fail => return ParseStatus::Error,
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn parse_request_line(request: &mut HttpRequest) -> Step {
    let view = request.unparsed();
    let Some(line_end) = find(view, b"\r\n") else {
        return Step::Wait;
    };
    let Ok(line) = std::str::from_utf8(&view[..line_end]) else {
        request.set_error(400, "Request line is not valid UTF-8");
        return Step::Fail;
    };

    let Some(method_end) = line.find(' ') else {
        request.set_error(400, "Malformed request line: missing spaces");
        return Step::Fail;
    };
    let rest = &line[method_end + 1..];
    let Some(target_len) = rest.find(' ') else {
        request.set_error(400, "Malformed request line: missing target");
        return Step::Fail;
    };
    let method_raw = line[..method_end].to_string();
    let target = rest[..target_len].to_string();
    let version = rest[target_len + 1..].to_string();

    let method = Method::from_token(&method_raw);
    if method == Method::Unknown {
        request.set_error(
            501,
            format!("Method is unrecognized or not implemented: {method_raw}"),
        );
        return Step::Fail;
    }
    if !validate_target(request, &target) {
        return Step::Fail;
    }
    if !validate_version(request, &version) {
        return Step::Fail;
    }

    request.method = method;
    request.method_raw = method_raw;
    request.target = target;
    request.version = version;
    request.consume(line_end + 2);
    request.state = ParseState::Headers;
    Step::Continue
}

fn validate_target(request: &mut HttpRequest, target: &str) -> bool {
    let lowered = target.to_ascii_lowercase();
    if lowered.len() > MAX_TARGET_LENGTH {
        request.set_error(400, "Request target too long");
        return false;
    }
    for ch in lowered.bytes() {
        if ch < 32 || ch == 127 || matches!(ch, b'<' | b'>' | b'"' | b'\\') {
            request.set_error(400, "Request target contains forbidden character");
            return false;
        }
    }
    match lowered.find("://") {
        Some(scheme_end) => {
            let scheme = &lowered[..scheme_end];
            if scheme != "http" && scheme != "https" {
                request.set_error(400, format!("Only http/https schemes allowed: {scheme}"));
                return false;
            }
        }
        None => {
            if !lowered.starts_with('/') {
                request.set_error(400, "Request target without scheme must start with '/'");
                return false;
            }
        }
    }
    true
}

fn validate_version(request: &mut HttpRequest, version: &str) -> bool {
    if !VERSION_FORMAT.is_match(version) {
        request.set_error(400, format!("Invalid HTTP version format: {version}"));
        return false;
    }
    if version != "HTTP/1.0" && version != "HTTP/1.1" {
        request.set_error(505, format!("Unsupported HTTP version: {version}"));
        return false;
    }
    true
}

fn is_tchar(ch: u8) -> bool {
    ch.is_ascii_alphanumeric()
        || matches!(
            ch,
            b'!' | b'#'
                | b'$'
                | b'%'
                | b'&'
                | b'\''
                | b'*'
                | b'+'
                | b'-'
                | b'.'
                | b'^'
                | b'_'
                | b'`'
                | b'|'
                | b'~'
        )
}

fn parse_headers(request: &mut HttpRequest) -> Step {
    let (block_end, lines) = {
        let view = request.unparsed();
        if view.len() >= 2 && &view[..2] == b"\r\n" {
            // No header lines at all; Host is mandatory (RFC 7230 §5.4).
            request.set_error(400, "Host header is required");
            return Step::Fail;
        }
        let Some(block_end) = find(view, b"\r\n\r\n") else {
            return Step::Wait;
        };
        let mut parsed: Vec<(String, String)> = Vec::new();
        let mut failure: Option<String> = None;
        for line in view[..block_end].split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            match parse_header_line(line) {
                Ok(pair) => parsed.push(pair),
                Err(message) => {
                    failure = Some(message);
                    break;
                }
            }
        }
        match failure {
            Some(message) => {
                request.set_error(400, message);
                return Step::Fail;
            }
            None => (block_end, parsed),
        }
    };
    for (name, value) in lines {
        request.insert_header(&name, &value);
    }
    request.consume(block_end + 4);
    finish_header_setup(request)
}

fn parse_header_line(line: &[u8]) -> Result<(String, String), String> {
    let colon = find(line, b":").ok_or("Malformed header line: missing ':'")?;
    let name = &line[..colon];
    if name.is_empty() {
        return Err("Header field name is empty".into());
    }
    if !name.iter().all(|&b| is_tchar(b)) {
        return Err("Header field name contains invalid character".into());
    }
    let value = &line[colon + 1..];
    let trimmed = trim_ows(value);
    if trimmed.is_empty() {
        return Err("Header field value is empty".into());
    }
    if trimmed.iter().any(|&b| b <= 31 || b == 127) {
        return Err("Header field value contains control character".into());
    }
    // Name is pure tchar and the value was screened above, both are ASCII-safe.
    let name = String::from_utf8_lossy(name).into_owned();
    let value = String::from_utf8_lossy(trimmed).into_owned();
    Ok((name, value))
}

fn trim_ows(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|&b| b != b' ' && b != b'\t')
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|&b| b != b' ' && b != b'\t')
        .map_or(start, |p| p + 1);
    &bytes[start..end]
}

/// Header-dependent setup: Host presence, framing headers, next state.
fn finish_header_setup(request: &mut HttpRequest) -> Step {
    if !request.has_header("host") {
        request.set_error(400, "Host header is required");
        return Step::Fail;
    }
    let has_transfer_encoding = request.has_header("transfer-encoding");
    let has_content_length = request.has_header("content-length");
    if has_transfer_encoding && has_content_length {
        request.set_error(
            400,
            "Transfer-Encoding and Content-Length are mutually exclusive",
        );
        return Step::Fail;
    }
    if has_transfer_encoding {
        let encoding = request
            .header("transfer-encoding")
            .unwrap_or("")
            .to_ascii_lowercase();
        if !encoding.contains("chunked") {
            request.set_error(400, format!("Unsupported transfer encoding: {encoding}"));
            return Step::Fail;
        }
        request.chunked = true;
        request.state = ParseState::ChunkSize;
        return Step::Continue;
    }
    if has_content_length {
        let raw = request.header("content-length").unwrap_or("");
        match raw.trim().parse::<usize>() {
            Ok(length) => request.content_length = length,
            Err(_) => {
                request.set_error(400, "Invalid Content-Length value");
                return Step::Fail;
            }
        }
    }
    request.state = ParseState::Body;
    Step::Continue
}

fn parse_body(request: &mut HttpRequest) -> Step {
    let available = request.unparsed().len();
    if available < request.content_length {
        return Step::Wait;
    }
    if available > request.content_length {
        request.set_error(400, "Body does not match declared Content-Length");
        return Step::Fail;
    }
    let start = request.parsed_offset;
    request
        .body
        .extend_from_slice(&request.buffer[start..start + request.content_length]);
    request.consume(request.content_length);
    request.state = ParseState::Complete;
    request.clear_buffer();
    Step::Done
}

fn parse_chunk_size(request: &mut HttpRequest) -> Step {
    let (line_end, line) = {
        let view = request.unparsed();
        let Some(line_end) = find(view, b"\r\n") else {
            return Step::Wait;
        };
        (line_end, String::from_utf8_lossy(&view[..line_end]).into_owned())
    };
    // Chunk extensions (";...") are unsupported and fail the hex parse.
    let Ok(size) = usize::from_str_radix(line.trim(), 16) else {
        request.set_error(400, format!("Invalid chunk size: {line}"));
        return Step::Fail;
    };
    request.consume(line_end + 2);
    if size == 0 {
        request.state = ParseState::ChunkTrailer;
    } else {
        request.chunk_length = size;
        request.state = ParseState::ChunkData;
    }
    Step::Continue
}

fn parse_chunk_data(request: &mut HttpRequest) -> Step {
    let length = request.chunk_length;
    let view = request.unparsed();
    if view.len() < length + 2 {
        return Step::Wait;
    }
    if &view[length..length + 2] != b"\r\n" {
        request.set_error(400, "Chunk data does not match declared size");
        return Step::Fail;
    }
    let start = request.parsed_offset;
    request
        .body
        .extend_from_slice(&request.buffer[start..start + length]);
    request.consume(length + 2);
    request.state = ParseState::ChunkSize;
    Step::Continue
}

fn parse_chunk_trailer(request: &mut HttpRequest) -> Step {
    let view = request.unparsed();
    if view.len() < 2 {
        return Step::Wait;
    }
    if &view[..2] != b"\r\n" {
        // Trailer headers are not accepted in this version.
        request.set_error(400, "Malformed chunked message trailer");
        return Step::Fail;
    }
    request.consume(2);
    request.state = ParseState::Complete;
    request.clear_buffer();
    Step::Done
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(raw: &[u8]) -> (HttpRequest, ParseStatus) {
        let mut req = HttpRequest::new();
        let status = parse(&mut req, raw);
        (req, status)
    }

    #[test]
    fn test_simple_get() {
        let (req, status) = feed(b"GET /index.html HTTP/1.1\r\nHost: localhost\r\n\r\n");
        assert_eq!(status, ParseStatus::Done);
        assert_eq!(req.method(), Method::Get);
        assert_eq!(req.target(), "/index.html");
        assert_eq!(req.header("host"), Some("localhost"));
        assert!(req.body().is_empty());
    }

    #[test]
    fn test_unknown_method_is_501() {
        let (req, status) = feed(b"PATCH / HTTP/1.1\r\nHost: x\r\n\r\n");
        assert_eq!(status, ParseStatus::Error);
        assert_eq!(req.error_status(), 501);
    }

    #[test]
    fn test_unsupported_version_is_505() {
        let (req, status) = feed(b"GET / HTTP/2.0\r\nHost: x\r\n\r\n");
        assert_eq!(status, ParseStatus::Error);
        assert_eq!(req.error_status(), 505);
    }

    #[test]
    fn test_missing_host_is_400() {
        let (req, status) = feed(b"GET / HTTP/1.1\r\nAccept: */*\r\n\r\n");
        assert_eq!(status, ParseStatus::Error);
        assert_eq!(req.error_status(), 400);
    }

    #[test]
    fn test_chunked_body() {
        let (req, status) = feed(
            b"POST / HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n",
        );
        assert_eq!(status, ParseStatus::Done);
        assert!(req.is_chunked());
        assert_eq!(req.body(), b"hello");
    }

    #[test]
    fn test_incremental_feed() {
        let raw = b"GET / HTTP/1.1\r\nHost: x\r\n\r\n";
        let mut req = HttpRequest::new();
        for &b in &raw[..raw.len() - 1] {
            assert_eq!(parse(&mut req, &[b]), ParseStatus::WaitForData);
        }
        assert_eq!(parse(&mut req, &raw[raw.len() - 1..]), ParseStatus::Done);
    }
}
