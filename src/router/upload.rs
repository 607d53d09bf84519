use std::fs;
use std::path::Path;

use chrono::Local;
use tracing::{error, info};

use crate::http::{mime, HttpRequest, HttpResponse};

/// File extensions accepted for uploaded bodies, plain or multipart.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "txt", "pdf", "doc", "docx", "jpg", "jpeg", "png", "gif", "zip", "tar", "html", "css", "js",
    "json",
];

enum SaveError {
    AlreadyExists,
    Io(std::io::Error),
}

/// POST: store the request body inside the target directory.
///
/// A `multipart/form-data` body is split into parts saved under their
/// client-supplied filenames; any other body is saved under a generated
/// timestamp name with the extension implied by `Content-Type`.
pub fn handle_post(request: &HttpRequest, dir_path: &Path) -> HttpResponse {
    if !dir_path.is_dir() {
        return HttpResponse::error(404, "Upload target must be an existing directory");
    }
    let content_type = request.header("content-type").unwrap_or("").to_string();
    if content_type.contains("multipart/form-data") {
        return handle_multipart(request.body(), dir_path, &content_type);
    }

    let Some(extension) = mime::extension_for(&content_type) else {
        return HttpResponse::error(403, "Unsupported upload content type");
    };
    if !ALLOWED_EXTENSIONS.contains(&extension) {
        return HttpResponse::error(403, "Upload file type not allowed");
    }

    let filename = generated_filename(extension);
    match save_file(&dir_path.join(&filename), request.body()) {
        Ok(()) => {
            info!(file = %filename, "Upload stored");
            let mut response = HttpResponse::new();
            response.set_status(201);
            response.set_content_type("text/html");
            response.set_body(format!("<html><body><h1>Created</h1><p>{filename}</p></body></html>"));
            response
        }
        Err(SaveError::AlreadyExists) => HttpResponse::error(500, "Upload filename collision"),
        Err(SaveError::Io(e)) => {
            error!(file = %filename, error = %e, "Failed to store upload");
            HttpResponse::error(500, "Failed to store upload")
        }
    }
}

/// `DD.MM.YYYY-HHMMSS-<micros>.<ext>`
fn generated_filename(extension: &str) -> String {
    let now = Local::now();
    format!(
        "{}-{}.{}",
        now.format("%d.%m.%Y-%H%M%S"),
        now.timestamp_subsec_micros(),
        extension
    )
}

fn save_file(path: &Path, content: &[u8]) -> Result<(), SaveError> {
    if path.exists() {
        return Err(SaveError::AlreadyExists);
    }
    fs::write(path, content).map_err(SaveError::Io)
}

fn handle_multipart(body: &[u8], dir_path: &Path, content_type: &str) -> HttpResponse {
    let Some(boundary) = extract_boundary(content_type) else {
        return HttpResponse::error(400, "Missing multipart boundary");
    };

    let mut saved: Vec<String> = Vec::new();
    for part in split_parts(body, &boundary) {
        let Some((filename, content)) = parse_part(part) else {
            continue;
        };
        if filename.is_empty() {
            continue;
        }
        let filename = filename.replace(' ', "-");
        // Client-supplied names must stay inside the target directory.
        if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
            error!(file = %filename, "Rejecting multipart filename");
            return HttpResponse::error(500, "Invalid upload filename");
        }
        let extension = filename.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
        if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
            error!(file = %filename, "Rejecting multipart file type");
            return HttpResponse::error(500, "Upload file type not allowed");
        }
        match save_file(&dir_path.join(&filename), content) {
            Ok(()) => {
                info!(file = %filename, bytes = content.len(), "Multipart upload stored");
                saved.push(filename);
            }
            Err(SaveError::AlreadyExists) => {
                return HttpResponse::error(500, "Upload filename collision");
            }
            Err(SaveError::Io(e)) => {
                error!(file = %filename, error = %e, "Failed to store multipart upload");
                return HttpResponse::error(500, "Failed to store upload");
            }
        }
    }

    if saved.is_empty() {
        return HttpResponse::error(404, "No files found in multipart body");
    }

    let mut listing = String::new();
    for name in &saved {
        listing.push_str(&format!("<li>{name}</li>"));
    }
    let mut response = HttpResponse::new();
    response.set_status(201);
    response.set_content_type("text/html");
    response.set_body(format!(
        "<html><body><h1>Upload successful</h1><ul>{listing}</ul></body></html>"
    ));
    response
}

/// The `boundary=` parameter of a multipart content type, quoted or bare.
pub(crate) fn extract_boundary(content_type: &str) -> Option<String> {
    let start = content_type.find("boundary=")? + "boundary=".len();
    let rest = &content_type[start..];
    if let Some(stripped) = rest.strip_prefix('"') {
        let end = stripped.find('"')?;
        return Some(stripped[..end].to_string());
    }
    let end = rest
        .find(|c: char| c == ' ' || c == '\t' || c == ';')
        .unwrap_or(rest.len());
    if end == 0 {
        None
    } else {
        Some(rest[..end].to_string())
    }
}

/// Slice the body into raw parts delimited by `--boundary` lines; the
/// terminating delimiter carries a trailing `--`.
fn split_parts<'a>(body: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();
    let mut positions = Vec::new();
    let mut offset = 0;
    while let Some(pos) = find(&body[offset..], delimiter) {
        positions.push(offset + pos);
        offset += pos + delimiter.len();
    }

    let mut parts = Vec::new();
    for window in positions.windows(2) {
        let after = window[0] + delimiter.len();
        let rest = &body[after..window[1]];
        // The delimiter line ends with CRLF; the part ends with the CRLF
        // that precedes the next delimiter.
        let Some(rest) = rest.strip_prefix(b"\r\n" as &[u8]) else {
            continue; // end marker "--" or malformed delimiter line
        };
        let rest = rest.strip_suffix(b"\r\n" as &[u8]).unwrap_or(rest);
        parts.push(rest);
    }
    parts
}

/// Split one part into its `filename` and content bytes.
fn parse_part(part: &[u8]) -> Option<(String, &[u8])> {
    let header_end = find(part, b"\r\n\r\n")?;
    let headers = String::from_utf8_lossy(&part[..header_end]);
    let content = &part[header_end + 4..];

    for line in headers.split("\r\n") {
        if !line.to_ascii_lowercase().starts_with("content-disposition") {
            continue;
        }
        let filename = extract_filename(line)?;
        return Some((filename, content));
    }
    None
}

fn extract_filename(disposition: &str) -> Option<String> {
    let start = disposition.find("filename=")? + "filename=".len();
    let rest = &disposition[start..];
    if let Some(stripped) = rest.strip_prefix('"') {
        let end = stripped.find('"')?;
        return Some(stripped[..end].to_string());
    }
    let end = rest
        .find(|c: char| c == ' ' || c == '\t' || c == ';')
        .unwrap_or(rest.len());
    Some(rest[..end].to_string())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_boundary_bare() {
        assert_eq!(
            extract_boundary("multipart/form-data; boundary=XyZ"),
            Some("XyZ".to_string())
        );
        assert_eq!(
            extract_boundary("multipart/form-data; boundary=XyZ; charset=utf-8"),
            Some("XyZ".to_string())
        );
    }

    #[test]
    fn test_extract_boundary_quoted() {
        assert_eq!(
            extract_boundary("multipart/form-data; boundary=\"a b\""),
            Some("a b".to_string())
        );
    }

    #[test]
    fn test_extract_boundary_missing() {
        assert_eq!(extract_boundary("multipart/form-data"), None);
    }

    #[test]
    fn test_split_and_parse_parts() {
        let body = b"--ZZ\r\nContent-Disposition: form-data; name=\"f\"; filename=\"a.txt\"\r\n\r\nhello\r\n--ZZ--\r\n";
        let parts = split_parts(body, "ZZ");
        assert_eq!(parts.len(), 1);
        let (filename, content) = parse_part(parts[0]).unwrap();
        assert_eq!(filename, "a.txt");
        assert_eq!(content, b"hello");
    }

    #[test]
    fn test_part_without_filename_is_skipped() {
        let body = b"--B\r\nContent-Disposition: form-data; name=\"field\"\r\n\r\nvalue\r\n--B--\r\n";
        let parts = split_parts(body, "B");
        assert_eq!(parts.len(), 1);
        assert!(parse_part(parts[0]).is_none());
    }

    #[test]
    fn test_generated_filename_shape() {
        let name = generated_filename("txt");
        assert!(name.ends_with(".txt"));
        // DD.MM.YYYY-HHMMSS-micros.txt
        assert_eq!(name.matches('.').count(), 3);
        assert_eq!(name.matches('-').count(), 2);
    }
}
