use std::fs;
use std::path::Path;

use tracing::{error, info};

use crate::http::{mime, HttpResponse};
use crate::config::LocationBlock;

/// GET: serve a regular file, an index file, or a directory listing.
pub fn handle_get(path: &Path, uri: &str, location: &LocationBlock) -> HttpResponse {
    let Ok(metadata) = fs::metadata(path) else {
        error!(path = %path.display(), "Requested file doesn't exist");
        return HttpResponse::error(404, "File not found");
    };

    if metadata.is_dir() {
        if !location.index.is_empty() {
            let index_path = path.join(&location.index);
            if index_path.is_file() {
                return serve_static_file(&index_path);
            }
        }
        if location.autoindex {
            info!(path = %path.display(), "Listing directory");
            return serve_directory_listing(path, uri);
        }
        error!(path = %path.display(), "Directory access denied");
        return HttpResponse::error(403, "Access denied");
    }

    if metadata.is_file() {
        serve_static_file(path)
    } else {
        error!(path = %path.display(), "Not a regular file");
        HttpResponse::error(403, "Access denied")
    }
}

/// DELETE: remove a regular file.
pub fn handle_delete(path: &Path) -> HttpResponse {
    let Ok(metadata) = fs::metadata(path) else {
        return HttpResponse::error(404, "File not found");
    };
    if metadata.is_dir() {
        return HttpResponse::error(409, "Target is a directory");
    }
    match fs::remove_file(path) {
        Ok(()) => {
            info!(path = %path.display(), "File deleted");
            let mut response = HttpResponse::new();
            response.set_status(204);
            response
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to delete file");
            HttpResponse::error(403, "Access denied")
        }
    }
}

/// Whole-file read in binary mode with the MIME type keyed on extension.
pub fn serve_static_file(path: &Path) -> HttpResponse {
    match fs::read(path) {
        Ok(content) => {
            info!(path = %path.display(), bytes = content.len(), "Serving file");
            let mut response = HttpResponse::new();
            response.set_status(200);
            response.set_content_type(mime::mime_type(path));
            response.set_body(content);
            response
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to read file");
            HttpResponse::error(403, "Access denied")
        }
    }
}

/// Autoindex page: one link per non-hidden entry, directories with a
/// trailing slash, plus a parent link unless the URI is `/`.
fn serve_directory_listing(path: &Path, uri: &str) -> HttpResponse {
    let entries = match fs::read_dir(path) {
        Ok(iter) => iter,
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to list directory");
            return HttpResponse::error(500, "Internal server error");
        }
    };

    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n");
    html.push_str(&format!("<title>Index of {uri}</title>\n"));
    html.push_str("</head>\n<body>\n");
    html.push_str(&format!("<h1>Index of {uri}</h1>\n"));
    html.push_str("<hr>\n<ul>\n");

    if uri != "/" {
        html.push_str(&format!("<li><a href=\"{}\">../</a></li>\n", parent_of(uri)));
    }

    let link_base = if uri.ends_with('/') {
        uri.to_string()
    } else {
        format!("{uri}/")
    };

    let mut names: Vec<String> = Vec::new();
    for entry in entries.flatten() {
        let mut name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            name.push('/');
        }
        names.push(name);
    }
    names.sort();
    for name in &names {
        html.push_str(&format!(
            "<li><a href=\"{link_base}{name}\">{name}</a></li>\n"
        ));
    }

    html.push_str("</ul>\n<hr>\n<p><em>Hello from Webserv!</em></p>\n</body>\n</html>");

    let mut response = HttpResponse::new();
    response.set_status(200);
    response.set_content_type("text/html");
    response.set_body(html);
    response
}

/// Parent URI with a trailing slash: `/a/b/` -> `/a/`, `/a` -> `/`.
fn parent_of(uri: &str) -> String {
    let trimmed = uri.strip_suffix('/').unwrap_or(uri);
    match trimmed.rfind('/') {
        Some(pos) => trimmed[..=pos].to_string(),
        None => "/".to_string(),
    }
}
