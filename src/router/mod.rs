//! # Router Module
//!
//! Configuration-driven request routing: select the location block whose
//! path is the longest prefix of the request target, enforce its policy
//! (body size, redirects, path safety, allowed methods), and dispatch to a
//! static-file handler, the upload handler or the CGI gateway.
//!
//! ## Policy order
//!
//! 1. Location selection (longest prefix, `/` guaranteed by config)
//! 2. Body-size gate (413)
//! 3. Redirect (301)
//! 4. Filesystem path resolution + canonical-root containment (404)
//! 5. Method gate (405)
//! 6. CGI dispatch by extension
//! 7. Method execution (GET / POST / DELETE, otherwise 501)
//! 8. Error-page substitution for handler errors

pub mod handlers;
pub mod upload;

use std::path::PathBuf;

use tracing::{error, warn};

use crate::cgi::{self, CgiGateway};
use crate::config::{LocationBlock, ServerBlock};
use crate::fsutil;
use crate::http::{HttpRequest, HttpResponse, Method};

/// Route a parsed request through the selected virtual server and produce
/// the response, error pages applied.
pub fn process(request: &HttpRequest, server: &ServerBlock) -> HttpResponse {
    let uri = request.target();
    let Some(location) = server.find_location(uri) else {
        error!(uri, "Requested location not found");
        let mut response = HttpResponse::error(404, "Requested location not found");
        response.apply_error_page(&server.error_pages, &server.root);
        return response;
    };

    let mut response = dispatch(request, location);
    if response.is_error() {
        response.apply_error_page(&location.error_pages, &location.root);
    }
    response
}

fn dispatch(request: &HttpRequest, location: &LocationBlock) -> HttpResponse {
    let uri = request.target();

    // Boundary inclusive: a body exactly at the limit is rejected.
    if request.body().len() >= location.client_max_body_size {
        return HttpResponse::error(413, "Request body exceeds allowed size");
    }

    if !location.redirect_url.is_empty() {
        warn!(uri, target = %location.redirect_url, "Redirecting");
        let mut response = HttpResponse::new();
        response.set_status(301);
        response.insert_header("location", &location.redirect_url);
        response.set_content_type("text/html");
        response.set_body(format!("Redirecting to {}", location.redirect_url));
        return response;
    }

    let file_path = resolve_file_path(location, uri);
    if !fsutil::is_path_within(&file_path, &location.root) {
        warn!(uri, "Request target escapes the location root");
        return HttpResponse::error(404, "Page/file doesn't exist");
    }

    if !location.allows_method(request.method().as_str()) {
        return HttpResponse::error(
            405,
            format!("Method {} not allowed", request.method_raw()),
        );
    }

    if cgi::qualifies(&file_path, location) {
        return CgiGateway::new().execute(request, location, &file_path);
    }

    match request.method() {
        Method::Get => handlers::handle_get(&file_path, uri, location),
        Method::Post => upload::handle_post(request, &file_path),
        Method::Delete => handlers::handle_delete(&file_path),
        _ => HttpResponse::error(
            501,
            format!("Method {} not implemented", request.method_raw()),
        ),
    }
}

/// Join the location root and the target's path portion (query dropped).
fn resolve_file_path(location: &LocationBlock, uri: &str) -> PathBuf {
    let path_part = uri.split('?').next().unwrap_or(uri);
    let joined = format!(
        "{}/{}",
        location.root.trim_end_matches('/'),
        path_part.trim_start_matches('/')
    );
    PathBuf::from(joined)
}
