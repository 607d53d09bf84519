#![allow(dead_code)]

use std::fs;
use std::path::Path;

use tempfile::TempDir;
use webserv::http::{parser, HttpRequest, ParseStatus};
use webserv::{LocationBlock, ServerBlock};

/// A scratch document root with a small site in it:
///
/// ```text
/// root/
///   index.html      <h1>hi</h1>
///   style.css
///   sub/
///     page.txt
///     .hidden
///   uploads/        (empty directory)
/// ```
pub fn site_root() -> TempDir {
    let dir = tempfile::tempdir().expect("create temp root");
    let root = dir.path();
    fs::write(root.join("index.html"), "<h1>hi</h1>").unwrap();
    fs::write(root.join("style.css"), "body {}").unwrap();
    fs::create_dir(root.join("sub")).unwrap();
    fs::write(root.join("sub/page.txt"), "plain text").unwrap();
    fs::write(root.join("sub/.hidden"), "secret").unwrap();
    fs::create_dir(root.join("uploads")).unwrap();
    dir
}

/// A server block rooted at `root` with a permissive `/` location.
pub fn server_block(root: &Path) -> ServerBlock {
    let root = root.to_string_lossy().into_owned();
    let mut server = ServerBlock {
        root: root.clone(),
        index: "index.html".to_string(),
        ..ServerBlock::default()
    };
    server.locations.push(LocationBlock {
        path: "/".to_string(),
        index: "index.html".to_string(),
        ..LocationBlock::inheriting(&server)
    });
    server
}

/// Parse a full raw request, asserting the parser reports completion.
pub fn request_from(raw: &[u8]) -> HttpRequest {
    let mut request = HttpRequest::new();
    let status = parser::parse(&mut request, raw);
    assert_eq!(status, ParseStatus::Done, "fixture request must parse");
    request
}

/// Parse a raw request expected to fail, returning the sticky status.
pub fn failed_request_from(raw: &[u8]) -> HttpRequest {
    let mut request = HttpRequest::new();
    let status = parser::parse(&mut request, raw);
    assert_eq!(status, ParseStatus::Error, "fixture request must fail");
    request
}
