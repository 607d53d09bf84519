mod common;

use std::fs;

use webserv::router;
use webserv::HttpRequest;

fn multipart_request(boundary: &str, payload: &str, target: &str) -> HttpRequest {
    let raw = format!(
        "POST {target} HTTP/1.1\r\nHost: x\r\nContent-Type: multipart/form-data; boundary={boundary}\r\nContent-Length: {}\r\n\r\n{payload}",
        payload.len()
    );
    common::request_from(raw.as_bytes())
}

#[test]
fn test_plain_post_creates_timestamped_file() {
    let dir = common::site_root();
    let server = common::server_block(dir.path());

    let raw = b"POST /uploads HTTP/1.1\r\nHost: x\r\nContent-Type: text/plain\r\nContent-Length: 5\r\n\r\nhello";
    let request = common::request_from(raw);
    let response = router::process(&request, &server);
    assert_eq!(response.status(), 201);

    let entries: Vec<_> = fs::read_dir(dir.path().join("uploads"))
        .unwrap()
        .flatten()
        .collect();
    assert_eq!(entries.len(), 1);
    let name = entries[0].file_name().to_string_lossy().into_owned();
    assert!(name.ends_with(".txt"), "unexpected name {name}");
    assert_eq!(fs::read(entries[0].path()).unwrap(), b"hello");
}

#[test]
fn test_post_target_must_be_directory() {
    let dir = common::site_root();
    let server = common::server_block(dir.path());
    let raw = b"POST /style.css HTTP/1.1\r\nHost: x\r\nContent-Type: text/plain\r\nContent-Length: 2\r\n\r\nhi";
    let request = common::request_from(raw);
    let response = router::process(&request, &server);
    assert_eq!(response.status(), 404);
}

#[test]
fn test_post_disallowed_type_is_403() {
    let dir = common::site_root();
    let server = common::server_block(dir.path());
    // video/mp4 maps to "mp4", which the allow-list rejects
    let raw = b"POST /uploads HTTP/1.1\r\nHost: x\r\nContent-Type: video/mp4\r\nContent-Length: 2\r\n\r\nhi";
    let request = common::request_from(raw);
    let response = router::process(&request, &server);
    assert_eq!(response.status(), 403);

    // unmapped type
    let raw = b"POST /uploads HTTP/1.1\r\nHost: x\r\nContent-Type: application/weird\r\nContent-Length: 2\r\n\r\nhi";
    let request = common::request_from(raw);
    let response = router::process(&request, &server);
    assert_eq!(response.status(), 403);
}

#[test]
fn test_multipart_upload_saves_named_file() {
    let dir = common::site_root();
    let server = common::server_block(dir.path());

    let payload = "--ZZ\r\nContent-Disposition: form-data; name=\"f\"; filename=\"a.txt\"\r\n\r\nhello\r\n--ZZ--\r\n";
    let request = multipart_request("ZZ", payload, "/uploads/");
    let response = router::process(&request, &server);
    assert_eq!(response.status(), 201);
    assert_eq!(
        fs::read(dir.path().join("uploads/a.txt")).unwrap(),
        b"hello"
    );

    // replaying the same upload collides on the literal filename
    let request = multipart_request("ZZ", payload, "/uploads/");
    let response = router::process(&request, &server);
    assert_eq!(response.status(), 500);
}

#[test]
fn test_multipart_spaces_become_dashes() {
    let dir = common::site_root();
    let server = common::server_block(dir.path());

    let payload = "--B\r\nContent-Disposition: form-data; name=\"f\"; filename=\"my report.txt\"\r\n\r\ndata\r\n--B--\r\n";
    let request = multipart_request("B", payload, "/uploads/");
    let response = router::process(&request, &server);
    assert_eq!(response.status(), 201);
    assert!(dir.path().join("uploads/my-report.txt").exists());
}

#[test]
fn test_multipart_multiple_files() {
    let dir = common::site_root();
    let server = common::server_block(dir.path());

    let payload = "--B\r\n\
        Content-Disposition: form-data; name=\"a\"; filename=\"one.txt\"\r\n\r\n\
        first\r\n\
        --B\r\n\
        Content-Disposition: form-data; name=\"b\"; filename=\"two.json\"\r\n\
        Content-Type: application/json\r\n\r\n\
        {}\r\n\
        --B--\r\n";
    let request = multipart_request("B", payload, "/uploads/");
    let response = router::process(&request, &server);
    assert_eq!(response.status(), 201);
    assert_eq!(fs::read(dir.path().join("uploads/one.txt")).unwrap(), b"first");
    assert_eq!(fs::read(dir.path().join("uploads/two.json")).unwrap(), b"{}");
}

#[test]
fn test_multipart_empty_filename_is_skipped() {
    let dir = common::site_root();
    let server = common::server_block(dir.path());

    let payload = "--B\r\nContent-Disposition: form-data; name=\"f\"; filename=\"\"\r\n\r\nignored\r\n--B--\r\n";
    let request = multipart_request("B", payload, "/uploads/");
    let response = router::process(&request, &server);
    // nothing saved at all maps to 404
    assert_eq!(response.status(), 404);
}

#[test]
fn test_multipart_traversal_filename_is_rejected() {
    let dir = common::site_root();
    let server = common::server_block(dir.path());

    let payload = "--B\r\nContent-Disposition: form-data; name=\"f\"; filename=\"../evil.txt\"\r\n\r\nx\r\n--B--\r\n";
    let request = multipart_request("B", payload, "/uploads/");
    let response = router::process(&request, &server);
    assert_eq!(response.status(), 500);
    assert!(!dir.path().join("evil.txt").exists());
}

#[test]
fn test_multipart_quoted_boundary() {
    let dir = common::site_root();
    let server = common::server_block(dir.path());

    let payload = "--q1\r\nContent-Disposition: form-data; name=\"f\"; filename=\"q.txt\"\r\n\r\nquoted\r\n--q1--\r\n";
    let raw = format!(
        "POST /uploads/ HTTP/1.1\r\nHost: x\r\nContent-Type: multipart/form-data; boundary=\"q1\"\r\nContent-Length: {}\r\n\r\n{payload}",
        payload.len()
    );
    let request = common::request_from(raw.as_bytes());
    let response = router::process(&request, &server);
    assert_eq!(response.status(), 201);
    assert_eq!(fs::read(dir.path().join("uploads/q.txt")).unwrap(), b"quoted");
}
