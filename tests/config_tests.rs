use std::fs;
use std::io::Write;
use std::path::PathBuf;

use webserv::config;

fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.conf");
    let mut file = fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    (dir, path)
}

#[test]
fn test_load_full_config() {
    let (_dir, path) = write_config(
        r#"
        # primary virtual host
        server {
            listen 8080;
            host 127.0.0.1;
            server_name example.test www.example.test;
            root docs/site;
            index index.html;
            client_max_body_size 2M;
            error_page 404 /errors/404.html;

            location / {
                allow_methods GET POST DELETE;
                autoindex off;
            }

            location /cgi {
                cgi_ext .py;
                cgi_path /usr/bin/python3;
            }

            location /old {
                return https://example.test/new;
            }
        }

        server {
            listen 9090;
            root docs/other;
            location / {
                autoindex on;
            }
        }
    "#,
    );

    let config = config::load(&path).unwrap();
    assert_eq!(config.config_path, path);
    assert_eq!(config.servers.len(), 2);

    let first = &config.servers[0];
    assert_eq!(first.port, 8080);
    assert_eq!(first.host, "127.0.0.1");
    assert_eq!(first.server_names, vec!["example.test", "www.example.test"]);
    assert_eq!(first.client_max_body_size, 2 * 1024 * 1024);
    assert_eq!(first.error_pages.get(&404).unwrap(), "/errors/404.html");
    assert_eq!(first.locations.len(), 3);

    let cgi = first.find_location("/cgi/hello.py").unwrap();
    assert_eq!(cgi.cgi_ext, vec![".py"]);
    assert_eq!(cgi.cgi_path, vec!["/usr/bin/python3"]);
    // inherited from the server block
    assert_eq!(cgi.root, "docs/site");
    assert_eq!(cgi.client_max_body_size, 2 * 1024 * 1024);

    let second = &config.servers[1];
    assert_eq!(second.port, 9090);
    assert!(second.find_location("/x").unwrap().autoindex);
}

#[test]
fn test_missing_file_fails() {
    assert!(config::load(std::path::Path::new("/nonexistent/webserv.conf")).is_err());
}

#[test]
fn test_wrong_extension_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    fs::write(&path, "server { listen 1; location / { } }").unwrap();
    assert!(config::load(&path).is_err());
}

#[test]
fn test_blank_file_fails() {
    let (_dir, path) = write_config("   \n\t  \n");
    assert!(config::load(&path).is_err());
}

#[test]
fn test_directory_path_fails() {
    let dir = tempfile::tempdir().unwrap();
    assert!(config::load(dir.path()).is_err());
}

#[test]
fn test_server_without_root_location_fails() {
    let (_dir, path) = write_config("server { listen 8080; location /only { } }");
    let err = config::load(&path).unwrap_err();
    assert!(err.to_string().contains("no '/' location"));
}

#[test]
fn test_quoted_values() {
    let (_dir, path) = write_config(
        "server { listen 8080; root \"/var/spa ced\"; location / { } }",
    );
    let config = config::load(&path).unwrap();
    assert_eq!(config.servers[0].root, "/var/spa ced");
}

#[test]
fn test_default_test_config_fixture_parses() {
    let config = config::load(std::path::Path::new("tests/test-configs/test.conf")).unwrap();
    assert!(!config.servers.is_empty());
    let server = &config.servers[0];
    assert_eq!(server.port, 8080);
    assert!(server.find_location("/").is_some());
}
