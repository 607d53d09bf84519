pub mod parser;
pub mod tokenizer;

pub use parser::load;

use std::collections::HashMap;
use std::path::PathBuf;

/// Default `client_max_body_size`, 1 MiB.
pub const DEFAULT_CLIENT_MAX_BODY_SIZE: usize = 1024 * 1024;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;

/// The parsed configuration file: an ordered list of server blocks.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub servers: Vec<ServerBlock>,
    pub config_path: PathBuf,
}

/// One `server { ... }` block.
#[derive(Debug, Clone)]
pub struct ServerBlock {
    pub host: String,
    pub port: u16,
    pub server_names: Vec<String>,
    pub root: String,
    pub index: String,
    pub client_max_body_size: usize,
    pub error_pages: HashMap<u16, String>,
    pub cgi_ext: Vec<String>,
    pub cgi_path: Vec<String>,
    pub locations: Vec<LocationBlock>,
}

impl Default for ServerBlock {
    fn default() -> Self {
        ServerBlock {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            server_names: Vec::new(),
            root: String::new(),
            index: String::new(),
            client_max_body_size: DEFAULT_CLIENT_MAX_BODY_SIZE,
            error_pages: HashMap::new(),
            cgi_ext: Vec::new(),
            cgi_path: Vec::new(),
            locations: Vec::new(),
        }
    }
}

impl ServerBlock {
    /// The location whose path is the longest prefix of `uri`.
    #[must_use]
    pub fn find_location(&self, uri: &str) -> Option<&LocationBlock> {
        let mut best: Option<&LocationBlock> = None;
        let mut best_len = 0;
        for location in &self.locations {
            if uri.starts_with(&location.path) && location.path.len() > best_len {
                best = Some(location);
                best_len = location.path.len();
            }
        }
        best
    }
}

/// One `location <path> { ... }` block. Unset directives inherit from the
/// enclosing server block at construction time.
#[derive(Debug, Clone, Default)]
pub struct LocationBlock {
    pub path: String,
    pub root: String,
    pub index: String,
    pub client_max_body_size: usize,
    pub error_pages: HashMap<u16, String>,
    pub cgi_ext: Vec<String>,
    pub cgi_path: Vec<String>,
    pub autoindex: bool,
    pub redirect_url: String,
    pub allowed_methods: Vec<String>,
}

impl LocationBlock {
    /// Start a location from its parent server's settings.
    #[must_use]
    pub fn inheriting(parent: &ServerBlock) -> Self {
        LocationBlock {
            path: String::new(),
            root: parent.root.clone(),
            index: parent.index.clone(),
            client_max_body_size: parent.client_max_body_size,
            error_pages: parent.error_pages.clone(),
            cgi_ext: parent.cgi_ext.clone(),
            cgi_path: parent.cgi_path.clone(),
            autoindex: false,
            redirect_url: String::new(),
            allowed_methods: Vec::new(),
        }
    }

    /// Empty `allow_methods` means every method is allowed.
    #[must_use]
    pub fn allows_method(&self, method: &str) -> bool {
        self.allowed_methods.is_empty() || self.allowed_methods.iter().any(|m| m == method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_with_locations(paths: &[&str]) -> ServerBlock {
        let mut server = ServerBlock::default();
        for p in paths {
            server.locations.push(LocationBlock {
                path: (*p).to_string(),
                ..LocationBlock::default()
            });
        }
        server
    }

    #[test]
    fn test_longest_prefix_wins() {
        let server = server_with_locations(&["/", "/images", "/images/icons"]);
        assert_eq!(
            server.find_location("/images/icons/x.png").unwrap().path,
            "/images/icons"
        );
        assert_eq!(server.find_location("/images/a.png").unwrap().path, "/images");
        assert_eq!(server.find_location("/other").unwrap().path, "/");
    }

    #[test]
    fn test_empty_allow_methods_allows_all() {
        let location = LocationBlock::default();
        assert!(location.allows_method("DELETE"));
        let gated = LocationBlock {
            allowed_methods: vec!["GET".to_string()],
            ..LocationBlock::default()
        };
        assert!(gated.allows_method("GET"));
        assert!(!gated.allows_method("POST"));
    }
}
