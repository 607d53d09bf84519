pub mod cgi;
pub mod cli;
pub mod config;
pub mod fsutil;
pub mod http;
pub mod logging;
pub mod router;
pub mod server;

pub use config::{Config, LocationBlock, ServerBlock};
pub use http::{HttpRequest, HttpResponse, Method};
pub use server::Server;
