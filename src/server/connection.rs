use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::time::{Duration, Instant};

use tracing::{error, info};

use super::core::resolve_virtual_host;
use super::socket;
use crate::config::ServerBlock;
use crate::http::{parser, HttpRequest, HttpResponse, ParseStatus};
use crate::router;

/// Per-client state: the socket, the request being assembled, and
/// keep-alive bookkeeping. Owned exclusively by the server's connection
/// table; dropping a connection closes the client socket.
#[derive(Debug)]
pub struct Connection {
    fd: OwnedFd,
    server_fd: RawFd,
    request: HttpRequest,
    keep_alive: bool,
    last_active: Instant,
}

impl Connection {
    #[must_use]
    pub fn new(fd: OwnedFd, server_fd: RawFd) -> Self {
        Connection {
            fd,
            server_fd,
            request: HttpRequest::new(),
            keep_alive: true,
            last_active: Instant::now(),
        }
    }

    #[must_use]
    pub fn raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    #[must_use]
    pub fn server_fd(&self) -> RawFd {
        self.server_fd
    }

    #[must_use]
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    #[must_use]
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_active.elapsed() >= timeout
    }

    pub fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    /// Feed freshly received bytes through the parser and, once a request
    /// is complete or fatally broken, produce and send the response.
    ///
    /// `servers` is the ordered list of server blocks bound to the
    /// accepting socket; `port` is that socket's port (for log records).
    pub fn process_bytes(&mut self, data: &[u8], servers: &[&ServerBlock], port: u16) {
        self.touch();
        match parser::parse(&mut self.request, data) {
            ParseStatus::WaitForData => {
                info!(
                    port,
                    fd = self.raw_fd(),
                    "Received partial request, waiting for more data"
                );
            }
            ParseStatus::Error => {
                let host = self.request.header("host").unwrap_or("");
                error!(
                    port,
                    fd = self.raw_fd(),
                    host,
                    status = self.request.error_status(),
                    message = self.request.error_message(),
                    "Failed to parse request"
                );
                let Some(server) = resolve_virtual_host(servers, host) else {
                    self.keep_alive = false;
                    return;
                };
                let mut response =
                    HttpResponse::error(self.request.error_status(), self.request.error_message());
                response.apply_error_page(&server.error_pages, &server.root);
                response.insert_header("connection", "close");
                self.keep_alive = false;
                self.send_response(&response.to_bytes());
            }
            ParseStatus::Done => {
                let host = self.request.header("host").unwrap_or("").to_string();
                let Some(server) = resolve_virtual_host(servers, &host) else {
                    self.keep_alive = false;
                    return;
                };
                let mut response = router::process(&self.request, server);
                response.set_connection_header(
                    self.request.header("connection").unwrap_or(""),
                    self.request.version(),
                );
                if response.is_error() {
                    error!(
                        port,
                        fd = self.raw_fd(),
                        host = %host,
                        request = %self.request.request_line(),
                        response = %response.status_line(),
                        "Request failed"
                    );
                } else {
                    info!(
                        port,
                        fd = self.raw_fd(),
                        host = %host,
                        request = %self.request.request_line(),
                        response = %response.status_line(),
                        "Request handled"
                    );
                }
                self.keep_alive = response.keep_alive();
                self.send_response(&response.to_bytes());
                self.request.reset();
            }
        }
    }

    fn send_response(&mut self, data: &[u8]) {
        self.touch();
        match socket::send(self.raw_fd(), data) {
            Ok(sent) => {
                info!(fd = self.raw_fd(), bytes = sent, "Response sent");
            }
            Err(e) => {
                error!(fd = self.raw_fd(), error = %e, "Failed to send response");
                self.keep_alive = false;
            }
        }
    }
}
