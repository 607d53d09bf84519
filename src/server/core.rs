use std::collections::HashMap;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use super::connection::Connection;
use super::epoll::{Epoll, MAX_EVENTS};
use super::signal;
use super::socket;
use crate::config::{self, Config, ServerBlock};

/// Scratch receive buffer size; also the kernel buffer size set on client
/// sockets.
pub const RECV_BUFFER_SIZE: usize = 16384;

/// Idle connections older than this are swept from the table.
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(65);

/// Receive-side socket option timeout.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(30);

const LISTEN_BACKLOG: i32 = 20;

struct Listener {
    fd: OwnedFd,
    port: u16,
    /// Indexes into `Config::servers` of the blocks bound to this port, in
    /// configuration order.
    servers: Vec<usize>,
}

/// The origin server: listening sockets, the readiness demultiplexer and
/// the connection table, driven by a single-threaded cooperative loop.
pub struct Server {
    config: Config,
    epoll: Epoll,
    listeners: HashMap<RawFd, Listener>,
    connections: HashMap<RawFd, Connection>,
}

impl Server {
    /// Read and validate the configuration, then open one listening socket
    /// per unique port.
    pub fn new(config_path: &Path) -> Result<Self> {
        let config = config::load(config_path)
            .with_context(|| format!("loading config from {}", config_path.display()))?;
        info!(
            path = %config_path.display(),
            servers = config.servers.len(),
            "Configuration parsed"
        );
        Self::with_config(config)
    }

    /// Build a server from an already-validated configuration.
    pub fn with_config(config: Config) -> Result<Self> {
        let epoll = Epoll::new().context("creating epoll instance")?;
        let mut listeners: HashMap<RawFd, Listener> = HashMap::new();
        let mut port_to_fd: HashMap<u16, RawFd> = HashMap::new();

        for (index, server) in config.servers.iter().enumerate() {
            match port_to_fd.get(&server.port) {
                Some(&fd) => {
                    // Another virtual host on an already-bound port.
                    if let Some(listener) = listeners.get_mut(&fd) {
                        listener.servers.push(index);
                    }
                }
                None => {
                    let fd = socket::create_listener(server.port, LISTEN_BACKLOG)
                        .with_context(|| format!("binding 0.0.0.0:{}", server.port))?;
                    let raw = fd.as_raw_fd();
                    epoll
                        .add(raw)
                        .with_context(|| format!("registering listener for port {}", server.port))?;
                    port_to_fd.insert(server.port, raw);
                    listeners.insert(
                        raw,
                        Listener {
                            fd,
                            port: server.port,
                            servers: vec![index],
                        },
                    );
                    info!(port = server.port, fd = raw, "Listening");
                }
            }
        }

        Ok(Server {
            config,
            epoll,
            listeners,
            connections: HashMap::new(),
        })
    }

    /// Run the event loop until the shutdown flag is raised: poll for
    /// readiness with zero wait, accept or read as appropriate, then sweep
    /// timed-out connections.
    pub fn run(&mut self) -> Result<()> {
        let mut events = vec![libc::epoll_event { events: 0, u64: 0 }; MAX_EVENTS];
        let mut scratch = vec![0u8; RECV_BUFFER_SIZE];

        while !signal::shutdown_requested() {
            let ready = match self.epoll.wait(&mut events, 0) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(error = %e, "epoll_wait failed");
                    return Err(e).context("polling for readiness");
                }
            };
            for event in &events[..ready] {
                let fd = event.u64 as RawFd;
                if self.listeners.contains_key(&fd) {
                    self.accept_client(fd);
                } else {
                    self.read_client(fd, &mut scratch);
                }
            }
            self.sweep_timeouts();
        }

        info!(
            signal = signal::received_signal(),
            "Shutdown requested, closing listeners and connections"
        );
        self.shutdown();
        Ok(())
    }

    fn accept_client(&mut self, listener_fd: RawFd) {
        let client = match socket::accept_client(listener_fd) {
            Ok(fd) => fd,
            Err(e) => {
                error!(fd = listener_fd, error = %e, "Failed to accept connection");
                return;
            }
        };
        let raw = client.as_raw_fd();
        if let Err(e) = socket::configure_client(raw, RECV_BUFFER_SIZE as i32, RECV_TIMEOUT) {
            warn!(fd = raw, error = %e, "Failed to set client socket options");
        }
        if let Err(e) = self.epoll.add(raw) {
            error!(fd = raw, error = %e, "Failed to register client with epoll");
            return; // client fd closes as it drops
        }
        let port = self.listeners.get(&listener_fd).map_or(0, |l| l.port);
        self.connections
            .insert(raw, Connection::new(client, listener_fd));
        info!(fd = raw, port, "New connection accepted");
    }

    fn read_client(&mut self, fd: RawFd, scratch: &mut [u8]) {
        let received = socket::recv(fd, scratch);
        if received <= 0 {
            if received < 0 {
                error!(fd, error = %io::Error::last_os_error(), "recv failed");
            } else {
                info!(fd, "Client disconnected");
            }
            self.drop_connection(fd);
            return;
        }

        let Some(connection) = self.connections.get_mut(&fd) else {
            return;
        };
        let server_fd = connection.server_fd();
        let (port, servers) = match self.listeners.get(&server_fd) {
            Some(listener) => {
                let blocks: Vec<&ServerBlock> = listener
                    .servers
                    .iter()
                    .map(|&i| &self.config.servers[i])
                    .collect();
                (listener.port, blocks)
            }
            None => return,
        };
        connection.process_bytes(&scratch[..received as usize], &servers, port);

        if !connection.keep_alive() {
            self.drop_connection(fd);
        }
    }

    fn drop_connection(&mut self, fd: RawFd) {
        if let Err(e) = self.epoll.delete(fd) {
            warn!(fd, error = %e, "Failed to remove client fd from epoll");
        }
        self.connections.remove(&fd);
    }

    fn sweep_timeouts(&mut self) {
        let expired: Vec<RawFd> = self
            .connections
            .iter()
            .filter(|(_, c)| c.is_timed_out(CONNECTION_TIMEOUT))
            .map(|(&fd, _)| fd)
            .collect();
        for fd in expired {
            info!(fd, "Connection timed out");
            self.drop_connection(fd);
        }
    }

    fn shutdown(&mut self) {
        for (fd, listener) in self.listeners.drain() {
            if let Err(e) = self.epoll.delete(fd) {
                warn!(fd, error = %e, "Failed to remove listener from epoll");
            }
            drop(listener); // closes the listening socket
        }
        // Dropping connections closes every client socket.
        self.connections.clear();
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Pick the server block for a `Host` header value: strip any final
/// `:port`, prefer a `server_names` entry, then a `host` field match, then
/// the first block bound to the socket (the default server).
#[must_use]
pub fn resolve_virtual_host<'a>(
    servers: &[&'a ServerBlock],
    host: &str,
) -> Option<&'a ServerBlock> {
    let name = match host.rfind(':') {
        Some(pos) => &host[..pos],
        None => host,
    };
    for server in servers {
        if server.server_names.iter().any(|n| n == name) {
            return Some(server);
        }
    }
    for server in servers {
        if server.host == name {
            return Some(server);
        }
    }
    servers.first().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(host: &str, names: &[&str]) -> ServerBlock {
        ServerBlock {
            host: host.to_string(),
            server_names: names.iter().map(|s| s.to_string()).collect(),
            ..ServerBlock::default()
        }
    }

    #[test]
    fn test_server_name_match_wins() {
        let a = block("0.0.0.0", &["alpha.test"]);
        let b = block("0.0.0.0", &["beta.test"]);
        let servers = vec![&a, &b];
        let resolved = resolve_virtual_host(&servers, "beta.test:8080").unwrap();
        assert_eq!(resolved.server_names, vec!["beta.test"]);
    }

    #[test]
    fn test_host_field_match_is_second() {
        let a = block("10.0.0.1", &["alpha.test"]);
        let b = block("10.0.0.2", &[]);
        let servers = vec![&a, &b];
        let resolved = resolve_virtual_host(&servers, "10.0.0.2").unwrap();
        assert_eq!(resolved.host, "10.0.0.2");
    }

    #[test]
    fn test_falls_back_to_first_block() {
        let a = block("0.0.0.0", &["alpha.test"]);
        let b = block("0.0.0.0", &["beta.test"]);
        let servers = vec![&a, &b];
        let resolved = resolve_virtual_host(&servers, "unknown.test").unwrap();
        assert_eq!(resolved.server_names, vec!["alpha.test"]);
    }

    #[test]
    fn test_bare_colon_strips_to_name() {
        let a = block("0.0.0.0", &["alpha.test"]);
        let servers = vec![&a];
        assert!(resolve_virtual_host(&servers, "alpha.test:").is_some());
        assert!(resolve_virtual_host(&servers, "").is_some());
    }
}
