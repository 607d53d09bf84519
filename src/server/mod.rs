//! # Server Module
//!
//! The single-threaded event loop and everything it owns.
//!
//! ## Overview
//!
//! This module contains:
//! - [`Server`] - listening sockets, the epoll demultiplexer and the
//!   connection table
//! - [`Connection`] - per-client request/response state
//! - RAII wrappers for the epoll instance and raw socket calls
//! - The process-wide shutdown flag written from signal handlers
//!
//! ## Architecture
//!
//! ```text
//! epoll readiness → Server → Connection → parser → router → response
//! ```
//!
//! Each loop iteration polls with zero wait, accepts new clients from
//! listening sockets, feeds readable clients into their connection's
//! parser, and finally sweeps connections idle past the timeout. Within a
//! connection requests are strictly sequential; across connections the
//! interleaving is whatever readiness dictates.

/// Per-client connection state
pub mod connection;
/// The event loop and listener setup
pub mod core;
/// RAII epoll wrapper
pub mod epoll;
/// Shutdown flag and signal handlers
pub mod signal;
/// Raw socket syscall wrappers
pub mod socket;

pub use connection::Connection;
pub use core::{resolve_virtual_host, Server};
pub use epoll::Epoll;
