//! Connection establishment for remote UCI engines.
//!
//! This crate turns an [`config::Endpoint`] into a ready-to-use byte
//! stream:
//!
//! - [`strategy`] tries the configured ways of reaching the server (mDNS,
//!   LAN, UPnP external address, relay rendezvous, backoff retry) in a
//!   fixed order with per-strategy timeouts, aggregating failures.
//! - [`tls`] wraps sockets in TLS with optional SHA-256 certificate
//!   fingerprint pinning.
//! - [`relay`] speaks the rendezvous protocol against a relay server.
//! - [`stream`] provides the mutex-shared full-duplex stream and the
//!   buffered [`LineReader`] the session hands from its handshake to its
//!   UCI loop without losing bytes.

pub mod error;
pub mod mdns;
pub mod relay;
pub mod strategy;
pub mod stream;
pub mod tls;

pub use error::{Result, TransportError};
pub use strategy::{connect, connect_with_retry, RetryPolicy};
pub use stream::{LineReader, NetStream, ReadEvent, SharedStream};
