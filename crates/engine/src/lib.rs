//! Remote UCI engine sessions.
//!
//! This crate drives a chess engine that runs on another machine: the
//! [`transport`] crate produces the byte stream, the handshake module
//! negotiates auth and engine selection on it, and two long-running
//! threads coupled through a pair of [`pipe::LinePipe`]s carry
//! line-delimited UCI traffic in each direction. [`NetworkEngine`] is the
//! object the GUI holds.
//!
//! Error reporting is push-based: the host supplies a [`Report`] and gets
//! called once, with a user-presentable message, when a session dies.

mod facade;
mod handshake;
mod session;

pub mod error;

pub use error::{EngineError, Result};
pub use facade::{HostOptions, NetworkEngine};

/// Host-supplied sink for user-visible engine failures.
pub trait Report: Send + Sync {
    fn report_error(&self, message: &str);
}
