use thiserror::Error;

/// Errors that can occur while establishing or using a connection.
///
/// Connection failures are classified so the caller can map each kind to a
/// distinct user-facing message.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("invalid network engine configuration: {0}")]
    Config(String),

    #[error("unknown host: {0}")]
    UnknownHost(String),

    #[error("connection refused: {0}")]
    Refused(String),

    #[error("connection timed out: {0}")]
    Timeout(String),

    #[error("TLS handshake failed: {message}")]
    TlsHandshake {
        message: String,
        /// True when the server certificate did not match the pinned
        /// fingerprint (as opposed to a protocol-level failure).
        fingerprint_mismatch: bool,
    },

    #[error("relay error: {0}")]
    Relay(String),

    #[error("all connection strategies failed:\n  - {}", .0.join("\n  - "))]
    AllStrategiesFailed(Vec<String>),

    /// Shutdown was requested while connecting; never reported to the user.
    #[error("connection cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
