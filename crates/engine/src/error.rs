use config::Endpoint;
use thiserror::Error;
use transport::TransportError;

/// Session-level failures, each mapping to a distinct user-facing message.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("authentication failed")]
    AuthFailed,

    /// The server demanded auth after the handshake phase had already
    /// decided none was needed; the client configuration is stale.
    #[error("server requires authentication but none is configured")]
    AuthRequiredMismatch,

    #[error("engine not available: {0}")]
    EngineUnavailable(String),

    #[error("remote engine closed the connection")]
    RemoteClosed,
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// User-visible message strings handed to the [`crate::Report`] capability.
pub(crate) mod msg {
    pub const ENGINE_TERMINATED: &str = "Engine terminated";
    pub const FAILED_TO_START: &str = "Failed to start engine";
    pub const UCI_PROTOCOL_ERROR: &str = "UCI protocol error";
    pub const AUTH_FAILED: &str = "Authentication failed";
    pub const AUTH_REQUIRED_MISMATCH: &str =
        "Server requires authentication but none is configured";
    pub const FINGERPRINT_MISMATCH: &str = "Server certificate fingerprint mismatch";
    pub const TLS_FAILED: &str = "TLS connection failed";
    pub const CONFIG_ERROR: &str = "Invalid network engine configuration";
}

/// Map a session failure to the message shown to the user.
///
/// `started` distinguishes an engine that died mid-game from one that never
/// produced a line.
pub(crate) fn user_message(err: &EngineError, endpoint: &Endpoint, started: bool) -> String {
    match err {
        EngineError::Transport(e) => transport_message(e, endpoint, started),
        EngineError::AuthFailed => msg::AUTH_FAILED.into(),
        EngineError::AuthRequiredMismatch => msg::AUTH_REQUIRED_MISMATCH.into(),
        EngineError::EngineUnavailable(name) => format!("Engine not available: {name}"),
        EngineError::RemoteClosed => {
            if started {
                msg::ENGINE_TERMINATED.into()
            } else {
                msg::FAILED_TO_START.into()
            }
        }
    }
}

fn transport_message(err: &TransportError, endpoint: &Endpoint, started: bool) -> String {
    match err {
        TransportError::UnknownHost(host) => format!("Unknown host: {host}"),
        TransportError::Refused(target) => format!("Connection refused: {target}"),
        // The tag lists which alternate endpoints were configured, so a
        // support log can tell a bare-LAN setup from a half-filled one.
        TransportError::Timeout(_) => format!(
            "Connection timed out [relay={}:{} session={}chars ext={} mdns={}]",
            endpoint.relay_host,
            endpoint.relay_port,
            endpoint.relay_session_id.len(),
            endpoint.external_host,
            endpoint.mdns_service_name,
        ),
        TransportError::TlsHandshake {
            fingerprint_mismatch: true,
            ..
        } => msg::FINGERPRINT_MISMATCH.into(),
        TransportError::TlsHandshake { .. } => msg::TLS_FAILED.into(),
        TransportError::Config(_) => msg::CONFIG_ERROR.into(),
        TransportError::AllStrategiesFailed(_) => err.to_string(),
        TransportError::Cancelled => String::new(),
        TransportError::Relay(_) | TransportError::Io(_) => {
            if started {
                msg::ENGINE_TERMINATED.into()
            } else {
                msg::FAILED_TO_START.into()
            }
        }
    }
}
