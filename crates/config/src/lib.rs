//! Endpoint descriptor for a remote UCI engine and its on-disk text form.
//!
//! A NETE file is plain UTF-8, one field per line, fourteen lines when
//! fully populated:
//!
//! ```text
//! NETE
//! <host>
//! <port>
//! tls | notls
//! <auth token>
//! <certificate fingerprint>
//! none | token | psk
//! <psk key>
//! <relay host>
//! <relay port>
//! <relay session id>
//! <external host>
//! <mdns service name>
//! <selected engine>
//! ```
//!
//! Trailing lines may be omitted; absent fields default to empty. Trailing
//! whitespace is trimmed from every field.

use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("not a network engine config (missing NETE magic)")]
    BadMagic,

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// How the client authenticates to the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthMethod {
    None,
    #[default]
    Token,
    Psk,
}

impl AuthMethod {
    /// Empty input maps to `Token` for compatibility with older files.
    fn parse(text: &str) -> Self {
        match text {
            "none" => AuthMethod::None,
            "psk" => AuthMethod::Psk,
            _ => AuthMethod::Token,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::None => "none",
            AuthMethod::Token => "token",
            AuthMethod::Psk => "psk",
        }
    }
}

/// A fully-present relay rendezvous target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEndpoint {
    pub host: String,
    pub port: u16,
    pub session_id: String,
}

/// Everything needed to reach and authenticate to one remote engine server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    pub auth_token: String,
    /// Colon-separated SHA-256 hex of the server's leaf certificate;
    /// empty means unpinned.
    pub cert_fingerprint: String,
    pub auth_method: AuthMethod,
    pub psk_key: String,
    pub relay_host: String,
    pub relay_port: u16,
    pub relay_session_id: String,
    pub external_host: String,
    pub mdns_service_name: String,
    /// Engine to request on a multiplexed server; empty selects the
    /// server's default (legacy per-port mode).
    pub selected_engine: String,
}

impl Endpoint {
    /// Parse NETE text. Tolerates missing trailing lines and unparsable
    /// port numbers (which read as 0 and fail later, when the strategy
    /// that needs them is attempted).
    pub fn parse(text: &str) -> Result<Self> {
        let lines: Vec<&str> = text.lines().map(|l| l.trim_end()).collect();
        if lines.first().copied() != Some("NETE") {
            return Err(ConfigError::BadMagic);
        }
        let field = |i: usize| lines.get(i).copied().unwrap_or("").to_string();
        let port_field = |i: usize| field(i).parse::<u16>().unwrap_or(0);

        let endpoint = Endpoint {
            host: field(1),
            port: port_field(2),
            use_tls: field(3).eq_ignore_ascii_case("tls"),
            auth_token: field(4),
            cert_fingerprint: field(5),
            auth_method: AuthMethod::parse(&field(6)),
            psk_key: field(7),
            relay_host: field(8),
            relay_port: port_field(9),
            relay_session_id: field(10),
            external_host: field(11),
            mdns_service_name: field(12),
            selected_engine: field(13),
        };
        debug!(
            host = %endpoint.host,
            port = endpoint.port,
            tls = endpoint.use_tls,
            method = endpoint.auth_method.as_str(),
            relay = %endpoint.relay_host,
            mdns = %endpoint.mdns_service_name,
            engine = %endpoint.selected_engine,
            "parsed endpoint"
        );
        Ok(endpoint)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::parse(&std::fs::read_to_string(path)?)
    }

    /// Serialize to the full fourteen-line NETE form.
    pub fn to_nete(&self) -> String {
        format!(
            "NETE\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n",
            self.host,
            self.port,
            if self.use_tls { "tls" } else { "notls" },
            self.auth_token,
            self.cert_fingerprint,
            self.auth_method.as_str(),
            self.psk_key,
            self.relay_host,
            self.relay_port,
            self.relay_session_id,
            self.external_host,
            self.mdns_service_name,
            self.selected_engine,
        )
    }

    /// The relay tuple, when all three parts are present.
    pub fn relay(&self) -> Option<RelayEndpoint> {
        if self.relay_host.is_empty() || self.relay_port == 0 || self.relay_session_id.is_empty()
        {
            return None;
        }
        Some(RelayEndpoint {
            host: self.relay_host.clone(),
            port: self.relay_port,
            session_id: self.relay_session_id.clone(),
        })
    }

    pub fn has_external(&self) -> bool {
        !self.external_host.is_empty()
    }

    pub fn has_mdns(&self) -> bool {
        !self.mdns_service_name.is_empty()
    }
}
