//! Endpoint selection: try every configured way of reaching the server, in
//! a fixed order, and fall back to patient retrying only when nothing
//! smarter is available.
//!
//! Order and timeouts:
//!
//! | # | strategy       | precondition            | timeout          |
//! |---|----------------|-------------------------|------------------|
//! | 0 | mDNS resolve   | service name configured | 1.5 s + 2 s      |
//! | 1 | LAN direct     | always                  | 2 s              |
//! | 2 | UPnP external  | external host differs   | 5 s              |
//! | 3 | relay          | relay tuple complete    | 10 s + handshake |
//! | 4 | backoff retry  | no relay configured     | 15 s × 5         |
//!
//! When a relay is configured and everything fails, the aggregated error is
//! reported immediately; retrying a host the fast paths already proved
//! unreachable wastes the user's time.

use crate::error::{Result, TransportError};
use crate::stream::NetStream;
use crate::{mdns, relay, tls};
use config::Endpoint;
use std::collections::HashSet;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Connect timeout for the LAN fast path (and mDNS-resolved hosts).
pub const LAN_TIMEOUT: Duration = Duration::from_millis(2000);

/// Connect timeout for the UPnP-exposed external address.
pub const UPNP_TIMEOUT: Duration = Duration::from_millis(5000);

/// Cap on mDNS discovery.
pub const MDNS_TIMEOUT: Duration = Duration::from_millis(1500);

/// Retry pacing for the fallback path.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub connect_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(1000),
            max_backoff: Duration::from_millis(30_000),
            connect_timeout: Duration::from_millis(15_000),
        }
    }
}

impl RetryPolicy {
    /// The delays slept between consecutive attempts.
    pub fn backoff_schedule(&self) -> Vec<Duration> {
        let mut delays = Vec::new();
        let mut backoff = self.initial_backoff;
        for _ in 1..self.max_attempts {
            delays.push(backoff);
            backoff = (backoff * 2).min(self.max_backoff);
        }
        delays
    }
}

/// Produce a connected (and, if configured, TLS-wrapped) stream for the
/// endpoint, trying strategies in the fixed order above.
///
/// `cancel` aborts the cascade between steps and during backoff sleeps.
pub fn connect(endpoint: &Endpoint, cancel: &AtomicBool) -> Result<NetStream> {
    let has_external = endpoint.has_external();
    let has_mdns = endpoint.has_mdns();
    let relay_endpoint = endpoint.relay();

    info!(
        host = %endpoint.host,
        port = endpoint.port,
        tls = endpoint.use_tls,
        external = %endpoint.external_host,
        relay = %endpoint.relay_host,
        mdns = %endpoint.mdns_service_name,
        "selecting connection strategy"
    );

    if !has_external && !has_mdns && relay_endpoint.is_none() {
        debug!("no alternate endpoints configured, using retry loop");
        return connect_with_retry(endpoint, cancel, &RetryPolicy::default());
    }

    let mut failures: Vec<String> = Vec::new();
    let mut tried: HashSet<(String, u16)> = HashSet::new();

    // 0. mDNS discovery of the server's current address.
    if has_mdns {
        check_cancel(cancel)?;
        match mdns::resolve(&endpoint.mdns_service_name, MDNS_TIMEOUT) {
            Some((host, port)) => {
                info!(
                    "strategy: mDNS resolved {} to {host}:{port}",
                    endpoint.mdns_service_name
                );
                tried.insert((host.clone(), port));
                match connect_to(&host, port, LAN_TIMEOUT, endpoint) {
                    Ok(stream) => return Ok(stream),
                    Err(e) => {
                        warn!("strategy: mDNS-resolved host failed: {e}");
                        failures.push(format!("mDNS({host}): {e}"));
                    }
                }
            }
            None => {
                debug!("strategy: mDNS resolution timed out");
                failures.push("mDNS: timeout".into());
            }
        }
    }

    // 1. LAN direct, fast timeout.
    check_cancel(cancel)?;
    if tried.insert((endpoint.host.clone(), endpoint.port)) {
        debug!("strategy: trying LAN {}:{}", endpoint.host, endpoint.port);
        match connect_to(&endpoint.host, endpoint.port, LAN_TIMEOUT, endpoint) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                warn!("strategy: LAN failed: {e}");
                failures.push(format!("LAN({}:{}): {e}", endpoint.host, endpoint.port));
            }
        }
    }

    // 2. UPnP-exposed external address, unless it targets what was already
    //    tried.
    if has_external {
        check_cancel(cancel)?;
        if tried.insert((endpoint.external_host.clone(), endpoint.port)) {
            debug!(
                "strategy: trying UPnP {}:{}",
                endpoint.external_host, endpoint.port
            );
            match connect_to(&endpoint.external_host, endpoint.port, UPNP_TIMEOUT, endpoint) {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    warn!("strategy: UPnP failed: {e}");
                    failures.push(format!("UPnP({}): {e}", endpoint.external_host));
                }
            }
        }
    }

    // 3. Relay rendezvous. Always plain TCP; the handshake layer runs on
    //    the bridged stream.
    if let Some(relay_endpoint) = &relay_endpoint {
        check_cancel(cancel)?;
        debug!(
            "strategy: trying relay {}:{}",
            relay_endpoint.host, relay_endpoint.port
        );
        match relay::connect(relay_endpoint) {
            Ok(sock) => return Ok(NetStream::Plain(sock)),
            Err(e) => {
                warn!("strategy: relay failed: {e}");
                failures.push(format!(
                    "Relay({}:{}): {e}",
                    relay_endpoint.host, relay_endpoint.port
                ));
            }
        }
        // A relay was the endpoint of last resort; retrying the primary
        // host after it failed would only stall the error report.
        return Err(TransportError::AllStrategiesFailed(failures));
    }

    info!("strategy: all fast paths failed, falling back to retry");
    connect_with_retry(endpoint, cancel, &RetryPolicy::default())
}

/// Repeatedly connect to the primary host with exponential backoff.
pub fn connect_with_retry(
    endpoint: &Endpoint,
    cancel: &AtomicBool,
    policy: &RetryPolicy,
) -> Result<NetStream> {
    let mut backoff = policy.initial_backoff;
    let mut last_error = None;

    for attempt in 1..=policy.max_attempts {
        check_cancel(cancel)?;
        info!(
            "connection attempt {attempt}/{} to {}:{}{}",
            policy.max_attempts,
            endpoint.host,
            endpoint.port,
            if endpoint.use_tls { " (TLS)" } else { "" }
        );
        match connect_to(&endpoint.host, endpoint.port, policy.connect_timeout, endpoint) {
            Ok(stream) => return Ok(stream),
            // Deterministic failures: more attempts cannot change the outcome.
            Err(e @ TransportError::Config(_)) => return Err(e),
            Err(
                e @ TransportError::TlsHandshake {
                    fingerprint_mismatch: true,
                    ..
                },
            ) => return Err(e),
            Err(e) => {
                warn!("connection attempt {attempt} failed: {e}");
                last_error = Some(e);
                if attempt < policy.max_attempts {
                    if !sleep_cancellable(backoff, cancel) {
                        return Err(TransportError::Cancelled);
                    }
                    backoff = (backoff * 2).min(policy.max_backoff);
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        TransportError::Timeout(format!("{}:{}", endpoint.host, endpoint.port))
    }))
}

/// One connection to `host:port`, TLS-wrapped when the endpoint asks for it.
fn connect_to(
    host: &str,
    port: u16,
    timeout: Duration,
    endpoint: &Endpoint,
) -> Result<NetStream> {
    if host.is_empty() || port == 0 {
        return Err(TransportError::Config(format!(
            "missing or invalid host/port ({host:?}:{port})"
        )));
    }
    let addr = resolve_addr(host, port)?;
    let tcp = TcpStream::connect_timeout(&addr, timeout)
        .map_err(|e| classify_connect_error(e, host, port))?;
    tcp.set_nodelay(true)?;
    if endpoint.use_tls {
        tls::wrap(tcp, host, &endpoint.cert_fingerprint, timeout)
    } else {
        Ok(NetStream::Plain(tcp))
    }
}

/// Resolve to the first address, mapping DNS failures to `UnknownHost`.
pub(crate) fn resolve_addr(host: &str, port: u16) -> Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .map_err(|_| TransportError::UnknownHost(host.to_string()))?
        .next()
        .ok_or_else(|| TransportError::UnknownHost(host.to_string()))
}

pub(crate) fn classify_connect_error(e: std::io::Error, host: &str, port: u16) -> TransportError {
    let target = format!("{host}:{port}");
    match e.kind() {
        std::io::ErrorKind::ConnectionRefused => TransportError::Refused(target),
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
            TransportError::Timeout(target)
        }
        _ => TransportError::Io(e),
    }
}

fn check_cancel(cancel: &AtomicBool) -> Result<()> {
    if cancel.load(Ordering::Relaxed) {
        Err(TransportError::Cancelled)
    } else {
        Ok(())
    }
}

/// Sleep in short slices so shutdown can interrupt a long backoff.
/// Returns false when cancelled.
fn sleep_cancellable(duration: Duration, cancel: &AtomicBool) -> bool {
    let deadline = std::time::Instant::now() + duration;
    loop {
        if cancel.load(Ordering::Relaxed) {
            return false;
        }
        let remaining = deadline.saturating_duration_since(std::time::Instant::now());
        if remaining.is_zero() {
            return true;
        }
        std::thread::sleep(remaining.min(Duration::from_millis(50)));
    }
}
