//! mDNS resolution of chess UCI servers on the local link.
//!
//! Servers advertise themselves as `_chess-uci._tcp` instances; resolving
//! the configured instance name yields the server's current address and
//! port, which beats a stale hardcoded LAN IP after a DHCP lease change.

use mdns_sd::{ServiceDaemon, ServiceEvent};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// DNS-SD service type advertised by chess UCI servers.
pub const SERVICE_TYPE: &str = "_chess-uci._tcp.local.";

/// Browse for `instance` and resolve its address and port.
///
/// Returns `None` when the service was not resolved within `timeout`;
/// discovery is stopped either way.
pub fn resolve(instance: &str, timeout: Duration) -> Option<(String, u16)> {
    let daemon = match ServiceDaemon::new() {
        Ok(d) => d,
        Err(e) => {
            warn!("mDNS daemon unavailable: {e}");
            return None;
        }
    };
    let receiver = match daemon.browse(SERVICE_TYPE) {
        Ok(r) => r,
        Err(e) => {
            warn!("mDNS browse failed: {e}");
            let _ = daemon.shutdown();
            return None;
        }
    };

    let wanted = format!("{instance}.{SERVICE_TYPE}");
    let deadline = Instant::now() + timeout;
    let mut resolved = None;

    while resolved.is_none() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            debug!("mDNS resolution timed out for {instance}");
            break;
        }
        match receiver.recv_timeout(remaining) {
            Ok(ServiceEvent::ServiceResolved(info)) => {
                debug!("mDNS resolved: {}", info.get_fullname());
                if info.get_fullname() == wanted {
                    if let Some(addr) = info.get_addresses().iter().next() {
                        resolved = Some((addr.to_string(), info.get_port()));
                    }
                }
            }
            Ok(event) => debug!("mDNS event: {event:?}"),
            Err(_) => break,
        }
    }

    let _ = daemon.stop_browse(SERVICE_TYPE);
    let _ = daemon.shutdown();
    resolved
}
