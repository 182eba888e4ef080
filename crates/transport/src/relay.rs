//! Relay rendezvous client.
//!
//! The relay pairs a server-side session and a client-side session by
//! shared id, then bridges bytes. The client sends one command line and
//! waits for one response line; everything after that newline already
//! belongs to the paired server, so the response is consumed one byte at a
//! time. Reading through any buffered wrapper here would pull the server's
//! greeting (its `AUTH_REQUIRED` line, or the first UCI output) into a
//! buffer that is discarded when the session takes over the socket.

use crate::error::{Result, TransportError};
use crate::strategy::resolve_addr;
use config::RelayEndpoint;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;
use tracing::{info, warn};

/// Connect timeout for reaching the relay itself.
pub const RELAY_CONNECT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Socket read timeout while waiting for the rendezvous response.
pub const RELAY_IO_TIMEOUT: Duration = Duration::from_millis(15_000);

/// Connect through the relay and wait until a server is bridged in.
///
/// Relay links are always plain TCP; TLS and auth run on top of the
/// bridged stream, against the real server.
pub fn connect(relay: &RelayEndpoint) -> Result<TcpStream> {
    let addr = resolve_addr(&relay.host, relay.port)?;
    let mut sock = TcpStream::connect_timeout(&addr, RELAY_CONNECT_TIMEOUT).map_err(|e| {
        crate::strategy::classify_connect_error(e, &relay.host, relay.port)
    })?;
    sock.set_nodelay(true)?;
    sock.set_read_timeout(Some(RELAY_IO_TIMEOUT))?;

    sock.write_all(format!("SESSION {} client\n", relay.session_id).as_bytes())?;
    sock.flush()?;

    let response = read_response_line(&mut sock)?;
    if response == "CONNECTED" {
        info!("relay: connected via {}:{}", relay.host, relay.port);
        sock.set_read_timeout(None)?;
        Ok(sock)
    } else if response.starts_with("ERROR") {
        warn!("relay rejected session: {response}");
        Err(TransportError::Relay(response))
    } else {
        Err(TransportError::Relay(format!(
            "unexpected relay response: {response}"
        )))
    }
}

/// Read up to the first line feed, one byte at a time, never past it.
fn read_response_line(sock: &mut TcpStream) -> Result<String> {
    let mut line = Vec::with_capacity(64);
    let mut byte = [0u8; 1];
    loop {
        let n = sock.read(&mut byte).map_err(|e| {
            if matches!(
                e.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
            ) {
                TransportError::Timeout("relay response".into())
            } else {
                TransportError::Io(e)
            }
        })?;
        if n == 0 {
            if line.is_empty() {
                return Err(TransportError::Relay("relay closed connection".into()));
            }
            break;
        }
        match byte[0] {
            b'\n' => break,
            b'\r' => {}
            b => line.push(b),
        }
    }
    Ok(String::from_utf8_lossy(&line).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ntest::timeout;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;
    use std::thread;

    fn relay_endpoint(port: u16) -> RelayEndpoint {
        RelayEndpoint {
            host: "127.0.0.1".into(),
            port,
            session_id: "sess-42".into(),
        }
    }

    fn spawn_relay(
        response: &'static [u8],
    ) -> (u16, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (sock, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(sock.try_clone().unwrap());
            let mut request = String::new();
            reader.read_line(&mut request).unwrap();
            (&sock).write_all(response).unwrap();
            request
        });
        (port, handle)
    }

    #[test]
    #[timeout(5000)]
    fn sends_session_command_and_accepts_connected() {
        let (port, handle) = spawn_relay(b"CONNECTED\n");
        let sock = connect(&relay_endpoint(port)).unwrap();
        assert_eq!(handle.join().unwrap(), "SESSION sess-42 client\n");
        drop(sock);
    }

    #[test]
    #[timeout(5000)]
    fn error_response_is_surfaced() {
        let (port, _handle) = spawn_relay(b"ERROR unknown session\n");
        let err = connect(&relay_endpoint(port)).unwrap_err();
        assert!(matches!(
            err,
            TransportError::Relay(ref msg) if msg == "ERROR unknown session"
        ));
    }

    #[test]
    #[timeout(5000)]
    fn unexpected_response_is_rejected() {
        let (port, _handle) = spawn_relay(b"HELLO\n");
        let err = connect(&relay_endpoint(port)).unwrap_err();
        assert!(matches!(
            err,
            TransportError::Relay(ref msg) if msg.contains("unexpected relay response")
        ));
    }

    #[test]
    #[timeout(5000)]
    fn bytes_after_the_response_line_are_left_for_the_session() {
        // The server banner arrives in the same segment as CONNECTED; the
        // rendezvous consumer must not eat any of it.
        let (port, _handle) = spawn_relay(b"CONNECTED\nid name StubEngine\nuciok\n");
        let sock = connect(&relay_endpoint(port)).unwrap();

        let mut reader = BufReader::new(sock);
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line, "id name StubEngine\n");
        line.clear();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line, "uciok\n");
    }

    #[test]
    #[timeout(5000)]
    fn carriage_returns_are_stripped() {
        let (port, _handle) = spawn_relay(b"CONNECTED\r\n");
        assert!(connect(&relay_endpoint(port)).is_ok());
    }
}
