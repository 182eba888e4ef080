//! Shared helpers for the end-to-end session tests.
#![allow(dead_code)]

use engine::{NetworkEngine, Report};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// One-connection mock server driven by a per-test script closure.
pub struct MockServer {
    pub port: u16,
    handle: thread::JoinHandle<()>,
}

impl MockServer {
    pub fn spawn<F>(script: F) -> Self
    where
        F: FnOnce(TcpStream) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            if let Ok((sock, _)) = listener.accept() {
                sock.set_nodelay(true).ok();
                script(sock);
            }
        });
        Self { port, handle }
    }

    /// Wait for the scripted connection to finish, propagating any panic
    /// from in-script assertions.
    pub fn join(self) {
        self.handle.join().expect("mock server script panicked");
    }
}

/// A loopback port with nothing listening on it.
pub fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Read lines from the client until EOF, recording them.
pub fn record_lines(sock: TcpStream, into: &Arc<Mutex<Vec<String>>>) {
    let reader = BufReader::new(sock);
    for line in reader.lines() {
        let Ok(line) = line else { break };
        into.lock().unwrap().push(line);
    }
}

/// Hold the connection open, discarding client input, until EOF.
pub fn linger(sock: TcpStream) {
    let mut reader = BufReader::new(sock);
    let mut buf = [0u8; 256];
    while matches!(reader.read(&mut buf), Ok(n) if n > 0) {}
}

pub fn send(sock: &mut TcpStream, text: &str) {
    sock.write_all(text.as_bytes()).expect("mock server write");
    sock.flush().expect("mock server flush");
}

pub fn expect_line(reader: &mut BufReader<TcpStream>, expected: &str) {
    let mut line = String::new();
    reader.read_line(&mut line).expect("mock server read");
    assert_eq!(line.trim_end(), expected);
}

/// Error reporter that records every message.
#[derive(Default)]
pub struct RecordingReport {
    errors: Mutex<Vec<String>>,
}

impl RecordingReport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    /// Block until at least one error arrives or the deadline passes.
    pub fn wait_for_error(&self, timeout: Duration) -> Option<String> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Some(first) = self.errors.lock().unwrap().first() {
                return Some(first.clone());
            }
            thread::sleep(Duration::from_millis(20));
        }
        None
    }
}

impl Report for RecordingReport {
    fn report_error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }
}

/// Read engine output, skipping timeout blips, until a non-empty line or
/// the pipe closes (`None`), bounded by `timeout`.
pub fn next_line(engine: &NetworkEngine, timeout: Duration) -> Option<String> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        match engine.read_line(200) {
            Some(line) if line.is_empty() => continue,
            other => return other,
        }
    }
    panic!("no engine output within {timeout:?}");
}

/// Wait until the engine→GUI pipe reports closed.
pub fn wait_closed(engine: &NetworkEngine, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if engine.read_line(200).is_none() {
            return;
        }
    }
    panic!("engine pipe did not close within {timeout:?}");
}
