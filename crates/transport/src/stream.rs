//! Byte streams shared between the session's reader and writer threads.
//!
//! One socket carries both directions of UCI traffic. [`SharedStream`]
//! wraps it in a mutex; the underlying socket carries a short read timeout
//! so the reading side never holds the lock while idle, and the writing
//! side takes it only long enough to push one line out. This keeps the
//! full-duplex pipe honest without non-blocking I/O plumbing.

use crate::error::{Result, TransportError};
use rustls::{ClientConnection, StreamOwned};
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// How long a single poll waits on the socket before releasing the lock.
const POLL_READ_TIMEOUT: Duration = Duration::from_millis(25);

/// A connected stream, optionally TLS-wrapped.
#[derive(Debug)]
pub enum NetStream {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

impl NetStream {
    fn tcp(&self) -> &TcpStream {
        match self {
            NetStream::Plain(s) => s,
            NetStream::Tls(s) => &s.sock,
        }
    }
}

impl Read for NetStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            NetStream::Plain(s) => s.read(buf),
            NetStream::Tls(s) => s.read(buf),
        }
    }
}

impl Write for NetStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            NetStream::Plain(s) => s.write(buf),
            NetStream::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            NetStream::Plain(s) => s.flush(),
            NetStream::Tls(s) => s.flush(),
        }
    }
}

/// Outcome of one non-committal read attempt.
pub enum ReadEvent {
    Data(usize),
    /// Nothing arrived within the poll window.
    Idle,
    Eof,
}

/// Mutex-shared stream handed to both session threads.
#[derive(Clone)]
pub struct SharedStream {
    inner: Arc<Mutex<NetStream>>,
    /// Cloned socket handle used to unblock both threads on shutdown.
    tcp: Arc<TcpStream>,
}

impl SharedStream {
    pub fn new(stream: NetStream) -> Result<Self> {
        let tcp = stream.tcp().try_clone()?;
        tcp.set_read_timeout(Some(POLL_READ_TIMEOUT))?;
        Ok(Self {
            inner: Arc::new(Mutex::new(stream)),
            tcp: Arc::new(tcp),
        })
    }

    /// Read into `buf` without waiting longer than the poll window.
    pub fn poll_read(&self, buf: &mut [u8]) -> Result<ReadEvent> {
        match self.lock().read(buf) {
            Ok(0) => Ok(ReadEvent::Eof),
            Ok(n) => Ok(ReadEvent::Data(n)),
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock
                        | std::io::ErrorKind::TimedOut
                        | std::io::ErrorKind::Interrupted
                ) =>
            {
                Ok(ReadEvent::Idle)
            }
            // A peer that drops the link without a TLS close_notify still
            // counts as end of stream.
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(ReadEvent::Eof),
            Err(e) => Err(e.into()),
        }
    }

    /// Write one line, newline-terminated, and flush.
    pub fn write_line(&self, line: &str) -> Result<()> {
        let mut guard = self.lock();
        guard.write_all(line.as_bytes())?;
        guard.write_all(b"\n")?;
        guard.flush()?;
        Ok(())
    }

    /// Tear the connection down, waking any thread blocked on the socket.
    pub fn shutdown(&self) {
        let _ = self.tcp.shutdown(Shutdown::Both);
    }

    fn lock(&self) -> MutexGuard<'_, NetStream> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Buffered line input over a [`SharedStream`].
///
/// The buffer lives here, on the single consuming side, so no bytes read
/// ahead of a line boundary are ever lost when ownership of the session
/// moves from the handshake to the UCI loop: both phases share this one
/// reader.
pub struct LineReader {
    stream: SharedStream,
    buf: Vec<u8>,
    chunk: [u8; 4096],
}

impl LineReader {
    pub fn new(stream: SharedStream) -> Self {
        Self {
            stream,
            buf: Vec::new(),
            chunk: [0; 4096],
        }
    }

    /// Block until a full line arrives, the stream ends (`Ok(None)`), or
    /// `stop` is raised (`Err(Cancelled)`).
    ///
    /// Line terminators are stripped; a final unterminated fragment before
    /// EOF is returned as a line of its own.
    pub fn read_line(&mut self, stop: &AtomicBool) -> Result<Option<String>> {
        loop {
            if let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }
            if stop.load(Ordering::Relaxed) {
                return Err(TransportError::Cancelled);
            }
            match self.stream.poll_read(&mut self.chunk)? {
                ReadEvent::Data(n) => self.buf.extend_from_slice(&self.chunk[..n]),
                ReadEvent::Idle => {}
                ReadEvent::Eof => {
                    if self.buf.is_empty() {
                        return Ok(None);
                    }
                    let line = String::from_utf8_lossy(&self.buf).into_owned();
                    self.buf.clear();
                    return Ok(Some(line));
                }
            }
        }
    }
}
