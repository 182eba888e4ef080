//! Thread-safe line queue used between a chess GUI thread and the I/O tasks
//! of an engine session.
//!
//! A [`LinePipe`] carries whole text lines in FIFO order from one or more
//! producers to a (typically single) consumer. The consumer blocks with a
//! timeout; closing the pipe wakes every blocked reader. Both the
//! socket-backed and any process-backed engine use the same pipe pair, so
//! the semantics here are load-bearing for the whole engine facade:
//!
//! - A line pushed before `close()` is always observable by a later reader.
//! - `read()` returns `None` only when the pipe is closed *and* drained.
//! - A timed-out `read()` returns an empty line, distinct from `None`.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Timeouts at or above this many milliseconds block until data or close.
const FOREVER_MS: i64 = 1 << 30;

#[derive(Debug, Default)]
struct Inner {
    lines: VecDeque<String>,
    closed: bool,
}

/// FIFO line buffer with timed blocking reads and close-wakes-reader.
#[derive(Debug, Default)]
pub struct LinePipe {
    inner: Mutex<Inner>,
    cond: Condvar,
}

impl LinePipe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one line and wake a waiting reader. Never blocks.
    ///
    /// Pushes after `close()` are dropped; the consumer has already been
    /// told there is nothing more to read.
    pub fn push(&self, line: impl Into<String>) {
        let mut inner = self.lock();
        if inner.closed {
            return;
        }
        inner.lines.push_back(line.into());
        self.cond.notify_one();
    }

    /// Format and push, mirroring `push(format!(...))`.
    pub fn print_line(&self, args: std::fmt::Arguments<'_>) {
        self.push(args.to_string());
    }

    /// Remove and return the head line.
    ///
    /// Waits up to `timeout_ms` for a line to arrive. Returns `Some(line)`
    /// when data is available, `Some("")` when the timeout elapses on an
    /// open pipe, and `None` when the pipe is closed and empty. A negative
    /// timeout, or one at least [`FOREVER_MS`], blocks until data or close.
    pub fn read(&self, timeout_ms: i64) -> Option<String> {
        let deadline = if timeout_ms < 0 || timeout_ms >= FOREVER_MS {
            None
        } else {
            Some(Instant::now() + Duration::from_millis(timeout_ms as u64))
        };

        let mut inner = self.lock();
        loop {
            if let Some(line) = inner.lines.pop_front() {
                return Some(line);
            }
            if inner.closed {
                return None;
            }
            match deadline {
                None => {
                    inner = self
                        .cond
                        .wait(inner)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Some(String::new());
                    }
                    // Spurious wakeups are handled by looping back to the
                    // head check with the remaining time.
                    inner = self
                        .cond
                        .wait_timeout(inner, remaining)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
    }

    /// Block until a line arrives or the pipe is closed.
    pub fn read_blocking(&self) -> Option<String> {
        self.read(-1)
    }

    /// Close the pipe and wake every blocked reader. Idempotent.
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        self.cond.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
