//! The three threads behind one engine session and the state they share.
//!
//! - The **reader** connects, runs the handshake, then pumps engine output
//!   into the engine→GUI pipe.
//! - The **writer** waits for the handshake gate, then pumps the GUI→engine
//!   pipe onto the socket. It must not emit a single byte before the gate
//!   opens; doing so would race the server's auth handshake.
//! - The **watchdog** gives the engine a fixed window to prove it speaks
//!   UCI.
//!
//! Any of the three can end the session. The first to do so reports the
//! error (unless shutdown was requested); the others observe the flags and
//! exit silently.

use crate::error::{self, msg, EngineError};
use crate::handshake;
use crate::Report;
use config::Endpoint;
use pipe::LinePipe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use transport::{LineReader, SharedStream, TransportError};

/// How long the engine has to produce `uciok` after `start()`.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Writer poll interval while waiting on the handshake gate.
const GATE_POLL: Duration = Duration::from_millis(50);

/// Watchdog poll slice, so shutdown interrupts the wait promptly.
const WATCHDOG_POLL: Duration = Duration::from_millis(100);

#[derive(Default)]
pub(crate) struct SessionState {
    pub shutdown: AtomicBool,
    pub error: AtomicBool,
    pub running: AtomicBool,
    pub started_ok: AtomicBool,
    pub uci_ok: AtomicBool,
    /// Opens once auth and engine selection are done; gates the writer.
    pub gate: AtomicBool,
    stream: Mutex<Option<SharedStream>>,
    last_position: Mutex<Option<String>>,
    last_go: Mutex<Option<String>>,
}

impl SessionState {
    /// Transition to the error state and report, exactly once per session.
    ///
    /// Suppressed entirely while shutting down: errors induced by our own
    /// teardown are expected.
    pub fn fail(&self, report: &dyn Report, message: &str) {
        if self.shutdown.load(Ordering::Relaxed) || message.is_empty() {
            return;
        }
        if self
            .error
            .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            warn!("engine session failed: {message}");
            report.report_error(message);
        }
    }

    pub fn stream(&self) -> Option<SharedStream> {
        lock(&self.stream).clone()
    }

    pub fn last_position(&self) -> Option<String> {
        lock(&self.last_position).clone()
    }

    pub fn last_go(&self) -> Option<String> {
        lock(&self.last_go).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Everything a session thread needs, cheaply cloneable.
#[derive(Clone)]
pub(crate) struct SessionCtx {
    pub state: Arc<SessionState>,
    pub endpoint: Arc<Endpoint>,
    pub report: Arc<dyn Report>,
    pub gui_to_engine: Arc<LinePipe>,
    pub engine_to_gui: Arc<LinePipe>,
}

/// Spawn the reader, writer, and watchdog threads for one session.
pub(crate) fn spawn(ctx: &SessionCtx) -> Vec<thread::JoinHandle<()>> {
    let mut handles = Vec::with_capacity(3);
    let threads: [(&str, fn(SessionCtx)); 3] = [
        ("engine-watchdog", watchdog_main),
        ("engine-reader", reader_main),
        ("engine-writer", writer_main),
    ];
    for (name, main) in threads {
        let ctx_for_thread = ctx.clone();
        let ctx_for_err = ctx.clone();
        match thread::Builder::new()
            .name(name.to_string())
            .spawn(move || main(ctx_for_thread))
        {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                warn!("failed to spawn {name}: {e}");
                ctx_for_err.state.fail(&*ctx_for_err.report, msg::FAILED_TO_START);
            }
        }
    }
    handles
}

/// Enqueue one engine line for the GUI, flipping the startup flags on the
/// first one (including a line re-injected from the pre-auth read).
pub(crate) fn push_engine_line(ctx: &SessionCtx, line: String) {
    if !ctx.state.started_ok.swap(true, Ordering::Relaxed) {
        ctx.state.running.store(true, Ordering::Relaxed);
        debug!("first engine line received");
    }
    ctx.engine_to_gui.push(line);
}

/// Best-effort `quit`, then tear the socket down to unblock both threads.
pub(crate) fn close_socket(state: &SessionState) {
    if let Some(stream) = state.stream() {
        let _ = stream.write_line("quit");
        stream.shutdown();
    }
}

fn reader_main(ctx: SessionCtx) {
    info!(
        "connecting to {}:{} (tls={})",
        ctx.endpoint.host, ctx.endpoint.port, ctx.endpoint.use_tls
    );
    if let Err(err) = run_reader(&ctx) {
        match err {
            EngineError::Transport(TransportError::Cancelled) => {}
            err => {
                let started = ctx.state.started_ok.load(Ordering::Relaxed);
                let message = error::user_message(&err, &ctx.endpoint, started);
                ctx.state.fail(&*ctx.report, &message);
            }
        }
    }
    ctx.state.running.store(false, Ordering::Relaxed);
    ctx.engine_to_gui.close();
    debug!("reader thread finished");
}

fn run_reader(ctx: &SessionCtx) -> crate::error::Result<()> {
    let stream = transport::connect(&ctx.endpoint, &ctx.state.shutdown)?;
    let shared = SharedStream::new(stream)?;
    *lock(&ctx.state.stream) = Some(shared.clone());

    // The handshake and the UCI loop share this reader, so nothing read
    // ahead of a line boundary is lost when the loop takes over.
    let mut reader = LineReader::new(shared.clone());
    handshake::run(&mut reader, &shared, ctx)?;

    ctx.state.gate.store(true, Ordering::Release);
    info!("handshake complete, writer unblocked");

    loop {
        match reader.read_line(&ctx.state.shutdown)? {
            Some(line) => {
                if line.trim_start().starts_with("AUTH_REQUIRED") {
                    return Err(EngineError::AuthRequiredMismatch);
                }
                push_engine_line(ctx, line);
            }
            None => return Err(EngineError::RemoteClosed),
        }
    }
}

fn writer_main(ctx: SessionCtx) {
    while !ctx.state.gate.load(Ordering::Acquire) {
        if ctx.state.shutdown.load(Ordering::Relaxed)
            || ctx.state.error.load(Ordering::Relaxed)
        {
            finish_writer(&ctx);
            return;
        }
        thread::sleep(GATE_POLL);
    }

    let Some(stream) = ctx.state.stream() else {
        finish_writer(&ctx);
        return;
    };

    while let Some(line) = ctx.gui_to_engine.read_blocking() {
        // Remember the game state commands for reconnect bookkeeping.
        if line.starts_with("position ") {
            *lock(&ctx.state.last_position) = Some(line.clone());
        } else if line.starts_with("go ") {
            *lock(&ctx.state.last_go) = Some(line.clone());
        }
        if let Err(e) = stream.write_line(&line) {
            debug!("engine write failed: {e}");
            break;
        }
    }

    // Write failure, or the GUI→engine pipe closed under us; either ends
    // the session unless shutdown explains it.
    ctx.state.fail(&*ctx.report, msg::ENGINE_TERMINATED);
    finish_writer(&ctx);
    debug!("writer thread finished");
}

fn finish_writer(ctx: &SessionCtx) {
    ctx.state.running.store(false, Ordering::Relaxed);
    close_socket(&ctx.state);
    ctx.gui_to_engine.close();
}

fn watchdog_main(ctx: SessionCtx) {
    let deadline = Instant::now() + STARTUP_TIMEOUT;
    loop {
        if ctx.state.shutdown.load(Ordering::Relaxed) {
            return;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        thread::sleep(remaining.min(WATCHDOG_POLL));
    }
    if ctx.state.error.load(Ordering::Relaxed) {
        return;
    }
    if !ctx.state.started_ok.load(Ordering::Relaxed)
        || !ctx.state.uci_ok.load(Ordering::Relaxed)
    {
        ctx.state.fail(&*ctx.report, msg::UCI_PROTOCOL_ERROR);
        // Terminal: wake the other threads so the pipes close.
        close_socket(&ctx.state);
    }
}
