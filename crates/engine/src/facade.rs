//! The GUI-facing engine object.
//!
//! [`NetworkEngine`] owns the session: the pipe pair, the shared state, and
//! the three worker threads. The GUI talks to it exclusively through
//! `write_line`/`read_line` plus the option helpers; everything on the
//! wire side happens behind the handshake gate.

use crate::session::{self, SessionCtx, SessionState};
use crate::Report;
use config::Endpoint;
use options::OptionsRegistry;
use pipe::LinePipe;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use tracing::{debug, info};

/// Host-side option values pushed to every engine after startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostOptions {
    /// Identity of the endpoint configuration this engine was started for;
    /// a change means the engine must be restarted.
    pub network_id: String,
    pub hash_mb: i64,
    pub syzygy_path: String,
    pub gaviota_tb_path: String,
}

#[derive(Debug, Clone)]
struct InitSnapshot {
    hash_mb: i64,
    syzygy_path: String,
    gaviota_tb_path: String,
}

/// A UCI engine reached over the network.
pub struct NetworkEngine {
    endpoint: Arc<Endpoint>,
    network_id: String,
    report: Arc<dyn Report>,
    state: Arc<SessionState>,
    gui_to_engine: Arc<LinePipe>,
    engine_to_gui: Arc<LinePipe>,
    options: Mutex<OptionsRegistry>,
    init: Mutex<Option<InitSnapshot>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl NetworkEngine {
    pub fn new(endpoint: Endpoint, network_id: impl Into<String>, report: Arc<dyn Report>) -> Self {
        Self {
            endpoint: Arc::new(endpoint),
            network_id: network_id.into(),
            report,
            state: Arc::new(SessionState::default()),
            gui_to_engine: Arc::new(LinePipe::new()),
            engine_to_gui: Arc::new(LinePipe::new()),
            options: Mutex::new(OptionsRegistry::new()),
            init: Mutex::new(None),
            threads: Mutex::new(Vec::new()),
        }
    }

    /// Start connecting. Failures are delivered through the [`Report`]
    /// capability, not returned here.
    pub fn start(&self) {
        let mut threads = lock(&self.threads);
        if !threads.is_empty() {
            return;
        }
        let ctx = SessionCtx {
            state: self.state.clone(),
            endpoint: self.endpoint.clone(),
            report: self.report.clone(),
            gui_to_engine: self.gui_to_engine.clone(),
            engine_to_gui: self.engine_to_gui.clone(),
        };
        *threads = session::spawn(&ctx);
    }

    /// Read one line of engine output.
    ///
    /// Returns `Some("")` on timeout and `None` once the session is over
    /// and the pipe is drained. `option` declarations and `uciok` are
    /// observed on the way through.
    pub fn read_line(&self, timeout_ms: i64) -> Option<String> {
        let line = self.engine_to_gui.read(timeout_ms)?;
        if !line.is_empty() {
            debug!("engine -> gui: {line}");
            self.observe(&line);
        }
        Some(line)
    }

    /// Queue one line for the engine. Dropped silently once the session is
    /// over.
    pub fn write_line(&self, line: &str) {
        debug!("gui -> engine: {line}");
        self.gui_to_engine.push(line);
    }

    /// Set a UCI option, emitting `setoption` only when the value is new.
    ///
    /// Unknown names are sent through unconditionally; the engine may well
    /// know options it never declared to us. Empty values use the `<empty>`
    /// placeholder.
    pub fn set_option(&self, name: &str, value: &str) {
        let value = if value.is_empty() { "<empty>" } else { value };
        let send = match lock(&self.options).get_mut(name) {
            Some(option) => option.set_from_string(value),
            None => true,
        };
        if send {
            self.write_line(&format!("setoption name {name} value {value}"));
        }
    }

    /// Push the host-managed option values and remember them for
    /// [`options_ok`](Self::options_ok).
    pub fn init_options(&self, host: &HostOptions) {
        info!(
            "initializing engine options (hash={}MB)",
            host.hash_mb
        );
        self.set_option("Hash", &host.hash_mb.to_string());
        self.set_option("SyzygyPath", &host.syzygy_path);
        self.set_option("GaviotaTbPath", &host.gaviota_tb_path);
        *lock(&self.init) = Some(InitSnapshot {
            hash_mb: host.hash_mb,
            syzygy_path: host.syzygy_path.clone(),
            gaviota_tb_path: host.gaviota_tb_path.clone(),
        });
    }

    /// Whether the running engine still matches the host configuration.
    pub fn options_ok(&self, host: &HostOptions) -> bool {
        if self.state.error.load(Ordering::Relaxed) {
            return false;
        }
        let init = lock(&self.init);
        let Some(init) = init.as_ref() else {
            return true;
        };
        if self.network_id != host.network_id || init.hash_mb != host.hash_mb {
            return false;
        }
        let options = lock(&self.options);
        if options.contains("GaviotaTbPath") && init.gaviota_tb_path != host.gaviota_tb_path {
            return false;
        }
        if options.contains("SyzygyPath") && init.syzygy_path != host.syzygy_path {
            return false;
        }
        true
    }

    /// Snapshot of the options the engine has declared so far.
    pub fn options(&self) -> OptionsRegistry {
        lock(&self.options).clone()
    }

    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::Relaxed)
    }

    pub fn is_error(&self) -> bool {
        self.state.error.load(Ordering::Relaxed)
    }

    pub fn uci_ok(&self) -> bool {
        self.state.uci_ok.load(Ordering::Relaxed)
    }

    /// Most recent `position ...` command forwarded to the engine.
    pub fn last_position_line(&self) -> Option<String> {
        self.state.last_position()
    }

    /// Most recent `go ...` command forwarded to the engine.
    pub fn last_go_line(&self) -> Option<String> {
        self.state.last_go()
    }

    /// End the session: stop all three threads, close the socket with a
    /// best-effort `quit`, and close both pipes. I/O errors caused by the
    /// teardown itself are swallowed.
    pub fn shutdown(&self) {
        info!("shutting down network engine");
        self.state.shutdown.store(true, Ordering::Relaxed);
        self.state.running.store(false, Ordering::Relaxed);
        self.gui_to_engine.close();
        self.engine_to_gui.close();
        session::close_socket(&self.state);
        let handles = std::mem::take(&mut *lock(&self.threads));
        for handle in handles {
            let _ = handle.join();
        }
    }

    /// Watch for protocol milestones in engine output.
    fn observe(&self, line: &str) {
        let trimmed = line.trim();
        if trimmed == "uciok" {
            self.state.uci_ok.store(true, Ordering::Relaxed);
        } else if trimmed.starts_with("option ") {
            if let Some(mut option) = options::parse_declaration(trimmed) {
                option.visible = options::is_editable(&option.name);
                lock(&self.options).insert(option);
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
