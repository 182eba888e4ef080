//! File-based logging for the uci-link binary.
//!
//! Logs go to `~/.local/state/uci-link/debug.log` through a daily rolling
//! appender, so a failed session leaves a trail that can be attached to a
//! bug report. Stderr output is enabled when `RUST_LOG` is set (useful for
//! development). Stdout is never used for logs — it carries engine output.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// The directory under the state dir where logs are stored.
const LOG_DIR_NAME: &str = "uci-link";

/// The base filename for the rolling log file.
const LOG_FILE_NAME: &str = "debug.log";

/// Initialise the tracing subscriber with file + optional stderr layers.
///
/// Returns a [`WorkerGuard`] that must be held for the lifetime of the
/// program — dropping it flushes and closes the log file writer.
pub fn init(default_level: &str) -> WorkerGuard {
    let log_dir = log_directory();

    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!(
            "warning: could not create log directory {}: {e}",
            log_dir.display()
        );
    }

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false);

    // Stderr layer: only active when RUST_LOG is set (developer mode).
    let stderr_layer = if std::env::var("RUST_LOG").is_ok() {
        Some(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true)
                .with_target(true),
        )
    } else {
        None
    };

    // Respect RUST_LOG when set; silence chatty dependencies so that
    // RUST_LOG=debug shows session logs without TLS record noise.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level))
        .add_directive("rustls=warn".parse().expect("static directive"))
        .add_directive("mdns_sd=warn".parse().expect("static directive"));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();

    guard
}

/// Resolve the log directory path.
///
/// Uses the XDG state directory on Linux and the platform equivalent
/// elsewhere, falling back to `~/.local/state/uci-link/` and finally the
/// current directory.
fn log_directory() -> std::path::PathBuf {
    if let Some(state) = dirs::state_dir() {
        return state.join(LOG_DIR_NAME);
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".local").join("state").join(LOG_DIR_NAME);
    }
    std::path::PathBuf::from(".")
}
