//! uci-link: run a remote UCI engine as if it were on stdin/stdout.
//!
//! Loads a NETE endpoint file, connects with the full strategy cascade,
//! and bridges the terminal (or a chess GUI treating this binary as the
//! engine) to the remote session.

mod logging;

use clap::Parser;
use config::Endpoint;
use engine::{HostOptions, NetworkEngine, Report};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "uci-link")]
#[command(
    author,
    version,
    about = "Bridge stdin/stdout to a remote UCI chess engine"
)]
struct Cli {
    /// NETE endpoint file describing the remote engine
    #[arg(value_name = "NETE_FILE")]
    config: PathBuf,

    /// Hash table size in MB to request from the engine
    #[arg(long, default_value_t = 16)]
    hash: i64,

    /// Syzygy tablebase path to pass to the engine
    #[arg(long, default_value = "")]
    syzygy_path: String,

    /// Log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Forwards session failures to the terminal.
struct StderrReport;

impl Report for StderrReport {
    fn report_error(&self, message: &str) {
        error!("engine error: {message}");
        eprintln!("uci-link: {message}");
    }
}

fn main() {
    let cli = Cli::parse();
    let _guard = logging::init(&cli.log_level);

    if let Err(e) = run(cli) {
        error!("{e}");
        eprintln!("uci-link: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let endpoint = Endpoint::from_file(&cli.config)?;
    let network_id = format!("{}:{}", endpoint.host, endpoint.port);
    info!(
        "uci-link v{} connecting to {network_id}",
        env!("CARGO_PKG_VERSION")
    );

    let engine = Arc::new(NetworkEngine::new(
        endpoint,
        network_id,
        Arc::new(StderrReport),
    ));
    engine.start();

    // stdin → engine. `quit` (or stdin EOF) tears the session down locally
    // as well; the thread is left detached because a blocking stdin read
    // cannot be interrupted portably.
    let stdin_engine = engine.clone();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let quitting = line.trim() == "quit";
            stdin_engine.write_line(&line);
            if quitting {
                break;
            }
        }
        stdin_engine.shutdown();
    });

    // engine → stdout, applying host options once the engine speaks UCI.
    let mut options_sent = false;
    loop {
        match engine.read_line(250) {
            None => break,
            Some(line) if line.is_empty() => continue,
            Some(line) => {
                println!("{line}");
                if !options_sent && line.trim() == "uciok" {
                    engine.init_options(&HostOptions {
                        network_id: String::new(),
                        hash_mb: cli.hash,
                        syzygy_path: cli.syzygy_path.clone(),
                        gaviota_tb_path: String::new(),
                    });
                    options_sent = true;
                }
            }
        }
    }

    engine.shutdown();
    info!("session closed");
    Ok(())
}
