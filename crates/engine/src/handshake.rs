//! On-socket session bootstrap: authentication and engine selection.
//!
//! Both sub-protocols run on the raw stream before any UCI traffic. The
//! server speaks first only when it requires auth; a server that does not
//! simply starts with engine output, and that first line is re-injected
//! into the engine→GUI pipe so nothing is lost.

use crate::error::{EngineError, Result};
use crate::session::{push_engine_line, SessionCtx};
use config::AuthMethod;
use tracing::{debug, info, warn};
use transport::{LineReader, SharedStream};

/// Run auth, then engine selection. On success the caller may open the
/// handshake gate.
pub(crate) fn run(
    reader: &mut LineReader,
    stream: &SharedStream,
    ctx: &SessionCtx,
) -> Result<()> {
    authenticate(reader, stream, ctx)?;
    select_engine(reader, stream, ctx)?;
    Ok(())
}

/// Token/PSK authentication.
///
/// Protocol: the server greets with `AUTH_REQUIRED [methods]`; the client
/// answers `AUTH <token>` or `PSK_AUTH <key>`; the server closes with
/// `AUTH_OK` or a failure line. The advertised method list is ignored; the
/// configured method decides.
fn authenticate(
    reader: &mut LineReader,
    stream: &SharedStream,
    ctx: &SessionCtx,
) -> Result<()> {
    let endpoint = &ctx.endpoint;
    let has_token = !endpoint.auth_token.is_empty();
    let has_psk = !endpoint.psk_key.is_empty();

    if endpoint.auth_method == AuthMethod::None || (!has_token && !has_psk) {
        debug!(
            "auth: skipping (method={:?} has_token={has_token} has_psk={has_psk})",
            endpoint.auth_method
        );
        return Ok(());
    }

    let Some(greeting) = reader.read_line(&ctx.state.shutdown)? else {
        return Err(EngineError::AuthFailed);
    };

    if !greeting.trim().starts_with("AUTH_REQUIRED") {
        // No auth wanted for this session; the line is the first engine
        // output.
        debug!("auth: server did not require auth, re-injecting first line");
        push_engine_line(ctx, greeting);
        return Ok(());
    }

    let command = if endpoint.auth_method == AuthMethod::Psk && has_psk {
        format!("PSK_AUTH {}", endpoint.psk_key)
    } else if has_token {
        format!("AUTH {}", endpoint.auth_token)
    } else {
        warn!("server requires auth but no usable credentials are configured");
        return Err(EngineError::AuthFailed);
    };
    stream.write_line(&command)?;

    let Some(response) = reader.read_line(&ctx.state.shutdown)? else {
        return Err(EngineError::AuthFailed);
    };
    if response.trim() == "AUTH_OK" {
        info!("authentication succeeded ({:?})", endpoint.auth_method);
        Ok(())
    } else {
        warn!("authentication failed: {}", response.trim());
        Err(EngineError::AuthFailed)
    }
}

/// Engine selection on a single-port multiplexed server.
///
/// Skipped when no engine is selected (legacy per-port mode). A server
/// that answers `ENGINE_LIST` with nothing predates multiplexing, which
/// also means the requested engine cannot be honored.
fn select_engine(
    reader: &mut LineReader,
    stream: &SharedStream,
    ctx: &SessionCtx,
) -> Result<()> {
    let wanted = &ctx.endpoint.selected_engine;
    if wanted.is_empty() {
        debug!("engine selection: skipping (no engine selected)");
        return Ok(());
    }
    info!("engine selection: requesting {wanted:?}");

    stream.write_line("ENGINE_LIST")?;

    let mut available = Vec::new();
    while let Some(line) = reader.read_line(&ctx.state.shutdown)? {
        let trimmed = line.trim();
        if trimmed == "ENGINES_END" {
            break;
        }
        if let Some(name) = trimmed.strip_prefix("ENGINE ") {
            available.push(name.to_string());
        }
    }

    if available.is_empty() {
        warn!("server returned no engines; it may not support ENGINE_LIST");
        return Err(EngineError::EngineUnavailable(wanted.clone()));
    }
    if !available.iter().any(|name| name == wanted) {
        warn!("engine {wanted:?} not in server list {available:?}");
        return Err(EngineError::EngineUnavailable(wanted.clone()));
    }

    stream.write_line(&format!("SELECT_ENGINE {wanted}"))?;
    let Some(response) = reader.read_line(&ctx.state.shutdown)? else {
        return Err(EngineError::EngineUnavailable(wanted.clone()));
    };
    if response.trim() == "ENGINE_SELECTED" {
        info!("engine selected: {wanted}");
        Ok(())
    } else {
        warn!("engine selection failed: {}", response.trim());
        Err(EngineError::EngineUnavailable(wanted.clone()))
    }
}
