//! tokenwarden demo - signs in against a scripted identity provider and lets
//! the background monitor keep the credential fresh.
//!
//! Tokens are issued with a short lifetime and the freshness windows are
//! shrunk to match, so a full renewal cycle plays out in about a minute.
//!
//! Environment:
//! - `TOKENWARDEN_API_KEY`, `TOKENWARDEN_CLIENT_ID`: passed to the provider
//! - `TOKENWARDEN_LOG_DIR`: also write logs to `tokenwarden.log` in this directory
//! - `RUST_LOG`: log filter (default `info`)
//!
//! Pass `--memory` to keep the credential in memory, or `--keychain` to keep
//! it in the OS keychain, instead of on disk.

use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use tokenwarden_core::provider::ScriptedProvider;
use tokenwarden_core::utils::{format_instant, format_remaining, mask_token};
use tokenwarden_core::{
    AuthOptions, Config, Credential, FileStore, KeyringStore, MemoryStore, Session, Thresholds,
};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Lifetime of tokens handed out by the scripted provider
const TOKEN_LIFETIME_SECS: u64 = 60;

/// How long the demo lets the monitor run before signing out
const RUN_FOR: Duration = Duration::from_secs(75);

/// How often the demo prints the credential status
const STATUS_EVERY: Duration = Duration::from_secs(15);

const LOG_FILE: &str = "tokenwarden.log";

fn demo_thresholds() -> Thresholds {
    Thresholds {
        fresh_window: Duration::from_secs(10),
        renew_window: Duration::from_secs(20),
        poll_interval: Duration::from_secs(5),
    }
}

/// Initialize the tracing subscriber. The returned guard flushes the log
/// file on drop and must live as long as the process logs.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match std::env::var_os("TOKENWARDEN_LOG_DIR") {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

fn on_token_refreshed(credential: &Credential) {
    info!(
        token = %mask_token(&credential.access_token),
        expires_in = credential.lifetime_secs,
        scope = %credential.scope,
        renewed_at = %format_instant(credential.issued_at),
        "Token renewed automatically"
    );
}

fn show_status(session: &Session) {
    let status = session.status();
    info!(
        valid = status.valid,
        needs_refresh = status.needs_refresh,
        time_until_expiry = %format_remaining(status.time_until_expiry),
        "Token status: {}",
        status
    );
}

async fn run(session: Session) -> Result<()> {
    let api_key = std::env::var("TOKENWARDEN_API_KEY").unwrap_or_else(|_| "demo-api-key".into());
    let client_id =
        std::env::var("TOKENWARDEN_CLIENT_ID").unwrap_or_else(|_| "demo-client-id".into());

    let options = AuthOptions::new()
        .auto_refresh(true)
        .on_token_refresh(on_token_refreshed);
    if !session.authenticate(&api_key, &client_id, options).await {
        warn!("Authentication failed");
        return Ok(());
    }
    info!("Authentication succeeded");
    show_status(&session);

    let mut ticker = tokio::time::interval(STATUS_EVERY);
    ticker.tick().await;
    let deadline = tokio::time::Instant::now() + RUN_FOR;
    while tokio::time::Instant::now() < deadline {
        tokio::select! {
            _ = ticker.tick() => show_status(&session),
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    info!("Forcing a manual refresh");
    match session.force_refresh().await {
        Ok(true) => {
            info!("Token renewed manually");
            show_status(&session);
        }
        Ok(false) => warn!("Manual refresh failed"),
        Err(e) => return Err(e).context("Manual refresh hit a provider fault"),
    }

    if session.logout() {
        info!("Signed out");
    } else {
        warn!("Sign-out could not clear the stored credential");
    }
    show_status(&session);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();
    info!("tokenwarden demo starting");

    let config = Config::load().context("Failed to load configuration")?;
    let session_config = config.session.clone().with_thresholds(demo_thresholds());
    let provider = ScriptedProvider::new().with_lifetime(TOKEN_LIFETIME_SECS);

    let backend = std::env::args().nth(1).unwrap_or_default();
    let session = if backend == "--memory" {
        Session::new(provider, MemoryStore::new(), session_config)
    } else if backend == "--keychain" {
        info!("Persisting credential in the OS keychain");
        Session::new(provider, KeyringStore::new(), session_config)
    } else {
        let dir = config.storage_dir()?;
        info!(dir = %dir.display(), "Persisting credential on disk");
        Session::new(provider, FileStore::new(dir), session_config)
    };

    run(session).await
}
