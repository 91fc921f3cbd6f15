//! `SigChat` — interactive terminal chat over a signaling backend.
//!
//! Runs the session controller against an in-process signaling hub (demo
//! mode): log in with any account name, then use the menu to open peer or
//! channel conversations. Configuration via CLI flags, environment
//! variables, or config file (`~/.config/sigchat/config.toml`).
//!
//! ```bash
//! cargo run --bin sigchat
//!
//! # Shorter operation timeout, verbose logs
//! cargo run --bin sigchat -- --timeout-ms 3000 --log-level debug
//! ```

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;

use sigchat::config::{CliArgs, ClientConfig};
use sigchat::console::StdinConsole;
use sigchat::session::SessionController;
use sigchat_signal::hub::LocalSignalHub;

#[tokio::main]
async fn main() {
    let cli = CliArgs::parse();

    // Load and resolve configuration (CLI args > config file > defaults).
    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    // Logs go to a file, never stdout: stdout carries the chat transcript.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    tracing::info!("sigchat starting");

    let hub = LocalSignalHub::new();
    let (backend, events) = hub.attach(config.event_buffer);
    let console = Arc::new(StdinConsole::new());

    let controller = SessionController::new(backend, console, config.to_session_config());
    let pump = controller.spawn_event_pump(events);

    controller.run().await;

    pump.abort();
    tracing::info!("sigchat exiting");
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown so buffered
/// log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("sigchat.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}
