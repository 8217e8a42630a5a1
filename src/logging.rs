//! Log output for the relay.
//!
//! Delivery events are emitted as structured `tracing` fields (`addressee`,
//! `hint`, `succeeded`, `failed`, `error`) so a JSON log line per webhook can
//! be correlated with the HTTP response the caller saw.
//!
//! `serve` with `logging.logs_dir` set uses [`init_production`]: daily JSON
//! files for later inspection plus human-readable stderr. `serve` without a
//! logs dir and the one-shot `send` / `validate` subcommands use [`init_cli`].
//! `RUST_LOG` always wins over `logging.level` (`RELAY_LOG_LEVEL`).

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Keeps the JSON file writer alive while the webhook server runs.
///
/// Dropping it flushes buffered delivery logs, so `serve` holds it until the
/// server has drained.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

/// `RUST_LOG` when set, otherwise `default_level`.
fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install file and console logging for a long-running relay.
///
/// JSON lines go to `{logs_dir}/imessage-relay.log.YYYY-MM-DD`, one file per
/// day. The directory is created when missing.
///
/// # Errors
///
/// Returns an error if the logs directory cannot be created or a global
/// subscriber is already installed.
pub fn init_production(logs_dir: &Path, default_level: &str) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir).map_err(|e| {
        anyhow::anyhow!(
            "failed to create logs directory {}: {e}",
            logs_dir.display()
        )
    })?;

    let file_appender = tracing_appender::rolling::daily(logs_dir, "imessage-relay.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking);

    let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(json_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))?;

    Ok(LoggingGuard { _guard: guard })
}

/// Install stderr-only logging.
///
/// stdout stays free for the JSON outcome printed by `send`. A second call
/// is a no-op.
pub fn init_cli(default_level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_level))
        .with_writer(std::io::stderr)
        .try_init();
}
