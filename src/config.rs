//! Configuration loading.
//!
//! Loads relay configuration from `./relay.toml` (or `$RELAY_CONFIG_PATH`).
//! Environment variables override file values; file values override defaults.
//!
//! Precedence: env vars > config file > defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::backend::BackendKind;
use crate::delivery::controller::FallbackPolicy;
use crate::delivery::validator::split_list;

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "relay.toml";

// ── Top-level config ────────────────────────────────────────────

/// Top-level relay configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// HTTP listener settings.
    pub server: ServerConfig,
    /// Delivery defaults.
    pub delivery: DeliveryConfig,
    /// Messaging backend selection.
    pub backend: BackendConfig,
    /// Log output.
    pub logging: LoggingConfig,
}

impl RelayConfig {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// If the file does not exist, defaults are used.
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load using a custom env resolver (for testing).
    pub fn load_with(env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let path = Self::config_path_with(&env);
        let mut config = Self::load_from_file(&path)?;
        config.apply_overrides(env);
        Ok(config)
    }

    /// Load from a TOML file only, no env overrides. A missing file yields defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                toml::from_str(&contents)
                    .with_context(|| format!("failed to parse config at {}", path.display()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no config file found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "failed to read config at {}: {e}",
                path.display()
            )),
        }
    }

    /// Resolve config path: `$RELAY_CONFIG_PATH`, else `./relay.toml`.
    pub fn config_path_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
        env("RELAY_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function for testability (avoids `set_var` in tests).
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        // Server.
        if let Some(v) = env("HOST") {
            self.server.host = v;
        }
        override_parsed(&env, "PORT", &mut self.server.port);
        override_parsed(
            &env,
            "RELAY_SHUTDOWN_TIMEOUT_SECS",
            &mut self.server.shutdown_timeout_secs,
        );

        // Delivery.
        if let Some(v) = env("PHONE_NUMBERS") {
            self.delivery.default_phone_numbers = split_list(&v);
        }
        override_parsed(
            &env,
            "RELAY_FALLBACK_POLICY",
            &mut self.delivery.fallback_policy,
        );

        // Backend.
        override_parsed(&env, "RELAY_BACKEND", &mut self.backend.kind);
        if let Some(v) = env("RELAY_OSASCRIPT_PATH") {
            self.backend.osascript_path = v;
        }
        override_parsed(
            &env,
            "RELAY_BACKEND_TIMEOUT_SECS",
            &mut self.backend.timeout_secs,
        );

        // Logging.
        if let Some(v) = env("RELAY_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = env("RELAY_LOGS_DIR") {
            self.logging.logs_dir = Some(PathBuf::from(v));
        }
    }
}

/// Replace `slot` with the parsed value of `key`, warning on parse failure.
fn override_parsed<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
) {
    let Some(v) = env(key) else {
        return;
    };
    match v.parse() {
        Ok(parsed) => *slot = parsed,
        Err(_) => tracing::warn!(var = key, value = %v, "ignoring invalid env override"),
    }
}

// ── Sections ────────────────────────────────────────────────────

/// HTTP listener settings (`[server]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Seconds to wait for in-flight requests after a shutdown signal.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 3000,
            shutdown_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    /// `host:port` for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Delivery defaults (`[delivery]`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Recipients used when a request supplies none.
    pub default_phone_numbers: Vec<String>,
    /// Which group failures trigger the individual fallback.
    pub fallback_policy: FallbackPolicy,
}

/// Messaging backend settings (`[backend]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Backend implementation.
    pub kind: BackendKind,
    /// Program used by the AppleScript backend.
    pub osascript_path: String,
    /// Per-invocation deadline for the AppleScript backend.
    pub timeout_secs: u64,
    /// Conversation names known to the dry-run backend.
    pub dry_run_conversations: Vec<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            osascript_path: "osascript".to_owned(),
            timeout_secs: 30,
            dry_run_conversations: Vec::new(),
        }
    }
}

/// Log output settings (`[logging]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Directory for JSON log files; console-only when unset.
    pub logs_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            logs_dir: None,
        }
    }
}
