//! Messaging backends: the transport the delivery controller sends through.
//!
//! The controller only depends on [`MessagingBackend`]. Two implementations
//! ship with the crate:
//! - [`applescript::AppleScriptBackend`] drives Messages.app via `osascript`
//! - [`dry_run::DryRunBackend`] logs sends without delivering anything

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod applescript;
pub mod dry_run;

/// Failure sending to a single addressee.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The transport process could not be started.
    #[error("failed to launch transport: {0}")]
    Spawn(String),

    /// The transport ran but reported an error.
    #[error("transport error: {0}")]
    Transport(String),

    /// The transport did not finish within its deadline.
    #[error("timed out after {0}s")]
    Timeout(u64),
}

/// Failure sending to a group conversation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversationError {
    /// No known conversation name contains the hint.
    #[error("no existing chat found matching: {0}")]
    NotFound(String),

    /// Any other transport failure.
    #[error(transparent)]
    Transport(#[from] SendError),
}

impl ConversationError {
    /// Whether this is the "no matching conversation" condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Outbound transport consumed by the delivery controller.
///
/// Implementations must tolerate concurrent calls; the controller fans out
/// one `send_to_addressee` per recipient without coordination.
#[async_trait]
pub trait MessagingBackend: Send + Sync {
    /// Send `message` to a single addressee.
    async fn send_to_addressee(&self, addressee: &str, message: &str) -> Result<(), SendError>;

    /// Send `message` once to the first conversation whose name contains `hint`.
    async fn send_to_conversation(&self, hint: &str, message: &str)
        -> Result<(), ConversationError>;

    /// Short backend name for logs.
    fn name(&self) -> &str;
}

/// Which backend implementation to construct.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Messages.app via `osascript` (macOS only).
    #[default]
    Applescript,
    /// Log-only backend.
    DryRun,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "applescript" | "osascript" => Ok(Self::Applescript),
            "dry_run" | "dry-run" | "dryrun" => Ok(Self::DryRun),
            other => Err(format!("unknown backend kind: {other}")),
        }
    }
}

/// Construct the backend selected by `config`.
pub fn build_backend(config: &crate::config::BackendConfig) -> Arc<dyn MessagingBackend> {
    match config.kind {
        BackendKind::Applescript => Arc::new(applescript::AppleScriptBackend::new(
            config.osascript_path.clone(),
            std::time::Duration::from_secs(config.timeout_secs),
        )),
        BackendKind::DryRun => Arc::new(dry_run::DryRunBackend::new(
            config.dry_run_conversations.clone(),
        )),
    }
}
