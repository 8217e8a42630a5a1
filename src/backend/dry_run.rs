//! Log-only backend for hosts without Messages.app.

use async_trait::async_trait;
use tracing::info;

use super::{ConversationError, MessagingBackend, SendError};

/// Backend that records nothing and delivers nothing; every send is logged.
///
/// With an empty `conversations` list every hint matches. Otherwise a hint
/// matches when some listed name contains it (case-sensitive).
#[derive(Debug, Clone, Default)]
pub struct DryRunBackend {
    conversations: Vec<String>,
}

impl DryRunBackend {
    /// Create a dry-run backend that knows the given conversation names.
    pub fn new(conversations: Vec<String>) -> Self {
        Self { conversations }
    }

    fn find_conversation<'a>(&'a self, hint: &'a str) -> Option<&'a str> {
        if self.conversations.is_empty() {
            return Some(hint);
        }
        self.conversations
            .iter()
            .find(|name| name.contains(hint))
            .map(String::as_str)
    }
}

#[async_trait]
impl MessagingBackend for DryRunBackend {
    async fn send_to_addressee(&self, addressee: &str, message: &str) -> Result<(), SendError> {
        info!(addressee, chars = message.chars().count(), "dry run: would send message");
        Ok(())
    }

    async fn send_to_conversation(
        &self,
        hint: &str,
        message: &str,
    ) -> Result<(), ConversationError> {
        let Some(name) = self.find_conversation(hint) else {
            return Err(ConversationError::NotFound(hint.to_owned()));
        };
        info!(
            hint,
            conversation = name,
            chars = message.chars().count(),
            "dry run: would send to group chat"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "dry_run"
    }
}
