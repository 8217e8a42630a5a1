//! Messages.app backend driven through `osascript`.
//!
//! Scripts are fixed `on run argv` handlers. Addressee, hint and message text
//! travel as process arguments, so user input never becomes script source.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{ConversationError, MessagingBackend, SendError};

/// Marker raised by [`SEND_TO_CONVERSATION`] when no chat name matches.
pub const CHAT_NOT_FOUND_MARKER: &str = "relay:chat-not-found";

/// `argv`: addressee, message.
const SEND_TO_ADDRESSEE: &str = r#"on run argv
set theRecipient to item 1 of argv
set theMessage to item 2 of argv
tell application "Messages"
set theService to 1st service whose service type = iMessage
send theMessage to buddy theRecipient of theService
end tell
return "sent to " & theRecipient
end run"#;

/// `argv`: hint, message. Matching is a case-sensitive substring test.
const SEND_TO_CONVERSATION: &str = r#"on run argv
set theHint to item 1 of argv
set theMessage to item 2 of argv
tell application "Messages"
set targetChat to missing value
repeat with c in chats
try
set chatName to name of c
on error
set chatName to ""
end try
if chatName is missing value then set chatName to ""
considering case
if chatName contains theHint then
set targetChat to c
exit repeat
end if
end considering
end repeat
if targetChat is missing value then
error "relay:chat-not-found" number 1404
end if
send theMessage to targetChat
end tell
return "sent to chat " & theHint
end run"#;

/// Backend that shells out to `osascript` once per send.
#[derive(Debug, Clone)]
pub struct AppleScriptBackend {
    program: String,
    timeout: Duration,
}

impl AppleScriptBackend {
    /// Create a backend invoking `program` (normally `osascript`) with a per-call deadline.
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Run `script` with `args`, returning trimmed stdout on success.
    async fn run_script(&self, script: &str, args: &[&str]) -> Result<String, SendError> {
        let mut cmd = tokio::process::Command::new(&self.program);
        for line in script.lines() {
            cmd.arg("-e").arg(line);
        }
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| SendError::Spawn(format!("{}: {e}", self.program)))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| SendError::Timeout(self.timeout.as_secs()))?
            .map_err(|e| SendError::Transport(e.to_string()))?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
        if !output.status.success() {
            let reason = if stderr.is_empty() {
                format!("{} exited with {}", self.program, output.status)
            } else {
                stderr
            };
            return Err(SendError::Transport(reason));
        }
        if !stderr.is_empty() {
            return Err(SendError::Transport(stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
    }
}

/// Map a failed conversation send to the not-found or transport class.
pub fn classify_conversation_failure(hint: &str, err: SendError) -> ConversationError {
    match &err {
        SendError::Transport(reason) if reason.contains(CHAT_NOT_FOUND_MARKER) => {
            ConversationError::NotFound(hint.to_owned())
        }
        _ => ConversationError::Transport(err),
    }
}

#[async_trait]
impl MessagingBackend for AppleScriptBackend {
    async fn send_to_addressee(&self, addressee: &str, message: &str) -> Result<(), SendError> {
        match self.run_script(SEND_TO_ADDRESSEE, &[addressee, message]).await {
            Ok(stdout) => {
                debug!(addressee, stdout = %stdout, "message sent via Messages.app");
                Ok(())
            }
            Err(e) => {
                warn!(addressee, error = %e, "Messages.app send failed");
                Err(e)
            }
        }
    }

    async fn send_to_conversation(
        &self,
        hint: &str,
        message: &str,
    ) -> Result<(), ConversationError> {
        match self.run_script(SEND_TO_CONVERSATION, &[hint, message]).await {
            Ok(stdout) => {
                debug!(hint, stdout = %stdout, "message sent to group chat");
                Ok(())
            }
            Err(e) => {
                let err = classify_conversation_failure(hint, e);
                warn!(hint, error = %err, "group chat send failed");
                Err(err)
            }
        }
    }

    fn name(&self) -> &str {
        "applescript"
    }
}
