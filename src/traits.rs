// ABOUTME: DmChannel trait abstracting the chat platform behind the bridge.
// ABOUTME: Sending text, typing indicators, and interactive approval prompts.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// One tool invocation awaiting the user's verdict
#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    /// Stable id of the invocation, for correlating UI state
    pub invocation_id: String,
    pub tool_name: String,
    /// Rendered summary of the tool input, already truncated for display
    pub summary: String,
    /// How long the platform should keep the prompt interactive
    pub timeout: Duration,
}

/// What the user did with an approval prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalChoice {
    Allow,
    Deny,
    /// The platform's own interaction window expired first
    TimedOut,
}

/// A direct-message channel to exactly one user.
///
/// This is the only surface the bridge needs from a chat platform.
/// Implementations wrap a platform SDK; tests use an in-memory channel.
#[async_trait]
pub trait DmChannel: Send + Sync {
    /// Stable identifier of the channel, used in logs
    fn id(&self) -> &str;

    /// Deliver one message. Callers have already chunked to the
    /// platform's length limit.
    async fn send(&self, text: &str) -> Result<()>;

    /// Show a typing indicator. Optional; failures are the caller's to ignore.
    async fn send_typing(&self) -> Result<()> {
        Ok(())
    }

    /// Present an approval prompt and block until the user answers or the
    /// platform gives up on the interaction.
    async fn request_approval(&self, request: &ApprovalRequest) -> Result<ApprovalChoice>;
}
