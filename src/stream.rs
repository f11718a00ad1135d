// ABOUTME: Stream reader pipeline draining agent events into chat messages.
// ABOUTME: One task per session; distinguishes deliberate teardown from session death.

use crate::chunker::{split_message, MAX_MESSAGE_LEN};
use crate::registry::{Mode, SessionRecord, SessionRegistry};
use crate::traits::DmChannel;
use crate::workspace::notify_workspace_info;
use porter_agent::{AgentEvent, EventReceiver};
use std::path::PathBuf;
use std::sync::Arc;

const SESSION_DIED_NOTICE: &str = "Session ended unexpectedly. Use /reset to start a new one.";
const AUTO_EDIT_HINT: &str =
    "_Running in Auto-Edit mode. Use /mode to require approval for tool use._";

/// Spawn the reader task that drains `events` for the session in `record`.
///
/// The task runs until the stream ends or the record's cancellation token
/// fires. Cancellation means deliberate teardown and exits silently; a
/// stream that ends on its own means the session died, which notifies the
/// user and evicts the record.
pub fn spawn_stream_reader(
    record: Arc<SessionRecord>,
    registry: Arc<SessionRegistry>,
    mut events: EventReceiver,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = record.cancel.cancelled() => {
                    tracing::debug!(user_id = %record.user_id, "Stream reader cancelled");
                    return;
                }
                event = events.recv() => event,
            };

            let Some(event) = event else {
                if record.cancel.is_cancelled() {
                    return;
                }
                tracing::warn!(user_id = %record.user_id, "Session stream ended unexpectedly");
                // Only speak up if no replacement has taken the slot
                if registry.remove_if_current(&record) {
                    send_chunked(record.channel.as_ref(), SESSION_DIED_NOTICE).await;
                }
                return;
            };

            handle_event(&record, event).await;
        }
    })
}

async fn handle_event(record: &Arc<SessionRecord>, event: AgentEvent) {
    match event {
        AgentEvent::Assistant { text } => {
            if !text.trim().is_empty() {
                send_chunked(record.channel.as_ref(), &text).await;
            }
        }
        AgentEvent::ToolResult { content, is_error } => {
            // Successful tool results stay internal to the conversation
            if !is_error {
                return;
            }
            let mut notice = format!("⚠️ Tool execution failed\n{}", content.trim());
            if record.mode == Mode::AutoEdit {
                notice.push('\n');
                notice.push_str(AUTO_EDIT_HINT);
            }
            send_chunked(record.channel.as_ref(), &notice).await;
        }
        AgentEvent::Result { text, is_error } => {
            if is_error {
                let detail = if text.trim().is_empty() {
                    "The agent reported a failure."
                } else {
                    text.trim()
                };
                send_chunked(record.channel.as_ref(), &format!("**Error:** {}", detail)).await;
            } else if !text.trim().is_empty() {
                send_chunked(
                    record.channel.as_ref(),
                    &format!("```\n{}\n```", text.trim()),
                )
                .await;
            }
        }
        AgentEvent::SystemInit { cwd } => {
            // Banner only once per session, and never blocking the drain.
            // Tied to the cancellation token so teardown also silences a
            // banner still being gathered.
            if let Some(cwd) = cwd {
                if record.mark_workspace_info_shown() {
                    let record = Arc::clone(record);
                    let cwd = PathBuf::from(cwd);
                    tokio::spawn(async move {
                        tokio::select! {
                            _ = record.cancel.cancelled() => {}
                            _ = notify_workspace_info(record.channel.as_ref(), &cwd) => {}
                        }
                    });
                }
            }
        }
        AgentEvent::Other { kind } => {
            tracing::debug!(user_id = %record.user_id, kind = %kind, "Ignoring agent event");
        }
    }
}

/// Chunk and deliver one logical message in order. Delivery failures are
/// logged and skipped so one bad chunk cannot stall the drain.
async fn send_chunked(channel: &dyn DmChannel, text: &str) {
    for chunk in split_message(text, MAX_MESSAGE_LEN) {
        if let Err(e) = channel.send(&chunk).await {
            tracing::warn!(channel = %channel.id(), error = %e, "Failed to deliver chunk");
        }
    }
}
