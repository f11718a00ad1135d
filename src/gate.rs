// ABOUTME: Tool permission gates bridging agent tool requests to the user.
// ABOUTME: Interactive approval over the DM channel with a hard timeout, plus auto-approve.

use crate::registry::SessionRegistry;
use crate::traits::{ApprovalChoice, ApprovalRequest};
use async_trait::async_trait;
use porter_agent::{ToolDecision, ToolGate};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// How long the user gets to answer an approval prompt
pub const GATE_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-field display limit in the rendered tool summary
const FIELD_PREVIEW_LEN: usize = 200;

/// Gate that asks the session's user over their DM channel.
///
/// The channel is looked up through the registry at check time rather
/// than captured, so a request racing a session teardown fails closed
/// instead of prompting on a dead session's channel.
pub struct InteractiveGate {
    user_id: String,
    registry: Arc<SessionRegistry>,
    timeout: Duration,
}

impl InteractiveGate {
    pub fn new(user_id: impl Into<String>, registry: Arc<SessionRegistry>) -> Self {
        Self {
            user_id: user_id.into(),
            registry,
            timeout: GATE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ToolGate for InteractiveGate {
    async fn check(&self, tool_name: &str, input: &Value, invocation_id: &str) -> ToolDecision {
        let Some(record) = self.registry.get(&self.user_id) else {
            return ToolDecision::Deny {
                reason: "No active session".to_string(),
            };
        };

        let request = ApprovalRequest {
            invocation_id: invocation_id.to_string(),
            tool_name: tool_name.to_string(),
            summary: render_tool_summary(input),
            timeout: self.timeout,
        };

        tracing::info!(
            user_id = %self.user_id,
            tool_name = %tool_name,
            invocation_id = %invocation_id,
            "Requesting tool approval"
        );

        let choice =
            match tokio::time::timeout(self.timeout, record.channel.request_approval(&request))
                .await
            {
                Ok(Ok(choice)) => choice,
                Ok(Err(e)) => {
                    tracing::warn!(
                        user_id = %self.user_id,
                        error = %e,
                        "Failed to deliver approval prompt"
                    );
                    return ToolDecision::Deny {
                        reason: "Permission request could not be delivered.".to_string(),
                    };
                }
                Err(_) => ApprovalChoice::TimedOut,
            };

        match choice {
            ApprovalChoice::Allow => ToolDecision::Allow,
            ApprovalChoice::Deny => ToolDecision::Deny {
                reason: "User denied the tool.".to_string(),
            },
            ApprovalChoice::TimedOut => ToolDecision::Deny {
                reason: "Permission request timed out.".to_string(),
            },
        }
    }
}

/// Gate that allows everything, for auto-edit sessions
pub struct AutoApproveGate;

#[async_trait]
impl ToolGate for AutoApproveGate {
    async fn check(&self, tool_name: &str, _input: &Value, invocation_id: &str) -> ToolDecision {
        tracing::debug!(
            tool_name = %tool_name,
            invocation_id = %invocation_id,
            "Auto-approving tool"
        );
        ToolDecision::Allow
    }
}

/// Render a tool's input object as one bolded line per field, with long
/// values truncated for the prompt
pub fn render_tool_summary(input: &Value) -> String {
    let Some(fields) = input.as_object() else {
        return truncate(&input.to_string());
    };
    if fields.is_empty() {
        return "(no input)".to_string();
    }
    fields
        .iter()
        .map(|(key, value)| {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            format!("**{}:** {}", key, truncate(&rendered))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate(value: &str) -> String {
    if value.chars().count() <= FIELD_PREVIEW_LEN {
        return value.to_string();
    }
    let cut: String = value.chars().take(FIELD_PREVIEW_LEN).collect();
    format!("{}...", cut)
}
