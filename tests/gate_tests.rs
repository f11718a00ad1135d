// ABOUTME: Tests for the interactive tool permission gate.
// ABOUTME: Allow/deny flows, timeout, missing session, and delivery failure.

use anyhow::Result;
use async_trait::async_trait;
use porter::testing::MockChannel;
use porter::{
    ApprovalChoice, ApprovalRequest, AutoApproveGate, DmChannel, InteractiveGate, Mode,
    SessionRecord, SessionRegistry,
};
use porter_agent::{ToolDecision, ToolGate};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn registry_with_session(channel: Arc<dyn DmChannel>) -> Arc<SessionRegistry> {
    let (cmd_tx, _cmd_rx) = mpsc::channel(8);
    let record = Arc::new(SessionRecord::new(
        "alice",
        porter_agent::SessionHandle::new(cmd_tx, "test"),
        "test-model",
        Mode::EditAsk,
        channel,
    ));
    let registry = Arc::new(SessionRegistry::new());
    registry.insert(record);
    registry
}

#[tokio::test]
async fn test_user_approval_allows_tool() {
    let channel = Arc::new(MockChannel::new("dm"));
    channel.push_approval(ApprovalChoice::Allow);
    let registry = registry_with_session(channel.clone());
    let gate = InteractiveGate::new("alice", registry);

    let decision = gate
        .check("Bash", &json!({ "command": "cargo test" }), "tool-1")
        .await;

    assert_eq!(decision, ToolDecision::Allow);
    let requests = channel.approval_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].tool_name, "Bash");
    assert_eq!(requests[0].invocation_id, "tool-1");
    assert!(requests[0].summary.contains("**command:** cargo test"));
}

#[tokio::test]
async fn test_user_denial_denies_tool() {
    let channel = Arc::new(MockChannel::new("dm"));
    channel.push_approval(ApprovalChoice::Deny);
    let registry = registry_with_session(channel.clone());
    let gate = InteractiveGate::new("alice", registry);

    let decision = gate.check("Write", &json!({ "path": "x" }), "tool-2").await;

    assert_eq!(
        decision,
        ToolDecision::Deny {
            reason: "User denied the tool.".to_string()
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_prompt_times_out_denied() {
    let channel = Arc::new(MockChannel::new("dm"));
    channel.set_never_respond();
    let registry = registry_with_session(channel.clone());
    let gate = InteractiveGate::new("alice", registry);

    let decision = gate.check("Bash", &json!({ "command": "rm" }), "tool-3").await;

    assert_eq!(
        decision,
        ToolDecision::Deny {
            reason: "Permission request timed out.".to_string()
        }
    );
    // The prompt did go out before the clock ran down
    assert_eq!(channel.approval_requests().len(), 1);
}

#[tokio::test]
async fn test_platform_side_timeout_is_denied() {
    let channel = Arc::new(MockChannel::new("dm"));
    channel.push_approval(ApprovalChoice::TimedOut);
    let registry = registry_with_session(channel.clone());
    let gate = InteractiveGate::new("alice", registry);

    let decision = gate.check("Bash", &json!({}), "tool-4").await;

    assert_eq!(
        decision,
        ToolDecision::Deny {
            reason: "Permission request timed out.".to_string()
        }
    );
}

#[tokio::test]
async fn test_missing_session_is_denied() {
    let registry = Arc::new(SessionRegistry::new());
    let gate = InteractiveGate::new("alice", registry);

    let decision = gate.check("Bash", &json!({}), "tool-5").await;

    assert_eq!(
        decision,
        ToolDecision::Deny {
            reason: "No active session".to_string()
        }
    );
}

struct BrokenChannel;

#[async_trait]
impl DmChannel for BrokenChannel {
    fn id(&self) -> &str {
        "broken"
    }

    async fn send(&self, _text: &str) -> Result<()> {
        anyhow::bail!("network down")
    }

    async fn request_approval(&self, _request: &ApprovalRequest) -> Result<ApprovalChoice> {
        anyhow::bail!("network down")
    }
}

#[tokio::test]
async fn test_undeliverable_prompt_is_denied() {
    let registry = registry_with_session(Arc::new(BrokenChannel));
    let gate = InteractiveGate::new("alice", registry);

    let decision = gate.check("Bash", &json!({}), "tool-6").await;

    assert_eq!(
        decision,
        ToolDecision::Deny {
            reason: "Permission request could not be delivered.".to_string()
        }
    );
}

#[tokio::test]
async fn test_auto_approve_gate_allows_everything() {
    let gate = AutoApproveGate;
    let decision = gate
        .check("Bash", &json!({ "command": "rm -rf /" }), "tool-7")
        .await;
    assert_eq!(decision, ToolDecision::Allow);
}

#[tokio::test]
async fn test_custom_timeout_is_respected() {
    let channel = Arc::new(MockChannel::new("dm"));
    channel.set_never_respond();
    let registry = registry_with_session(channel.clone());
    let gate = InteractiveGate::new("alice", registry).with_timeout(Duration::from_millis(20));

    let decision = gate.check("Bash", &json!({}), "tool-8").await;

    assert!(matches!(decision, ToolDecision::Deny { .. }));
}
