// ABOUTME: Tests for the scripted mock backend.
// ABOUTME: Verifies expectation matching, counters, gate consultation, and stream end.

use async_trait::async_trait;
use porter_agent::backends::MockBackend;
use porter_agent::{
    AgentBackend, AgentEvent, PermissionMode, SessionOptions, ToolDecision, ToolGate,
};
use serde_json::{json, Value};
use std::sync::Arc;

fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

fn options() -> SessionOptions {
    init_logging();
    SessionOptions::new("test-model", std::env::temp_dir())
}

struct AllowAll;

#[async_trait]
impl ToolGate for AllowAll {
    async fn check(&self, _tool_name: &str, _input: &Value, _invocation_id: &str) -> ToolDecision {
        ToolDecision::Allow
    }
}

#[tokio::test]
async fn test_scripted_response_round_trip() {
    let backend = MockBackend::new().on_send("hello").respond_text("hi there");

    let (handle, mut events) = backend.open(options()).await.unwrap();
    handle.send("hello agent").await.unwrap();

    assert_eq!(
        events.recv().await,
        Some(AgentEvent::Assistant {
            text: "hi there".to_string()
        })
    );
    assert_eq!(backend.open_count(), 1);
}

#[tokio::test]
async fn test_expectations_consumed_in_order() {
    let backend = MockBackend::new()
        .on_send("first")
        .respond_text("one")
        .on_send("second")
        .respond_text("two");

    let (handle, mut events) = backend.open(options()).await.unwrap();
    handle.send("second question").await.unwrap();
    handle.send("first question").await.unwrap();

    assert_eq!(
        events.recv().await,
        Some(AgentEvent::Assistant {
            text: "two".to_string()
        })
    );
    assert_eq!(
        events.recv().await,
        Some(AgentEvent::Assistant {
            text: "one".to_string()
        })
    );
}

#[tokio::test]
async fn test_unmatched_send_produces_no_events() {
    let backend = MockBackend::new().on_send("known").respond_text("reply");

    let (handle, mut events) = backend.open(options()).await.unwrap();
    handle.send("something else").await.unwrap();

    assert_eq!(events.try_recv(), None);
}

#[tokio::test]
async fn test_close_increments_counter_and_ends_stream() {
    let backend = MockBackend::new();
    let (handle, mut events) = backend.open(options()).await.unwrap();

    handle.close().await;

    assert_eq!(backend.close_count(), 1);
    assert_eq!(events.recv().await, None);
}

#[tokio::test]
async fn test_end_stream_closes_receiver_without_close() {
    let backend = MockBackend::new().on_send("die").then_end_stream();

    let (handle, mut events) = backend.open(options()).await.unwrap();
    handle.send("please die").await.unwrap();

    assert_eq!(events.recv().await, None);
    assert_eq!(backend.close_count(), 0);
}

#[tokio::test]
async fn test_recorded_opens_capture_options() {
    let backend = MockBackend::new();
    let opts = options()
        .with_permission_mode(PermissionMode::Plan)
        .with_tool_gate(Arc::new(AllowAll));
    let _session = backend.open(opts).await.unwrap();

    let recorded = backend.recorded_opens();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].model, "test-model");
    assert_eq!(recorded[0].permission_mode, PermissionMode::Plan);
    assert!(recorded[0].has_gate);
}

#[tokio::test]
async fn test_tool_requests_consult_gate() {
    let backend = MockBackend::new()
        .on_send("run it")
        .request_tool("Bash", json!({ "command": "ls" }), "tool-1")
        .respond_text("done");

    let opts = options().with_tool_gate(Arc::new(AllowAll));
    let (handle, mut events) = backend.open(opts).await.unwrap();
    handle.send("run it").await.unwrap();

    assert_eq!(
        events.recv().await,
        Some(AgentEvent::Assistant {
            text: "done".to_string()
        })
    );
    assert_eq!(
        backend.gate_decisions(),
        vec![("tool-1".to_string(), ToolDecision::Allow)]
    );
}
