// ABOUTME: Scripted in-memory backend for tests.
// ABOUTME: Replays configured events per prompt and records opens, closes, and gate decisions.

use crate::event::AgentEvent;
use crate::handle::{Command, EventReceiver, SessionHandle};
use crate::options::{PermissionMode, SessionOptions, ToolDecision};
use crate::traits::AgentBackend;
use anyhow::Result;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// What one session open looked like, for assertions
#[derive(Debug, Clone)]
pub struct RecordedOpen {
    pub model: String,
    pub permission_mode: PermissionMode,
    pub has_gate: bool,
}

#[derive(Debug, Clone)]
struct ToolRequest {
    tool_name: String,
    input: Value,
    invocation_id: String,
}

#[derive(Debug, Clone)]
struct Expectation {
    pattern: String,
    tool_requests: Vec<ToolRequest>,
    events: Vec<AgentEvent>,
    end_stream: bool,
}

/// Backend that replays scripted expectations instead of running an agent.
///
/// Expectations are matched by substring against the sent text, first
/// match wins and is consumed. Sessions share the script, so one mock can
/// serve a whole test scenario.
pub struct MockBackend {
    script: Arc<Mutex<VecDeque<Expectation>>>,
    opens: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    recorded: Arc<Mutex<Vec<RecordedOpen>>>,
    decisions: Arc<Mutex<Vec<(String, ToolDecision)>>>,
    open_delay: Option<Duration>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            opens: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
            recorded: Arc::new(Mutex::new(Vec::new())),
            decisions: Arc::new(Mutex::new(Vec::new())),
            open_delay: None,
        }
    }

    /// Delay every open by the given duration. Useful for racing
    /// concurrent callers against a slow session creation.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    /// Start an expectation for a sent message containing `pattern`
    pub fn on_send(self, pattern: &str) -> ExpectationBuilder {
        ExpectationBuilder {
            backend: self,
            pattern: pattern.to_string(),
            tool_requests: Vec::new(),
            end_stream: false,
        }
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn recorded_opens(&self) -> Vec<RecordedOpen> {
        lock(&self.recorded).clone()
    }

    /// Gate decisions in the order the gate returned them, keyed by invocation id
    pub fn gate_decisions(&self) -> Vec<(String, ToolDecision)> {
        lock(&self.decisions).clone()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for one scripted expectation
pub struct ExpectationBuilder {
    backend: MockBackend,
    pattern: String,
    tool_requests: Vec<ToolRequest>,
    end_stream: bool,
}

impl ExpectationBuilder {
    /// Ask the session's tool gate about a tool before emitting events
    pub fn request_tool(mut self, tool_name: &str, input: Value, invocation_id: &str) -> Self {
        self.tool_requests.push(ToolRequest {
            tool_name: tool_name.to_string(),
            input,
            invocation_id: invocation_id.to_string(),
        });
        self
    }

    /// End the event stream after this expectation, simulating session death
    pub fn then_end_stream(mut self) -> MockBackend {
        self.end_stream = true;
        self.finish(Vec::new())
    }

    /// Respond with a single assistant message
    pub fn respond_text(self, text: &str) -> MockBackend {
        self.finish(vec![AgentEvent::Assistant {
            text: text.to_string(),
        }])
    }

    /// Respond with an explicit event sequence
    pub fn respond_with(self, events: Vec<AgentEvent>) -> MockBackend {
        self.finish(events)
    }

    fn finish(self, events: Vec<AgentEvent>) -> MockBackend {
        let expectation = Expectation {
            pattern: self.pattern,
            tool_requests: self.tool_requests,
            events,
            end_stream: self.end_stream,
        };
        lock(&self.backend.script).push_back(expectation);
        self.backend
    }
}

impl AgentBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn open<'a>(
        &'a self,
        options: SessionOptions,
    ) -> BoxFuture<'a, Result<(SessionHandle, EventReceiver)>> {
        let script = Arc::clone(&self.script);
        let closes = Arc::clone(&self.closes);
        let decisions = Arc::clone(&self.decisions);
        let open_delay = self.open_delay;
        Box::pin(async move {
            if let Some(delay) = open_delay {
                tokio::time::sleep(delay).await;
            }
            self.opens.fetch_add(1, Ordering::SeqCst);
            lock(&self.recorded).push(RecordedOpen {
                model: options.model.clone(),
                permission_mode: options.permission_mode,
                has_gate: options.tool_gate.is_some(),
            });

            let session_id = Uuid::new_v4().to_string();
            let (event_tx, event_rx) = mpsc::channel::<AgentEvent>(64);
            let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(32);
            let gate = options.tool_gate.clone();

            tokio::spawn(async move {
                // None after end_stream, which is what closes the receiver
                let mut event_tx = Some(event_tx);
                while let Some(cmd) = cmd_rx.recv().await {
                    match cmd {
                        Command::Send { text, reply } => {
                            let _ = reply.send(Ok(()));
                            let expectation = {
                                let mut script = lock(&script);
                                script
                                    .iter()
                                    .position(|e| text.contains(&e.pattern))
                                    .and_then(|i| script.remove(i))
                            };
                            let Some(expectation) = expectation else {
                                tracing::debug!(session_id = %session_id, text = %text, "No expectation matched");
                                continue;
                            };
                            for request in &expectation.tool_requests {
                                if let Some(gate) = &gate {
                                    let decision = gate
                                        .check(
                                            &request.tool_name,
                                            &request.input,
                                            &request.invocation_id,
                                        )
                                        .await;
                                    lock(&decisions)
                                        .push((request.invocation_id.clone(), decision));
                                }
                            }
                            if let Some(tx) = &event_tx {
                                for event in expectation.events {
                                    if tx.send(event).await.is_err() {
                                        break;
                                    }
                                }
                            }
                            if expectation.end_stream {
                                event_tx = None;
                            }
                        }
                        Command::Close { reply } => {
                            closes.fetch_add(1, Ordering::SeqCst);
                            let _ = reply.send(());
                            return;
                        }
                    }
                }
            });

            Ok((SessionHandle::new(cmd_tx, "mock"), EventReceiver::new(event_rx)))
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
