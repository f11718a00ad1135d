// ABOUTME: Options controlling how a backend opens a session.
// ABOUTME: Permission mode, model selection, and the tool gate hook.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Permission posture the backend enforces natively.
///
/// `Plan` sessions are read-only at the transport level; everything else
/// runs with default permissions and relies on the tool gate for control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionMode {
    Plan,
    Default,
}

/// Verdict a tool gate returns for one tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolDecision {
    Allow,
    Deny { reason: String },
}

/// Hook consulted before the agent runs a tool.
///
/// The backend blocks the invocation until the gate answers; a slow gate
/// stalls the agent, not the transport. Implementations own their timeout.
#[async_trait]
pub trait ToolGate: Send + Sync {
    async fn check(&self, tool_name: &str, input: &Value, invocation_id: &str) -> ToolDecision;
}

/// Options for opening one agent session
#[derive(Clone)]
pub struct SessionOptions {
    pub model: String,
    pub cwd: PathBuf,
    pub permission_mode: PermissionMode,
    pub tool_gate: Option<Arc<dyn ToolGate>>,
}

impl SessionOptions {
    pub fn new(model: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            model: model.into(),
            cwd: cwd.into(),
            permission_mode: PermissionMode::Default,
            tool_gate: None,
        }
    }

    pub fn with_permission_mode(mut self, mode: PermissionMode) -> Self {
        self.permission_mode = mode;
        self
    }

    pub fn with_tool_gate(mut self, gate: Arc<dyn ToolGate>) -> Self {
        self.tool_gate = Some(gate);
        self
    }
}

impl fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionOptions")
            .field("model", &self.model)
            .field("cwd", &self.cwd)
            .field("permission_mode", &self.permission_mode)
            .field("tool_gate", &self.tool_gate.is_some())
            .finish()
    }
}
