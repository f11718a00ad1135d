// ABOUTME: Agent backend that drives the Claude Code CLI over stream-json stdio.
// ABOUTME: Owns the child process, parses its stdout stream, and answers tool permission requests.

use crate::event::AgentEvent;
use crate::handle::{Command, EventReceiver, SessionHandle};
use crate::options::{PermissionMode, SessionOptions, ToolDecision, ToolGate};
use crate::traits::AgentBackend;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use serde_json::{json, Value};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

/// Backend that spawns one CLI process per session.
///
/// The process runs with `--input-format stream-json` so its stdin stays
/// open across turns; the session lives exactly as long as the process.
pub struct CliBackend {
    binary_path: String,
}

impl CliBackend {
    pub fn new(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }
}

impl AgentBackend for CliBackend {
    fn name(&self) -> &'static str {
        "cli"
    }

    fn open<'a>(
        &'a self,
        options: SessionOptions,
    ) -> BoxFuture<'a, Result<(SessionHandle, EventReceiver)>> {
        Box::pin(async move { open_session(&self.binary_path, options).await })
    }
}

async fn open_session(
    binary_path: &str,
    options: SessionOptions,
) -> Result<(SessionHandle, EventReceiver)> {
    // Basic sanity check on the binary path before handing it to the OS
    if binary_path.contains("..") || binary_path.contains('\0') {
        anyhow::bail!("Invalid agent binary path: {}", binary_path);
    }
    if !options.cwd.is_dir() {
        anyhow::bail!(
            "Working directory does not exist: {}",
            options.cwd.display()
        );
    }

    let session_id = Uuid::new_v4().to_string();
    let mut args: Vec<&str> = vec![
        "--print",
        "--input-format",
        "stream-json",
        "--output-format",
        "stream-json",
        "--verbose",
        "--model",
        &options.model,
    ];
    if options.permission_mode == PermissionMode::Plan {
        args.extend(["--permission-mode", "plan"]);
    }

    tracing::info!(
        session_id = %session_id,
        model = %options.model,
        cwd = %options.cwd.display(),
        mode = ?options.permission_mode,
        "Spawning agent CLI session"
    );

    let mut child = tokio::process::Command::new(binary_path)
        .args(&args)
        .current_dir(&options.cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to spawn agent CLI at {}", binary_path))?;

    let stdin = child
        .stdin
        .take()
        .context("Failed to capture agent CLI stdin")?;
    let stdout = child
        .stdout
        .take()
        .context("Failed to capture agent CLI stdout")?;
    let stderr = child
        .stderr
        .take()
        .context("Failed to capture agent CLI stderr")?;

    // Both the command worker and the control-response path write to stdin
    let stdin = Arc::new(Mutex::new(stdin));

    let (event_tx, event_rx) = mpsc::channel::<AgentEvent>(256);
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(32);

    // Surface CLI diagnostics without mixing them into the event stream
    let stderr_session = session_id.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if !line.is_empty() {
                tracing::warn!(session_id = %stderr_session, line = %line, "Agent CLI stderr");
            }
        }
    });

    // Stdout reader: parses the stream and dispatches control requests.
    // When stdout closes the child has exited; dropping event_tx here is
    // what ends the EventReceiver stream.
    tokio::spawn(pump_stdout(
        stdout,
        event_tx,
        options.tool_gate.clone(),
        Arc::clone(&stdin),
        session_id.clone(),
    ));

    // Command worker: owns the child, serializes writes, reaps on close
    let writer_stdin = Arc::clone(&stdin);
    let worker_session = session_id.clone();
    tokio::spawn(async move {
        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                Command::Send { text, reply } => {
                    let result = write_user_message(&writer_stdin, &text).await;
                    let _ = reply.send(result);
                }
                Command::Close { reply } => {
                    tracing::info!(session_id = %worker_session, "Closing agent CLI session");
                    if let Err(e) = child.start_kill() {
                        tracing::warn!(session_id = %worker_session, error = %e, "Failed to kill agent CLI");
                    }
                    let _ = child.wait().await;
                    let _ = reply.send(());
                    return;
                }
            }
        }
        // All handles dropped without an explicit close; reap the child anyway
        let _ = child.start_kill();
        let _ = child.wait().await;
        tracing::debug!(session_id = %worker_session, "Agent CLI session worker exited");
    });

    Ok((SessionHandle::new(cmd_tx, "cli"), EventReceiver::new(event_rx)))
}

/// Drain one session's stdout stream until it closes.
///
/// Control requests are answered from their own tasks: the gate can wait
/// on the user for up to a minute, and later events (including further
/// control requests) must keep flowing meanwhile.
async fn pump_stdout<R, W>(
    stdout: R,
    event_tx: mpsc::Sender<AgentEvent>,
    gate: Option<Arc<dyn ToolGate>>,
    stdin: Arc<Mutex<W>>,
    session_id: String,
) where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        let json: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(session_id = %session_id, error = %e, "Skipping unparseable stream line");
                continue;
            }
        };
        if json.get("type").and_then(Value::as_str) == Some("control_request") {
            let gate = gate.clone();
            let stdin = Arc::clone(&stdin);
            tokio::spawn(async move {
                handle_control_request(&json, gate.as_deref(), &stdin).await;
            });
            continue;
        }
        for event in parse_stream_line(&json) {
            if event_tx.send(event).await.is_err() {
                return;
            }
        }
    }
    tracing::debug!(session_id = %session_id, "Agent CLI stdout stream ended");
}

async fn write_user_message<W: AsyncWrite + Unpin>(stdin: &Arc<Mutex<W>>, text: &str) -> Result<()> {
    let frame = json!({
        "type": "user",
        "message": {
            "role": "user",
            "content": [{ "type": "text", "text": text }]
        }
    });
    write_frame(stdin, &frame).await
}

async fn write_frame<W: AsyncWrite + Unpin>(stdin: &Arc<Mutex<W>>, frame: &Value) -> Result<()> {
    let mut line = serde_json::to_string(frame).context("Failed to serialize stream frame")?;
    line.push('\n');
    let mut stdin = stdin.lock().await;
    stdin
        .write_all(line.as_bytes())
        .await
        .context("Failed to write to agent CLI stdin")?;
    stdin
        .flush()
        .await
        .context("Failed to flush agent CLI stdin")?;
    Ok(())
}

/// Answer a `can_use_tool` control request by consulting the tool gate.
///
/// The CLI blocks the tool invocation until it reads our control_response.
/// Runs on its own task per request, so a slow gate pauses only its own
/// invocation.
async fn handle_control_request<W: AsyncWrite + Unpin>(
    json: &Value,
    gate: Option<&dyn ToolGate>,
    stdin: &Arc<Mutex<W>>,
) {
    let request_id = json
        .get("request_id")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let request = json.get("request");
    let subtype = request.and_then(|r| r.get("subtype")).and_then(Value::as_str);
    if subtype != Some("can_use_tool") {
        tracing::debug!(subtype = ?subtype, "Ignoring unhandled control request");
        return;
    }

    let tool_name = request
        .and_then(|r| r.get("tool_name"))
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let input = request
        .and_then(|r| r.get("input"))
        .cloned()
        .unwrap_or(Value::Null);
    let invocation_id = request
        .and_then(|r| r.get("tool_use_id"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| request_id.clone());

    let decision = match gate {
        Some(gate) => gate.check(tool_name, &input, &invocation_id).await,
        // Default-mode session without a gate: fail closed
        None => ToolDecision::Deny {
            reason: "No permission gate installed".to_string(),
        },
    };

    tracing::info!(
        tool_name = %tool_name,
        invocation_id = %invocation_id,
        decision = ?decision,
        "Tool permission decision"
    );

    let response = match decision {
        ToolDecision::Allow => json!({ "behavior": "allow", "updatedInput": input }),
        ToolDecision::Deny { reason } => json!({ "behavior": "deny", "message": reason }),
    };
    let frame = json!({
        "type": "control_response",
        "response": {
            "subtype": "success",
            "request_id": request_id,
            "response": response,
        }
    });
    if let Err(e) = write_frame(stdin, &frame).await {
        tracing::warn!(error = %e, "Failed to send control response");
    }
}

/// Map one parsed stream-json line to bridge events.
///
/// A single `user` line can carry several tool_result blocks and so can
/// produce several events; every other line maps to at most one.
pub fn parse_stream_line(json: &Value) -> Vec<AgentEvent> {
    let kind = json.get("type").and_then(Value::as_str).unwrap_or("");
    match kind {
        "system" => {
            if json.get("subtype").and_then(Value::as_str) == Some("init") {
                vec![AgentEvent::SystemInit {
                    cwd: json
                        .get("cwd")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                }]
            } else {
                vec![AgentEvent::Other {
                    kind: "system".to_string(),
                }]
            }
        }
        "assistant" => {
            let mut parts: Vec<&str> = Vec::new();
            if let Some(content) = json.pointer("/message/content").and_then(Value::as_array) {
                for block in content {
                    if block.get("type").and_then(Value::as_str) == Some("text") {
                        if let Some(text) = block.get("text").and_then(Value::as_str) {
                            parts.push(text);
                        }
                    }
                }
            }
            vec![AgentEvent::Assistant {
                text: parts.join("\n"),
            }]
        }
        "user" => {
            let mut events = Vec::new();
            if let Some(content) = json.pointer("/message/content").and_then(Value::as_array) {
                for block in content {
                    if block.get("type").and_then(Value::as_str) == Some("tool_result") {
                        events.push(AgentEvent::ToolResult {
                            content: render_block_content(block.get("content")),
                            is_error: block
                                .get("is_error")
                                .and_then(Value::as_bool)
                                .unwrap_or(false),
                        });
                    }
                }
            }
            if events.is_empty() {
                events.push(AgentEvent::Other {
                    kind: "user".to_string(),
                });
            }
            events
        }
        "result" => {
            let text = match json.get("result") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => serde_json::to_string_pretty(other).unwrap_or_default(),
            };
            vec![AgentEvent::Result {
                text,
                is_error: json
                    .get("is_error")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            }]
        }
        other => vec![AgentEvent::Other {
            kind: other.to_string(),
        }],
    }
}

/// Tool result content arrives as a bare string, a block list, or
/// arbitrary JSON depending on the tool
fn render_block_content(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(blocks)) => blocks
            .iter()
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        Some(other) => serde_json::to_string_pretty(other).unwrap_or_default(),
        None => String::new(),
    }
}
