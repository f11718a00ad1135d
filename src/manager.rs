// ABOUTME: Session lifecycle orchestration: get-or-create, recreate, destroy, shutdown.
// ABOUTME: Guarantees at most one live session per user with single-flight creation.

use crate::gate::{AutoApproveGate, InteractiveGate, GATE_TIMEOUT};
use crate::registry::{Mode, SessionRecord, SessionRegistry};
use crate::stream::spawn_stream_reader;
use crate::traits::DmChannel;
use anyhow::{Context, Result};
use porter_agent::{AgentBackend, PermissionMode, SessionOptions};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Orchestrates agent sessions for all users.
///
/// The registry holds what exists; the manager decides when sessions are
/// born and die. Creation is single-flight per user: concurrent callers
/// for the same user converge on one backend open.
pub struct SessionManager {
    registry: Arc<SessionRegistry>,
    backend: Arc<dyn AgentBackend>,
    default_model: String,
    work_dir: PathBuf,
    gate_timeout: Duration,
    /// Per-user creation locks; also serializes destroy against create.
    /// Entries are never removed: a waiter may still hold a clone of its
    /// lock, and handing out a second lock for the same user would let two
    /// creations race. The map stays small, bounded by the whitelist.
    creating: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn AgentBackend>,
        default_model: impl Into<String>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            backend,
            default_model: default_model.into(),
            work_dir: work_dir.into(),
            gate_timeout: GATE_TIMEOUT,
            creating: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_gate_timeout(mut self, timeout: Duration) -> Self {
        self.gate_timeout = timeout;
        self
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// The user's live session, or a fresh one with default model and mode.
    ///
    /// Concurrent calls for the same user share one creation; everyone
    /// gets the same record back.
    pub async fn get_or_create(
        &self,
        user_id: &str,
        channel: Arc<dyn DmChannel>,
    ) -> Result<Arc<SessionRecord>> {
        if let Some(record) = self.registry.get(user_id) {
            return Ok(record);
        }

        let user_lock = self.user_lock(user_id).await;
        let _guard = user_lock.lock().await;
        // Someone else may have finished creating while we waited
        if let Some(record) = self.registry.get(user_id) {
            return Ok(record);
        }
        self.create_session(user_id, channel, self.default_model.clone(), Mode::default())
            .await
    }

    /// Tear down the user's session (if any) and open a fresh one.
    ///
    /// `model` and `mode` override the old session's settings; None keeps
    /// them. With no old session, defaults fill the gaps.
    pub async fn recreate(
        &self,
        user_id: &str,
        channel: Arc<dyn DmChannel>,
        model: Option<String>,
        mode: Option<Mode>,
    ) -> Result<Arc<SessionRecord>> {
        let user_lock = self.user_lock(user_id).await;
        let _guard = user_lock.lock().await;

        let old = self.registry.get(user_id);
        let model = model
            .or_else(|| old.as_ref().map(|r| r.model.clone()))
            .unwrap_or_else(|| self.default_model.clone());
        let mode = mode
            .or_else(|| old.as_ref().map(|r| r.mode))
            .unwrap_or_default();

        if let Some(old) = self.registry.remove(user_id) {
            teardown(&old).await;
        }
        self.create_session(user_id, channel, model, mode).await
    }

    /// Tear down the user's session. Idempotent: destroying a missing
    /// session is a no-op.
    pub async fn destroy(&self, user_id: &str) {
        let user_lock = self.user_lock(user_id).await;
        let _guard = user_lock.lock().await;

        if let Some(record) = self.registry.remove(user_id) {
            tracing::info!(user_id = %user_id, "Destroying session");
            teardown(&record).await;
        }
    }

    /// Tear down every live session
    pub async fn shutdown(&self) {
        let records = self.registry.drain();
        tracing::info!(count = records.len(), "Shutting down all sessions");
        for record in records {
            teardown(&record).await;
        }
    }

    async fn create_session(
        &self,
        user_id: &str,
        channel: Arc<dyn DmChannel>,
        model: String,
        mode: Mode,
    ) -> Result<Arc<SessionRecord>> {
        let options = self.session_options(user_id, &model, mode);
        tracing::info!(
            user_id = %user_id,
            model = %model,
            mode = %mode,
            backend = %self.backend.name(),
            "Creating session"
        );
        let (handle, events) = self
            .backend
            .open(options)
            .await
            .with_context(|| format!("Failed to open session for user {}", user_id))?;

        let record = Arc::new(SessionRecord::new(user_id, handle, model, mode, channel));
        // Register before spawning the reader so the interactive gate can
        // resolve the session from its very first event
        self.registry.insert(Arc::clone(&record));
        let reader = spawn_stream_reader(Arc::clone(&record), self.registry(), events);
        record.set_reader(reader);
        Ok(record)
    }

    fn session_options(&self, user_id: &str, model: &str, mode: Mode) -> SessionOptions {
        let options = SessionOptions::new(model, &self.work_dir);
        match mode {
            Mode::Plan => options.with_permission_mode(PermissionMode::Plan),
            Mode::EditAsk => options.with_tool_gate(Arc::new(
                InteractiveGate::new(user_id, self.registry()).with_timeout(self.gate_timeout),
            )),
            Mode::AutoEdit => options.with_tool_gate(Arc::new(AutoApproveGate)),
        }
    }

    async fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut creating = self.creating.lock().await;
        Arc::clone(creating.entry(user_id.to_string()).or_default())
    }
}

/// Cancel the reader, close the backend session, and wait for the reader
/// to finish so no stale task outlives the record
async fn teardown(record: &Arc<SessionRecord>) {
    record.cancel.cancel();
    record.handle.close().await;
    if let Some(reader) = record.take_reader() {
        if let Err(e) = reader.await {
            tracing::warn!(user_id = %record.user_id, error = %e, "Stream reader panicked");
        }
    }
}
