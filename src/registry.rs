// ABOUTME: In-memory registry of live agent sessions, keyed by user id.
// ABOUTME: Holds the per-session record: handle, cancellation token, reader task.

use crate::traits::DmChannel;
use porter_agent::SessionHandle;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Permission mode of a session, as the user picks it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Read-only planning, enforced by the backend
    Plan,
    /// Edits allowed, each tool use individually approved
    EditAsk,
    /// Edits allowed without asking
    AutoEdit,
}

impl Mode {
    /// Human-readable label shown in menus and confirmations
    pub fn label(&self) -> &'static str {
        match self {
            Mode::Plan => "Plan (read-only)",
            Mode::EditAsk => "Edit & Ask",
            Mode::AutoEdit => "Auto-Edit",
        }
    }

    /// Stable value used in menus and config files
    pub fn value(&self) -> &'static str {
        match self {
            Mode::Plan => "plan",
            Mode::EditAsk => "edit-ask",
            Mode::AutoEdit => "auto-edit",
        }
    }

    pub fn all() -> [Mode; 3] {
        [Mode::Plan, Mode::EditAsk, Mode::AutoEdit]
    }
}

impl Default for Mode {
    fn default() -> Self {
        Mode::AutoEdit
    }
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plan" => Ok(Mode::Plan),
            "edit-ask" => Ok(Mode::EditAsk),
            "auto-edit" => Ok(Mode::AutoEdit),
            other => anyhow::bail!("Unknown mode: {}", other),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value())
    }
}

/// Everything the bridge tracks about one live session
pub struct SessionRecord {
    pub user_id: String,
    pub handle: SessionHandle,
    pub model: String,
    pub mode: Mode,
    pub channel: Arc<dyn DmChannel>,
    /// Cancelled when the session is torn down on purpose, so the stream
    /// reader can tell teardown apart from session death
    pub cancel: CancellationToken,
    workspace_info_shown: AtomicBool,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl SessionRecord {
    pub fn new(
        user_id: impl Into<String>,
        handle: SessionHandle,
        model: impl Into<String>,
        mode: Mode,
        channel: Arc<dyn DmChannel>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            handle,
            model: model.into(),
            mode,
            channel,
            cancel: CancellationToken::new(),
            workspace_info_shown: AtomicBool::new(false),
            reader: Mutex::new(None),
        }
    }

    /// Returns true exactly once per session, the first time it is called
    pub fn mark_workspace_info_shown(&self) -> bool {
        !self.workspace_info_shown.swap(true, Ordering::SeqCst)
    }

    pub fn set_reader(&self, task: JoinHandle<()>) {
        *lock(&self.reader) = Some(task);
    }

    pub fn take_reader(&self) -> Option<JoinHandle<()>> {
        lock(&self.reader).take()
    }
}

impl fmt::Debug for SessionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRecord")
            .field("user_id", &self.user_id)
            .field("model", &self.model)
            .field("mode", &self.mode)
            .finish()
    }
}

/// Map of user id to live session record.
///
/// Pure bookkeeping: all locking is synchronous and never held across an
/// await. Lifecycle orchestration lives in the session manager.
#[derive(Default)]
pub struct SessionRegistry {
    records: Mutex<HashMap<String, Arc<SessionRecord>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: &str) -> Option<Arc<SessionRecord>> {
        lock(&self.records).get(user_id).cloned()
    }

    /// Insert a record, returning the one it displaced if any
    pub fn insert(&self, record: Arc<SessionRecord>) -> Option<Arc<SessionRecord>> {
        lock(&self.records).insert(record.user_id.clone(), record)
    }

    pub fn remove(&self, user_id: &str) -> Option<Arc<SessionRecord>> {
        lock(&self.records).remove(user_id)
    }

    /// Remove `record` only if it is still the current one for its user.
    /// Keeps a dying session's reader from evicting its replacement.
    pub fn remove_if_current(&self, record: &Arc<SessionRecord>) -> bool {
        let mut records = lock(&self.records);
        match records.get(&record.user_id) {
            Some(current) if Arc::ptr_eq(current, record) => {
                records.remove(&record.user_id);
                true
            }
            _ => false,
        }
    }

    /// Remove and return every record, emptying the registry
    pub fn drain(&self) -> Vec<Arc<SessionRecord>> {
        lock(&self.records).drain().map(|(_, r)| r).collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.records).is_empty()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
