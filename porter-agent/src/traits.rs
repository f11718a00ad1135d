// ABOUTME: AgentBackend trait defining the interface all backends implement.
// ABOUTME: Opening a session yields a handle plus the session-lifetime event stream.

use crate::handle::{EventReceiver, SessionHandle};
use crate::options::SessionOptions;
use anyhow::Result;
use futures::future::BoxFuture;

/// A backend capable of opening agent sessions.
///
/// Implementations must be Send + Sync so one backend can serve sessions
/// for many users concurrently.
pub trait AgentBackend: Send + Sync {
    /// Short name for logging
    fn name(&self) -> &'static str;

    /// Open a new session with the given options.
    ///
    /// Returns the handle used to feed user messages in and the receiver
    /// that drains the session's events until it dies.
    fn open<'a>(
        &'a self,
        options: SessionOptions,
    ) -> BoxFuture<'a, Result<(SessionHandle, EventReceiver)>>;
}
