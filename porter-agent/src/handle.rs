// ABOUTME: SessionHandle provides a Send+Sync wrapper around a backend session worker.
// ABOUTME: Uses channels to communicate with the worker task owning the transport.

use crate::AgentEvent;
use anyhow::Result;
use tokio::sync::{mpsc, oneshot};

/// Commands sent from a SessionHandle to the backend session worker
#[derive(Debug)]
pub enum Command {
    Send {
        text: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// Send + Sync handle to one open agent session.
///
/// Internally communicates with a worker task that owns the actual
/// transport (a child process for the CLI backend). The handle can be
/// cloned freely; the session stays open until `close` is called or the
/// worker dies.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Command>,
    backend: &'static str,
}

impl SessionHandle {
    /// Create a new handle with the given command channel and backend name
    pub fn new(tx: mpsc::Sender<Command>, backend: &'static str) -> Self {
        Self { tx, backend }
    }

    /// Name of the backend that opened this session
    pub fn backend(&self) -> &'static str {
        self.backend
    }

    /// Forward one user message into the session's conversation
    pub async fn send(&self, text: &str) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Send {
                text: text.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("Session worker closed"))?;
        reply_rx
            .await
            .map_err(|_| anyhow::anyhow!("Session worker dropped reply channel"))?
    }

    /// Close the session, tearing down the transport. Best effort: a worker
    /// that already died counts as closed.
    pub async fn close(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .tx
            .send(Command::Close { reply: reply_tx })
            .await
            .is_ok()
        {
            let _ = reply_rx.await;
        }
    }
}

/// Receiver for the event stream of one session.
///
/// `recv` returning `None` means the stream is over: the transport exited
/// or the session was closed. A session emits events for its whole
/// lifetime, across turns; there is no per-turn stream.
pub struct EventReceiver {
    rx: mpsc::Receiver<AgentEvent>,
}

impl EventReceiver {
    pub fn new(rx: mpsc::Receiver<AgentEvent>) -> Self {
        Self { rx }
    }

    /// Receive the next event, or None once the stream has ended
    pub async fn recv(&mut self) -> Option<AgentEvent> {
        self.rx.recv().await
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Option<AgentEvent> {
        self.rx.try_recv().ok()
    }
}
