// ABOUTME: In-memory DmChannel for tests.
// ABOUTME: Records sent messages and replays scripted approval choices.

use crate::traits::{ApprovalChoice, ApprovalRequest, DmChannel};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Channel that records everything and answers approvals from a script.
///
/// With `never_respond` set, approval requests hang forever, which is how
/// tests exercise the gate timeout.
#[derive(Clone, Default)]
pub struct MockChannel {
    id: String,
    messages: Arc<Mutex<Vec<String>>>,
    approvals: Arc<Mutex<VecDeque<ApprovalChoice>>>,
    approval_requests: Arc<Mutex<Vec<ApprovalRequest>>>,
    typing_count: Arc<AtomicUsize>,
    never_respond: Arc<AtomicBool>,
}

impl MockChannel {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Queue the answer for the next approval request
    pub fn push_approval(&self, choice: ApprovalChoice) {
        lock(&self.approvals).push_back(choice);
    }

    /// Make approval requests hang instead of answering
    pub fn set_never_respond(&self) {
        self.never_respond.store(true, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<String> {
        lock(&self.messages).clone()
    }

    pub fn approval_requests(&self) -> Vec<ApprovalRequest> {
        lock(&self.approval_requests).clone()
    }

    pub fn typing_count(&self) -> usize {
        self.typing_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DmChannel for MockChannel {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&self, text: &str) -> Result<()> {
        lock(&self.messages).push(text.to_string());
        Ok(())
    }

    async fn send_typing(&self) -> Result<()> {
        self.typing_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn request_approval(&self, request: &ApprovalRequest) -> Result<ApprovalChoice> {
        lock(&self.approval_requests).push(request.clone());
        if self.never_respond.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let choice = lock(&self.approvals)
            .pop_front()
            .unwrap_or(ApprovalChoice::TimedOut);
        Ok(choice)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
