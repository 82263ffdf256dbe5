use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
}

/// Read-only view of a queued request for the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct PendingApproval {
    pub request_id: String,
    pub operation: String,
    pub details: serde_json::Value,
    pub requested_at: DateTime<Utc>,
    pub age_seconds: f64,
}

struct PendingOperation {
    operation: String,
    details: serde_json::Value,
    requested_at: DateTime<Utc>,
    queued: Instant,
    /// Current status; waiters subscribe, `approve`/`deny` publish.
    status: watch::Sender<ApprovalStatus>,
}

impl PendingOperation {
    fn current(&self) -> ApprovalStatus {
        *self.status.borrow()
    }
}

/// Operations suspended until an administrator approves or denies them.
///
/// A decision is published once: the first `approve`/`deny` for a request
/// flips it out of `Pending` and wakes the waiter, later calls return `false`.
/// The waiter removes the entry on every outcome, including timeout.
#[derive(Default)]
pub struct ApprovalQueue {
    pending: Mutex<HashMap<String, PendingOperation>>,
}

impl ApprovalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an operation and return its request id. Does not block.
    pub fn request_approval(&self, operation: &str, details: serde_json::Value) -> String {
        let request_id = uuid::Uuid::new_v4().simple().to_string();
        let (status, _) = watch::channel(ApprovalStatus::Pending);

        self.entries().insert(
                request_id.clone(),
                PendingOperation {
                    operation: operation.to_string(),
                    details,
                    requested_at: Utc::now(),
                    queued: Instant::now(),
                    status,
                },
            );

        tracing::info!(%request_id, operation, "approval requested");
        request_id
    }

    /// Wait until the request is decided or `timeout` elapses.
    ///
    /// Returns `true` only if approved. The entry is gone from the queue once
    /// this returns, whatever the outcome, and also if the future is dropped
    /// mid-wait.
    pub async fn wait_for_decision(&self, request_id: &str, timeout: Duration) -> bool {
        let mut receiver = {
            let pending = self.entries();
            match pending.get(request_id) {
                Some(entry) => entry.status.subscribe(),
                None => return false,
            }
        };
        let guard = PendingGuard {
            queue: self,
            request_id: Some(request_id),
        };

        // A closed channel means the entry was purged; treat as denial below.
        let _ = tokio::time::timeout(
            timeout,
            receiver.wait_for(|status| *status != ApprovalStatus::Pending),
        )
        .await;

        // The status read under the lock is authoritative: a decision that
        // lands between the wakeup and here still counts, a later one cannot.
        let outcome = guard
            .take()
            .map_or(ApprovalStatus::Denied, |entry| entry.current());

        match outcome {
            ApprovalStatus::Approved => {
                tracing::info!(%request_id, "approval granted");
                true
            }
            ApprovalStatus::Denied => {
                tracing::info!(%request_id, "approval denied");
                false
            }
            ApprovalStatus::Pending => {
                tracing::warn!(
                    %request_id,
                    timeout_secs = timeout.as_secs_f64(),
                    "approval timed out"
                );
                false
            }
        }
    }

    pub fn approve(&self, request_id: &str) -> bool {
        self.decide(request_id, ApprovalStatus::Approved)
    }

    pub fn deny(&self, request_id: &str) -> bool {
        self.decide(request_id, ApprovalStatus::Denied)
    }

    fn decide(&self, request_id: &str, decision: ApprovalStatus) -> bool {
        let pending = self.entries();
        let Some(entry) = pending.get(request_id) else {
            return false;
        };
        if entry.current() != ApprovalStatus::Pending {
            return false;
        }
        entry.status.send_replace(decision);
        true
    }

    /// Undecided requests, oldest first.
    pub fn list_pending(&self) -> Vec<PendingApproval> {
        let pending = self.entries();
        let mut listed: Vec<PendingApproval> = pending
            .iter()
            .filter(|(_, entry)| entry.current() == ApprovalStatus::Pending)
            .map(|(request_id, entry)| PendingApproval {
                request_id: request_id.clone(),
                operation: entry.operation.clone(),
                details: entry.details.clone(),
                requested_at: entry.requested_at,
                age_seconds: entry.queued.elapsed().as_secs_f64(),
            })
            .collect();
        listed.sort_by(|a, b| a.requested_at.cmp(&b.requested_at));
        listed
    }

    /// Drop entries queued longer than `max_age` that no waiter cleaned up.
    /// Any waiter still attached observes a denial.
    pub fn purge_stale(&self, max_age: Duration) -> usize {
        let mut pending = self.entries();
        let before = pending.len();
        pending.retain(|_, entry| entry.queued.elapsed() < max_age);
        before - pending.len()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, PendingOperation>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns a queued entry for the duration of a wait and removes it when the
/// wait ends, including when the waiting future is cancelled.
struct PendingGuard<'a> {
    queue: &'a ApprovalQueue,
    request_id: Option<&'a str>,
}

impl PendingGuard<'_> {
    fn take(mut self) -> Option<PendingOperation> {
        let request_id = self.request_id.take()?;
        self.queue.entries().remove(request_id)
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if let Some(request_id) = self.request_id.take()
            && self.queue.entries().remove(request_id).is_some()
        {
            tracing::info!(%request_id, "approval abandoned by caller");
        }
    }
}
