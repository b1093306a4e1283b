//! Time-boxed human confirmation before an application is sent.
//!
//! Each discovered posting opens a [`ConfirmationRequest`]. Its resolution is
//! a single atomic cell: the first of approve, decline or expire to
//! compare-and-set it wins and every later attempt is a no-op. Expiry is
//! driven by a timer inside [`ConfirmationGate::await_reply`], so it fires
//! whether or not any message ever arrives.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info};

use crate::posting::JobPosting;
use crate::state_machine::ApplicationState;

/// Default time a human has to answer.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    Approved,
    Declined,
    Expired,
}

impl Resolution {
    const UNRESOLVED: u8 = 0;

    fn code(self) -> u8 {
        match self {
            Resolution::Approved => 1,
            Resolution::Declined => 2,
            Resolution::Expired => 3,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Resolution::Approved),
            2 => Some(Resolution::Declined),
            3 => Some(Resolution::Expired),
            _ => None,
        }
    }

    /// The attempt state this resolution moves to.
    pub fn state(self) -> ApplicationState {
        match self {
            Resolution::Approved => ApplicationState::Approved,
            Resolution::Declined => ApplicationState::Declined,
            Resolution::Expired => ApplicationState::Expired,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Approved => write!(f, "approved"),
            Resolution::Declined => write!(f, "declined"),
            Resolution::Expired => write!(f, "expired"),
        }
    }
}

/// A human answer to a confirmation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Approve,
    Decline,
}

impl Verdict {
    const AFFIRMATIVE: &'static [&'static str] = &["yes", "y", "apply", "approve", "ok"];
    const NEGATIVE: &'static [&'static str] = &["no", "n", "skip", "decline"];

    /// Recognize a reply word, case-insensitively.
    pub fn recognize(word: &str) -> Option<Self> {
        let word = word
            .trim()
            .trim_end_matches(['!', '.'])
            .to_ascii_lowercase();
        if Self::AFFIRMATIVE.contains(&word.as_str()) {
            Some(Verdict::Approve)
        } else if Self::NEGATIVE.contains(&word.as_str()) {
            Some(Verdict::Decline)
        } else {
            None
        }
    }

    fn resolution(self) -> Resolution {
        match self {
            Verdict::Approve => Resolution::Approved,
            Verdict::Decline => Resolution::Declined,
        }
    }
}

pub struct ConfirmationRequest {
    pub id: RequestId,
    pub job: JobPosting,
    pub expires_at: DateTime<Utc>,
    deadline: Instant,
    resolution: AtomicU8,
    resolved: Notify,
}

impl ConfirmationRequest {
    fn new(id: RequestId, job: JobPosting, timeout: Duration) -> Self {
        let expires_at = Utc::now() + chrono::Duration::milliseconds(timeout.as_millis() as i64);
        Self {
            id,
            job,
            expires_at,
            deadline: Instant::now() + timeout,
            resolution: AtomicU8::new(Resolution::UNRESOLVED),
            resolved: Notify::new(),
        }
    }

    pub fn resolution(&self) -> Option<Resolution> {
        Resolution::from_code(self.resolution.load(Ordering::Acquire))
    }

    /// Set the resolution if nothing has set it yet. Returns `true` for the
    /// single caller that wins.
    pub fn try_resolve(&self, resolution: Resolution) -> bool {
        let won = self
            .resolution
            .compare_exchange(
                Resolution::UNRESOLVED,
                resolution.code(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if won {
            // notify_one stores a permit, so a waiter that has not polled yet still wakes.
            self.resolved.notify_one();
        }
        won
    }
}

impl fmt::Debug for ConfirmationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfirmationRequest")
            .field("id", &self.id)
            .field("job", &self.job.headline())
            .field("expires_at", &self.expires_at)
            .field("resolution", &self.resolution())
            .finish()
    }
}

/// What happened to a human reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// The reply resolved the request.
    Accepted {
        id: RequestId,
        resolution: Resolution,
        job: String,
    },
    /// Someone (or the timer) got there first.
    AlreadyResolved { id: RequestId, resolution: Resolution },
    /// No pending request matched.
    NoSuchRequest(Option<RequestId>),
}

/// Registry of open confirmation requests, shared between the pipeline loop
/// and the inbound listener.
pub struct ConfirmationGate {
    timeout: Duration,
    next_id: AtomicU64,
    pending: Mutex<BTreeMap<RequestId, Arc<ConfirmationRequest>>>,
}

impl ConfirmationGate {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            next_id: AtomicU64::new(1),
            pending: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Open a request for `job` with a deadline `timeout` from now.
    pub fn open(&self, job: JobPosting) -> Arc<ConfirmationRequest> {
        let id = RequestId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let request = Arc::new(ConfirmationRequest::new(id, job, self.timeout));
        self.lock_pending().insert(id, Arc::clone(&request));
        debug!(request_id = %id, "confirmation request opened");
        request
    }

    /// Apply a human verdict. Without an id the oldest open request is used.
    ///
    /// A reply that arrives after the deadline resolves the request as
    /// expired instead, so a late "yes" can never beat the timer.
    pub fn reply(&self, id: Option<RequestId>, verdict: Verdict) -> ReplyOutcome {
        let request = {
            let pending = self.lock_pending();
            match id {
                Some(id) => pending.get(&id).cloned(),
                None => pending
                    .values()
                    .find(|req| req.resolution().is_none())
                    .cloned(),
            }
        };

        let Some(request) = request else {
            return ReplyOutcome::NoSuchRequest(id);
        };

        let wanted = if Instant::now() >= request.deadline {
            Resolution::Expired
        } else {
            verdict.resolution()
        };

        if request.try_resolve(wanted) && wanted != Resolution::Expired {
            info!(request_id = %request.id, resolution = %wanted, "confirmation resolved by reply");
            return ReplyOutcome::Accepted {
                id: request.id,
                resolution: wanted,
                job: request.job.headline(),
            };
        }

        ReplyOutcome::AlreadyResolved {
            id: request.id,
            resolution: request.resolution().unwrap_or(Resolution::Expired),
        }
    }

    /// Wait until request `id` is resolved or its deadline passes, then
    /// close it. Returns `None` if no such request is open.
    pub async fn await_reply(&self, id: RequestId) -> Option<Resolution> {
        let request = self.lock_pending().get(&id).cloned()?;

        if request.resolution().is_none() {
            tokio::select! {
                _ = request.resolved.notified() => {}
                _ = sleep_until(request.deadline) => {
                    if request.try_resolve(Resolution::Expired) {
                        info!(request_id = %id, "confirmation expired");
                    }
                }
            }
        }

        self.lock_pending().remove(&id);
        // Both select arms leave the cell set; Expired covers the impossible case.
        Some(request.resolution().unwrap_or(Resolution::Expired))
    }

    /// Close request `id` before its deadline, expiring it unless a reply
    /// already resolved it. Returns the final resolution.
    pub fn withdraw(&self, id: RequestId) -> Option<Resolution> {
        let request = self.lock_pending().remove(&id)?;
        if request.try_resolve(Resolution::Expired) {
            info!(request_id = %id, "confirmation withdrawn");
        }
        Some(request.resolution().unwrap_or(Resolution::Expired))
    }

    /// Requests still waiting for a human.
    pub fn open_requests(&self) -> Vec<Arc<ConfirmationRequest>> {
        self.lock_pending()
            .values()
            .filter(|req| req.resolution().is_none())
            .cloned()
            .collect()
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, BTreeMap<RequestId, Arc<ConfirmationRequest>>> {
        // A poisoned map is still structurally valid; keep serving it.
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
