//! The confirmation-gated application pipeline and its control surface.
//!
//! One [`Orchestrator::run`] loop polls the job source, opens a confirmation
//! request per novel posting, and drives approved attempts through
//! customization and submission. The chat listener talks to the same
//! orchestrator through the control methods (`pause`, `reply`, `status`...);
//! the two sides share only the control watch channel, the subscriber set and
//! the confirmation gate.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::collaborators::Collaborators;
use crate::confirmation::{
    ConfirmationGate, DEFAULT_TIMEOUT, ReplyOutcome, RequestId, Resolution, Verdict,
};
use crate::error::{CustomizeError, LedgerError, OfferError, PilotError};
use crate::ledger::Stats;
use crate::messages;
use crate::posting::{JobPosting, PostingKey};
use crate::retry::{Retried, RetryPolicy};
use crate::state_machine::{
    ApplicationAttempt, ApplicationState, AttemptId, LedgerRecord, StateMachine,
    SubmissionOutcome,
};
use crate::subscribers::{ChatId, SubscriberSet};

/// Lifecycle of the pipeline loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ControlState {
    /// Constructed, waiting for `start`.
    Idle,
    Running,
    /// No new postings enter; in-flight attempts still finish.
    Paused,
    /// Terminal. The loop exits at its next suspension point.
    Stopped,
}

impl fmt::Display for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlState::Idle => write!(f, "Idle"),
            ControlState::Running => write!(f, "Active"),
            ControlState::Paused => write!(f, "Paused"),
            ControlState::Stopped => write!(f, "Stopped"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub query: String,
    pub location: String,
    /// Fixed delay between two polls of the job source.
    pub poll_interval: Duration,
    /// Pause between two postings of the same batch.
    pub posting_delay: Duration,
    pub confirmation_timeout: Duration,
    pub customize_retry: RetryPolicy,
    pub submit_retry: RetryPolicy,
    /// Bounds the writes after the first one; the first is retried by the
    /// next poll instead.
    pub ledger_retry: RetryPolicy,
    pub base_cv: String,
    pub base_cover: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            query: "Python Developer".into(),
            location: "Remote".into(),
            poll_interval: Duration::from_secs(15 * 60),
            posting_delay: Duration::from_secs(5),
            confirmation_timeout: DEFAULT_TIMEOUT,
            customize_retry: RetryPolicy::customization(),
            submit_retry: RetryPolicy::submission(),
            ledger_retry: RetryPolicy::ledger(),
            base_cv: String::new(),
            base_cover: String::new(),
        }
    }
}

/// Snapshot answered to `/status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub state: ControlState,
    pub query: String,
    pub location: String,
    pub last_job: Option<String>,
    pub next_poll: Option<DateTime<Utc>>,
    pub awaiting_confirmation: usize,
    pub subscribers: usize,
    pub last_applied: Option<NaiveDate>,
}

#[derive(Debug, Default)]
struct Progress {
    last_job: Option<String>,
    next_poll: Option<DateTime<Utc>>,
}

struct Inner {
    settings: PipelineSettings,
    collab: Collaborators,
    gate: ConfirmationGate,
    subscribers: SubscriberSet,
    control: watch::Sender<ControlState>,
    progress: Mutex<Progress>,
}

/// Cheap to clone; all clones drive the same pipeline.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(
        settings: PipelineSettings,
        collab: Collaborators,
        subscribers: impl IntoIterator<Item = ChatId>,
    ) -> Self {
        let (control, _) = watch::channel(ControlState::Idle);
        let gate = ConfirmationGate::new(settings.confirmation_timeout);
        Self {
            inner: Arc::new(Inner {
                settings,
                collab,
                gate,
                subscribers: SubscriberSet::new(subscribers),
                control,
                progress: Mutex::new(Progress::default()),
            }),
        }
    }

    // --- control surface ---

    /// Open intake. Returns `false` if already running or stopped.
    pub fn start(&self) -> bool {
        self.change_control(
            |state| matches!(state, ControlState::Idle | ControlState::Paused),
            ControlState::Running,
        )
    }

    /// Close intake without aborting the attempt in flight.
    pub fn pause(&self) -> bool {
        self.change_control(
            |state| matches!(state, ControlState::Idle | ControlState::Running),
            ControlState::Paused,
        )
    }

    pub fn resume(&self) -> bool {
        self.start()
    }

    pub fn stop(&self) {
        self.inner.control.send_replace(ControlState::Stopped);
        info!("pipeline stop requested");
    }

    pub fn control_state(&self) -> ControlState {
        *self.inner.control.borrow()
    }

    fn change_control(&self, allowed: impl Fn(ControlState) -> bool, next: ControlState) -> bool {
        let changed = self.inner.control.send_if_modified(|state| {
            if *state != next && allowed(*state) {
                *state = next;
                true
            } else {
                false
            }
        });
        if changed {
            info!(state = %next, "control state changed");
        }
        changed
    }

    pub async fn status(&self) -> StatusReport {
        let last_applied = match self.inner.collab.ledger.last_applied().await {
            Ok(day) => day,
            Err(err) => {
                warn!(error = %err, "ledger unavailable for status");
                None
            }
        };
        let progress = self.lock_progress();
        StatusReport {
            state: self.control_state(),
            query: self.inner.settings.query.clone(),
            location: self.inner.settings.location.clone(),
            last_job: progress.last_job.clone(),
            next_poll: progress.next_poll,
            awaiting_confirmation: self.inner.gate.open_requests().len(),
            subscribers: self.inner.subscribers.len(),
            last_applied,
        }
    }

    pub async fn stats(&self) -> Result<Stats, LedgerError> {
        self.inner.collab.ledger.stats().await
    }

    /// Resolve a confirmation request on behalf of a human.
    pub fn reply(&self, id: Option<RequestId>, verdict: Verdict) -> ReplyOutcome {
        self.inner.gate.reply(id, verdict)
    }

    /// Open confirmation requests as `(id, "Title at Company")`.
    pub fn pending_confirmations(&self) -> Vec<(RequestId, String)> {
        self.inner
            .gate
            .open_requests()
            .iter()
            .map(|req| (req.id, req.job.headline()))
            .collect()
    }

    pub fn subscribe(&self, chat: ChatId) -> bool {
        self.inner.subscribers.subscribe(chat)
    }

    pub fn unsubscribe(&self, chat: ChatId) -> bool {
        self.inner.subscribers.unsubscribe(chat)
    }

    pub fn is_subscribed(&self, chat: ChatId) -> bool {
        self.inner.subscribers.contains(chat)
    }

    pub fn base_cv(&self) -> &str {
        &self.inner.settings.base_cv
    }

    /// Record an offer for a submitted attempt, congratulate every
    /// subscriber and pause intake until resumed.
    pub async fn report_offer(&self, id: &AttemptId, note: &str) -> Result<LedgerRecord, OfferError> {
        let ledger = &self.inner.collab.ledger;
        match ledger.get(id).await? {
            None => return Err(OfferError::UnknownAttempt(id.to_string())),
            Some(record) if record.status != ApplicationState::Submitted => {
                return Err(OfferError::NotSubmitted {
                    id: id.to_string(),
                    status: record.status.to_string(),
                });
            }
            Some(_) => {}
        }
        let record = ledger.mark_offer(id, note).await?;
        info!(attempt_id = %id, company = %record.company, "offer recorded, pausing intake");
        self.pause();
        self.broadcast(&messages::offer(&record)).await;
        Ok(record)
    }

    // --- pipeline loop ---

    pub fn spawn(&self) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move { this.run().await })
    }

    /// Resolves once `stop` has been called.
    pub async fn wait_stopped(&self) {
        let mut control = self.inner.control.subscribe();
        loop {
            if *control.borrow_and_update() == ControlState::Stopped {
                return;
            }
            if control.changed().await.is_err() {
                return;
            }
        }
    }

    /// Poll, confirm, customize, submit; until stopped.
    pub async fn run(&self) {
        let mut control = self.inner.control.subscribe();
        let mut seen = HashSet::new();
        let settings = &self.inner.settings;
        info!(query = %settings.query, location = %settings.location, "pipeline loop started");

        'poll: while self.wait_for_intake(&mut control).await {
            let batch = self.poll_once(&mut seen).await;

            for (n, job) in batch.into_iter().enumerate() {
                if n > 0 && !self.idle(&mut control, settings.posting_delay).await {
                    break 'poll;
                }
                if !self.wait_for_intake(&mut control).await {
                    break 'poll;
                }
                let key = job.key();
                match self.process_posting(job).await {
                    Ok(state) => debug!(job = %key, %state, "posting finished"),
                    Err(PilotError::Ledger(err)) if !err.is_duplicate() => {
                        // Nothing was recorded; offer it again on the next poll.
                        seen.remove(&key);
                        warn!(job = %key, error = %err, "could not record posting, will retry");
                    }
                    Err(err) => error!(job = %key, error = %err, "posting abandoned"),
                }
            }

            if !self.idle_between_polls(&mut control).await {
                break;
            }
        }

        info!("pipeline loop stopped");
    }

    /// Block while idle or paused. `false` means stopped.
    async fn wait_for_intake(&self, control: &mut watch::Receiver<ControlState>) -> bool {
        loop {
            let state = *control.borrow_and_update();
            match state {
                ControlState::Running => return true,
                ControlState::Stopped => return false,
                ControlState::Idle | ControlState::Paused => {
                    debug!(%state, "intake closed, waiting");
                }
            }
            if control.changed().await.is_err() {
                return false;
            }
        }
    }

    /// Sleep for `duration` unless stopped first. `false` means stopped.
    async fn idle(&self, control: &mut watch::Receiver<ControlState>, duration: Duration) -> bool {
        let sleep = tokio::time::sleep(duration);
        tokio::pin!(sleep);
        loop {
            if *control.borrow_and_update() == ControlState::Stopped {
                return false;
            }
            tokio::select! {
                _ = &mut sleep => return true,
                changed = control.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
            }
        }
    }

    async fn idle_between_polls(&self, control: &mut watch::Receiver<ControlState>) -> bool {
        let interval = self.inner.settings.poll_interval;
        self.lock_progress().next_poll = chrono::Duration::from_std(interval)
            .ok()
            .map(|d| Utc::now() + d);
        let keep_going = self.idle(control, interval).await;
        self.lock_progress().next_poll = None;
        keep_going
    }

    /// Fetch one batch and keep only postings never seen in this run nor
    /// recorded in the ledger. A failed fetch is an empty batch.
    async fn poll_once(&self, seen: &mut HashSet<PostingKey>) -> Vec<JobPosting> {
        let settings = &self.inner.settings;
        let postings = match self
            .inner
            .collab
            .source
            .search(&settings.query, &settings.location)
            .await
        {
            Ok(postings) => postings,
            Err(err) => {
                warn!(error = %err, "job search failed, treating as empty batch");
                return Vec::new();
            }
        };

        let found = postings.len();
        let mut fresh = Vec::new();
        for job in postings {
            let key = job.key();
            if !seen.insert(key.clone()) {
                continue;
            }
            match self.inner.collab.ledger.contains(&key).await {
                Ok(false) => fresh.push(job),
                Ok(true) => debug!(job = %key, "already in ledger, skipping"),
                Err(err) => {
                    // Retry the lookup on the next poll.
                    seen.remove(&key);
                    warn!(job = %key, error = %err, "ledger lookup failed, skipping posting");
                }
            }
        }

        info!(found, fresh = fresh.len(), "job search completed");
        fresh
    }

    async fn process_posting(&self, job: JobPosting) -> Result<ApplicationState, PilotError> {
        let mut attempt = ApplicationAttempt::new(job);
        self.lock_progress().last_job = Some(attempt.job.headline());

        // CONFIRM: persist first so a ledger-level duplicate never reaches a human
        StateMachine::advance(&mut attempt, ApplicationState::AwaitingConfirmation)?;
        self.inner.collab.ledger.record(&attempt, attempt.state).await?;

        let request = self.inner.gate.open(attempt.job.clone());
        let request_id = request.id;
        drop(request);
        info!(
            attempt_id = %attempt.id,
            request_id = %request_id,
            title = %attempt.job.title,
            company = %attempt.job.company,
            "awaiting confirmation"
        );
        self.broadcast(&messages::new_job(
            request_id,
            &attempt.job,
            self.inner.gate.timeout(),
        ))
        .await;

        // A stop withdraws the request; a reply that already won still counts.
        let resolution = tokio::select! {
            resolution = self.inner.gate.await_reply(request_id) => resolution,
            _ = self.wait_stopped() => self.inner.gate.withdraw(request_id),
        };
        let resolution = resolution.unwrap_or(Resolution::Expired);
        StateMachine::advance(&mut attempt, resolution.state())?;
        self.persist(&attempt).await;

        match resolution {
            Resolution::Approved => {}
            Resolution::Declined => {
                info!(attempt_id = %attempt.id, "application declined");
                return Ok(attempt.state);
            }
            Resolution::Expired => {
                info!(attempt_id = %attempt.id, "confirmation expired, skipping");
                self.broadcast(&messages::expired(request_id, &attempt.job))
                    .await;
                return Ok(attempt.state);
            }
        }

        // CUSTOMIZE: failures degrade to the base documents
        StateMachine::advance(&mut attempt, ApplicationState::Customizing)?;
        self.persist(&attempt).await;
        self.customize(&mut attempt).await;

        // SUBMIT
        StateMachine::advance(&mut attempt, ApplicationState::Submitting)?;
        self.persist(&attempt).await;
        let outcome = self.submit(&mut attempt).await;
        StateMachine::advance(&mut attempt, outcome)?;
        self.persist(&attempt).await;

        self.broadcast(&messages::application_result(
            &attempt.job,
            outcome == ApplicationState::Submitted,
        ))
        .await;
        Ok(attempt.state)
    }

    async fn customize(&self, attempt: &mut ApplicationAttempt) {
        let settings = &self.inner.settings;
        let customizer = self.inner.collab.customizer.as_ref();
        let job = &attempt.job;
        let base_cv = settings.base_cv.as_str();
        let base_cover = settings.base_cover.as_str();

        let cv = settings
            .customize_retry
            .run("CV customization", move |_| customizer.rewrite(base_cv, job))
            .await;
        let cover = settings
            .customize_retry
            .run("cover letter generation", move |_| {
                customizer.generate_cover(job, base_cover)
            })
            .await;

        let notes = [
            fallback_note("CV customization", &cv),
            fallback_note("cover letter generation", &cover),
        ];
        let (cv_text, cv_fallback) = cv.or_fallback(|| base_cv.to_string());
        let (cover_text, cover_fallback) = cover.or_fallback(|| base_cover.to_string());

        for note in notes.into_iter().flatten() {
            warn!(attempt_id = %attempt.id, "{note}");
            attempt.note(note);
        }
        attempt.cv_text = Some(cv_text);
        attempt.cover_text = Some(cover_text);
        attempt.cv_fallback = cv_fallback;
        attempt.cover_fallback = cover_fallback;
    }

    /// Deliver the application; returns the terminal state to move to.
    async fn submit(&self, attempt: &mut ApplicationAttempt) -> ApplicationState {
        let settings = &self.inner.settings;
        let submitter = self.inner.collab.submitter.as_ref();
        let job = &attempt.job;
        let cv = attempt.cv_text.as_deref().unwrap_or(&settings.base_cv);
        let cover = attempt.cover_text.as_deref().unwrap_or(&settings.base_cover);

        let submitted = settings
            .submit_retry
            .run("submission", move |n| {
                debug!(try_number = n, "submitting application");
                submitter.submit(job, cv, cover)
            })
            .await;

        attempt.submit_attempts = submitted.attempts;
        match submitted.result {
            Ok(()) => {
                info!(
                    attempt_id = %attempt.id,
                    company = %attempt.job.company,
                    attempts = submitted.attempts,
                    "application submitted"
                );
                attempt.outcome = Some(SubmissionOutcome::Delivered);
                ApplicationState::Submitted
            }
            Err(err) => {
                let reason = err.to_string();
                error!(
                    attempt_id = %attempt.id,
                    company = %attempt.job.company,
                    attempts = submitted.attempts,
                    error = %reason,
                    "application could not be submitted"
                );
                attempt.note(format!(
                    "submission failed after {} attempts: {reason}",
                    submitted.attempts
                ));
                attempt.outcome = Some(SubmissionOutcome::Failed(reason));
                ApplicationState::SubmitFailed
            }
        }
    }

    /// Record the attempt's current state, retrying within `ledger_retry`.
    /// Subscribers hear about a write that never lands.
    async fn persist(&self, attempt: &ApplicationAttempt) {
        let ledger = self.inner.collab.ledger.as_ref();
        let written = self
            .inner
            .settings
            .ledger_retry
            .run("ledger write", move |_| ledger.record(attempt, attempt.state))
            .await;
        if let Err(err) = written.result {
            error!(
                attempt_id = %attempt.id,
                state = %attempt.state,
                attempts = written.attempts,
                error = %err,
                "ledger write failed"
            );
            self.broadcast(&messages::ledger_write_failed(&attempt.job, attempt.state))
                .await;
        }
    }

    async fn broadcast(&self, message: &str) {
        let subscribers = self.inner.subscribers.snapshot();
        if let Err(err) = self
            .inner
            .collab
            .notifier
            .broadcast(&subscribers, message)
            .await
        {
            warn!(error = %err, "broadcast failed");
        }
    }

    fn lock_progress(&self) -> MutexGuard<'_, Progress> {
        self.inner
            .progress
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn fallback_note(label: &str, retried: &Retried<String, CustomizeError>) -> Option<String> {
    retried.result.as_ref().err().map(|err| {
        format!(
            "{label} failed after {} attempts ({err}); base document used",
            retried.attempts
        )
    })
}
