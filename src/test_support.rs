//! Hand-written collaborator doubles shared by the orchestrator and bot tests.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::collaborators::{
    ChatTransport, Collaborators, DocumentCustomizer, InboundMessage, JobSource, Ledger,
    Notifier, Submitter,
};
use crate::confirmation::Verdict;
use crate::error::{CustomizeError, LedgerError, NotifyError, SourceError, SubmitError};
use crate::ledger::MemoryLedger;
use crate::orchestrator::Orchestrator;
use crate::posting::{JobPosting, PostingKey};
use crate::state_machine::{ApplicationAttempt, ApplicationState, AttemptId, LedgerRecord};
use crate::subscribers::ChatId;

pub fn posting(n: usize) -> JobPosting {
    JobPosting {
        title: format!("Python Developer {n}"),
        company: format!("TechCorp {n}"),
        source: "feed".into(),
        url: format!("https://jobs.example/{n}"),
        description: "Build Django services".into(),
        location: Some("Cape Town".into()),
        contact: None,
    }
}

/// Returns scripted batches, then empty batches forever.
#[derive(Default)]
pub struct ScriptedSource {
    batches: Mutex<VecDeque<Result<Vec<JobPosting>, SourceError>>>,
    pub calls: AtomicU32,
}

impl ScriptedSource {
    pub fn new(batches: Vec<Result<Vec<JobPosting>, SourceError>>) -> Self {
        Self {
            batches: Mutex::new(batches.into()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobSource for ScriptedSource {
    async fn search(&self, _query: &str, _location: &str) -> Result<Vec<JobPosting>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.batches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Tags its output with the job title, or fails every call.
#[derive(Default)]
pub struct StubCustomizer {
    pub fail: bool,
    pub calls: AtomicU32,
}

impl StubCustomizer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: AtomicU32::new(0),
        }
    }

    fn answer(&self, text: String) -> Result<String, CustomizeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(CustomizeError::Unavailable("model offline".into()))
        } else {
            Ok(text)
        }
    }
}

#[async_trait]
impl DocumentCustomizer for StubCustomizer {
    async fn rewrite(&self, base_text: &str, context: &JobPosting) -> Result<String, CustomizeError> {
        self.answer(format!("{base_text} for {}", context.title))
    }

    async fn generate_cover(
        &self,
        job: &JobPosting,
        base_text: &str,
    ) -> Result<String, CustomizeError> {
        self.answer(format!("{base_text} to {}", job.company))
    }
}

/// Fails the first `failures` calls, then succeeds. Optionally blocks each
/// call until [`StubSubmitter::release`] is called.
#[derive(Default)]
pub struct StubSubmitter {
    failures: AtomicU32,
    gated: AtomicBool,
    pub entered: Notify,
    release: Notify,
    pub calls: AtomicU32,
    pub sent: Mutex<Vec<(String, String, String)>>,
}

impl StubSubmitter {
    pub fn failing(failures: u32) -> Self {
        Self {
            failures: AtomicU32::new(failures),
            ..Self::default()
        }
    }

    pub fn gated() -> Self {
        Self {
            gated: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub fn release(&self) {
        self.gated.store(false, Ordering::SeqCst);
        self.release.notify_waiters();
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Submitter for StubSubmitter {
    async fn submit(&self, job: &JobPosting, cv: &str, cover: &str) -> Result<(), SubmitError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        if self.gated.load(Ordering::SeqCst) {
            let released = self.release.notified();
            if self.gated.load(Ordering::SeqCst) {
                released.await;
            }
        }

        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(SubmitError::Unavailable("relay down".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((job.title.clone(), cv.to_string(), cover.to_string()));
        Ok(())
    }
}

/// Records broadcasts and direct replies.
#[derive(Default)]
pub struct RecordingNotifier {
    pub broadcasts: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.broadcasts.lock().unwrap().clone()
    }

    pub fn any_contains(&self, needle: &str) -> bool {
        self.messages().iter().any(|m| m.contains(needle))
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn broadcast(&self, _subscribers: &[ChatId], message: &str) -> Result<(), NotifyError> {
        self.broadcasts.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

/// Chat transport fed from a script; records replies.
#[derive(Default)]
pub struct ScriptedTransport {
    inbound: Mutex<VecDeque<InboundMessage>>,
    pub replies: Mutex<Vec<(ChatId, String)>>,
}

impl ScriptedTransport {
    pub fn new(messages: Vec<(i64, &str)>) -> Self {
        Self {
            inbound: Mutex::new(
                messages
                    .into_iter()
                    .map(|(chat, text)| InboundMessage {
                        chat: ChatId(chat),
                        text: text.to_string(),
                    })
                    .collect(),
            ),
            replies: Mutex::new(Vec::new()),
        }
    }

    pub fn replies(&self) -> Vec<(ChatId, String)> {
        self.replies.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn next_messages(&self) -> Result<Vec<InboundMessage>, NotifyError> {
        let next = self.inbound.lock().unwrap().pop_front();
        match next {
            Some(message) => Ok(vec![message]),
            None => {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(Vec::new())
            }
        }
    }

    async fn reply(&self, chat: ChatId, text: &str) -> Result<(), NotifyError> {
        self.replies.lock().unwrap().push((chat, text.to_string()));
        Ok(())
    }
}

/// In-memory ledger whose writes of one status can be made to fail.
#[derive(Default)]
pub struct FlakyLedger {
    inner: MemoryLedger,
    fault: Mutex<Option<(ApplicationState, u32)>>,
    pub failed_writes: AtomicU32,
}

impl FlakyLedger {
    /// Fail the next `times` writes of `status` with an IO error.
    pub fn fail_writes(&self, status: ApplicationState, times: u32) {
        *self.fault.lock().unwrap() = Some((status, times));
    }

    pub fn failed_writes(&self) -> u32 {
        self.failed_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Ledger for FlakyLedger {
    async fn record(
        &self,
        attempt: &ApplicationAttempt,
        status: ApplicationState,
    ) -> Result<LedgerRecord, LedgerError> {
        {
            let mut fault = self.fault.lock().unwrap();
            if let Some((failing, remaining)) = fault.as_mut() {
                if *failing == status && *remaining > 0 {
                    *remaining -= 1;
                    self.failed_writes.fetch_add(1, Ordering::SeqCst);
                    return Err(LedgerError::Io(std::io::Error::other("disk full")));
                }
            }
        }
        self.inner.record(attempt, status).await
    }

    async fn contains(&self, key: &PostingKey) -> Result<bool, LedgerError> {
        self.inner.contains(key).await
    }

    async fn get(&self, id: &AttemptId) -> Result<Option<LedgerRecord>, LedgerError> {
        self.inner.get(id).await
    }

    async fn mark_offer(&self, id: &AttemptId, note: &str) -> Result<LedgerRecord, LedgerError> {
        self.inner.mark_offer(id, note).await
    }

    async fn records(&self) -> Result<Vec<LedgerRecord>, LedgerError> {
        self.inner.records().await
    }
}

pub struct Harness {
    pub source: Arc<ScriptedSource>,
    pub customizer: Arc<StubCustomizer>,
    pub submitter: Arc<StubSubmitter>,
    pub notifier: Arc<RecordingNotifier>,
    pub ledger: Arc<FlakyLedger>,
}

impl Harness {
    pub fn new(source: ScriptedSource, customizer: StubCustomizer, submitter: StubSubmitter) -> Self {
        Self {
            source: Arc::new(source),
            customizer: Arc::new(customizer),
            submitter: Arc::new(submitter),
            notifier: Arc::new(RecordingNotifier::default()),
            ledger: Arc::new(FlakyLedger::default()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            source: self.source.clone(),
            customizer: self.customizer.clone(),
            submitter: self.submitter.clone(),
            notifier: self.notifier.clone(),
            ledger: self.ledger.clone(),
        }
    }
}

/// Answer every open confirmation request with `verdict`, forever.
pub fn auto_reply(orch: &Orchestrator, verdict: Verdict) -> tokio::task::JoinHandle<()> {
    let orch = orch.clone();
    tokio::spawn(async move {
        loop {
            for (id, _) in orch.pending_confirmations() {
                orch.reply(Some(id), verdict);
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
}

/// Poll `check` on a virtual-time tick until it holds.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..20_000 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition never became true");
}
