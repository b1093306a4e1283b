//! Narrow interfaces to the outside world. The orchestrator only ever talks
//! to these traits; concrete adapters live in their own modules.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::{CustomizeError, LedgerError, NotifyError, SourceError, SubmitError};
use crate::ledger::Stats;
use crate::posting::{JobPosting, PostingKey};
use crate::state_machine::{ApplicationAttempt, ApplicationState, AttemptId, LedgerRecord};
use crate::subscribers::ChatId;

/// Yields candidate postings for a query. Each call is one finite batch.
#[async_trait]
pub trait JobSource: Send + Sync {
    async fn search(&self, query: &str, location: &str) -> Result<Vec<JobPosting>, SourceError>;
}

/// Rewrites application documents for a specific job. Either returns the
/// full text or fails; no partial output.
#[async_trait]
pub trait DocumentCustomizer: Send + Sync {
    async fn rewrite(&self, base_text: &str, context: &JobPosting)
    -> Result<String, CustomizeError>;

    async fn generate_cover(
        &self,
        job: &JobPosting,
        base_text: &str,
    ) -> Result<String, CustomizeError>;
}

/// Delivers a finished application.
#[async_trait]
pub trait Submitter: Send + Sync {
    async fn submit(
        &self,
        job: &JobPosting,
        cv_text: &str,
        cover_text: &str,
    ) -> Result<(), SubmitError>;
}

/// Outbound alerts to chat subscribers.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn broadcast(&self, subscribers: &[ChatId], message: &str) -> Result<(), NotifyError>;
}

/// A text message received from a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub chat: ChatId,
    pub text: String,
}

/// Inbound side of the chat transport, consumed by the bot listener.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Wait for the next batch of messages. An empty batch is normal.
    async fn next_messages(&self) -> Result<Vec<InboundMessage>, NotifyError>;

    async fn reply(&self, chat: ChatId, text: &str) -> Result<(), NotifyError>;
}

/// Durable attempt store. One record per attempt id; writes upsert.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Store the attempt under `status`, replacing any earlier snapshot of
    /// the same attempt. A different attempt for an already-recorded posting
    /// is rejected.
    async fn record(
        &self,
        attempt: &ApplicationAttempt,
        status: ApplicationState,
    ) -> Result<LedgerRecord, LedgerError>;

    async fn contains(&self, key: &PostingKey) -> Result<bool, LedgerError>;

    async fn get(&self, id: &AttemptId) -> Result<Option<LedgerRecord>, LedgerError>;

    /// Flag a SUBMITTED attempt as having produced an offer.
    async fn mark_offer(&self, id: &AttemptId, note: &str) -> Result<LedgerRecord, LedgerError>;

    /// All records, oldest first.
    async fn records(&self) -> Result<Vec<LedgerRecord>, LedgerError>;

    async fn stats(&self) -> Result<Stats, LedgerError> {
        Ok(Stats::from_records(&self.records().await?))
    }

    /// Date of the most recent successful submission.
    async fn last_applied(&self) -> Result<Option<NaiveDate>, LedgerError> {
        Ok(self
            .records()
            .await?
            .iter()
            .filter_map(|r| r.applied_date)
            .max())
    }
}

/// The adapters an [`Orchestrator`](crate::orchestrator::Orchestrator) is built from.
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn JobSource>,
    pub customizer: Arc<dyn DocumentCustomizer>,
    pub submitter: Arc<dyn Submitter>,
    pub notifier: Arc<dyn Notifier>,
    pub ledger: Arc<dyn Ledger>,
}
