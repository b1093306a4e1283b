//! Attempt ledger: the single source of truth for durable attempt state.
//!
//! [`JsonLedger`] appends one JSON object per write to a `.jsonl` file and
//! folds the file by attempt id on open (last line wins). [`MemoryLedger`]
//! keeps the same index without a file. Both serialize writes behind one
//! async mutex, so no two writers touch the same attempt concurrently.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::collaborators::Ledger;
use crate::error::LedgerError;
use crate::posting::PostingKey;
use crate::state_machine::{ApplicationAttempt, ApplicationState, AttemptId, LedgerRecord};

/// Aggregate counts over the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub pending: usize,
    pub offers: usize,
    pub last_application: Option<DateTime<Utc>>,
}

impl Stats {
    /// EXPIRED and DECLINED count toward `total` only.
    pub fn from_records(records: &[LedgerRecord]) -> Self {
        let mut stats = Stats {
            total: records.len(),
            ..Stats::default()
        };

        for record in records {
            match record.status {
                ApplicationState::Submitted => stats.successful += 1,
                ApplicationState::SubmitFailed => stats.failed += 1,
                status if status.is_pending() => stats.pending += 1,
                _ => {}
            }
            if record.offer {
                stats.offers += 1;
            }
        }

        stats.last_application = records.iter().map(|r| r.discovered_at).max();
        stats
    }
}

#[derive(Debug, Default)]
struct RecordIndex {
    records: HashMap<AttemptId, LedgerRecord>,
    keys: HashMap<PostingKey, AttemptId>,
    order: Vec<AttemptId>,
}

impl RecordIndex {
    /// Insert or replace without dedup checks; used when replaying a file.
    fn restore(&mut self, record: LedgerRecord) {
        self.keys.insert(record.key(), record.id.clone());
        if !self.records.contains_key(&record.id) {
            self.order.push(record.id.clone());
        }
        self.records.insert(record.id.clone(), record);
    }

    fn upsert(&mut self, mut record: LedgerRecord) -> Result<LedgerRecord, LedgerError> {
        match self.records.get(&record.id) {
            Some(existing) => {
                record.offer = existing.offer;
                record.response = existing.response.clone();
            }
            None => {
                if let Some(existing) = self.keys.get(&record.key()) {
                    return Err(LedgerError::DuplicatePosting {
                        existing: existing.to_string(),
                    });
                }
            }
        }
        self.restore(record.clone());
        Ok(record)
    }

    fn mark_offer(&mut self, id: &AttemptId, note: &str) -> Result<LedgerRecord, LedgerError> {
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;

        if record.status != ApplicationState::Submitted {
            return Err(LedgerError::NotSubmitted {
                id: id.to_string(),
                status: record.status.to_string(),
            });
        }

        record.offer = true;
        let note = note.trim();
        if !note.is_empty() {
            record.response = Some(note.to_string());
        }
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    fn all(&self) -> Vec<LedgerRecord> {
        self.order
            .iter()
            .filter_map(|id| self.records.get(id).cloned())
            .collect()
    }
}

/// Ledger kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    index: Mutex<RecordIndex>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn record(
        &self,
        attempt: &ApplicationAttempt,
        status: ApplicationState,
    ) -> Result<LedgerRecord, LedgerError> {
        self.index
            .lock()
            .await
            .upsert(LedgerRecord::from_attempt(attempt, status))
    }

    async fn contains(&self, key: &PostingKey) -> Result<bool, LedgerError> {
        Ok(self.index.lock().await.keys.contains_key(key))
    }

    async fn get(&self, id: &AttemptId) -> Result<Option<LedgerRecord>, LedgerError> {
        Ok(self.index.lock().await.records.get(id).cloned())
    }

    async fn mark_offer(&self, id: &AttemptId, note: &str) -> Result<LedgerRecord, LedgerError> {
        self.index.lock().await.mark_offer(id, note)
    }

    async fn records(&self) -> Result<Vec<LedgerRecord>, LedgerError> {
        Ok(self.index.lock().await.all())
    }
}

/// Ledger persisted as JSON lines.
#[derive(Debug)]
pub struct JsonLedger {
    path: PathBuf,
    index: Mutex<RecordIndex>,
}

impl JsonLedger {
    /// Open (or lazily create) the ledger file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        let mut index = RecordIndex::default();

        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                for (n, line) in contents.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let record: LedgerRecord = serde_json::from_str(line)
                        .map_err(|source| LedgerError::Corrupt { line: n + 1, source })?;
                    index.restore(record);
                }
                info!(path = %path.display(), records = index.records.len(), "ledger loaded");
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "ledger file not found, starting empty");
            }
            Err(err) => return Err(err.into()),
        }

        Ok(Self {
            path,
            index: Mutex::new(index),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, record: &LedgerRecord) -> Result<(), LedgerError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl Ledger for JsonLedger {
    async fn record(
        &self,
        attempt: &ApplicationAttempt,
        status: ApplicationState,
    ) -> Result<LedgerRecord, LedgerError> {
        let mut index = self.index.lock().await;
        let stored = index.upsert(LedgerRecord::from_attempt(attempt, status))?;
        self.append(&stored).await?;
        Ok(stored)
    }

    async fn contains(&self, key: &PostingKey) -> Result<bool, LedgerError> {
        Ok(self.index.lock().await.keys.contains_key(key))
    }

    async fn get(&self, id: &AttemptId) -> Result<Option<LedgerRecord>, LedgerError> {
        Ok(self.index.lock().await.records.get(id).cloned())
    }

    async fn mark_offer(&self, id: &AttemptId, note: &str) -> Result<LedgerRecord, LedgerError> {
        let mut index = self.index.lock().await;
        let updated = index.mark_offer(id, note)?;
        self.append(&updated).await?;
        Ok(updated)
    }

    async fn records(&self) -> Result<Vec<LedgerRecord>, LedgerError> {
        Ok(self.index.lock().await.all())
    }
}
