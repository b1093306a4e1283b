use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::ApplicationState;
use crate::posting::{JobPosting, PostingKey};

/// Short, human-typeable attempt identifier (used by `/offer <id>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptId(pub String);

impl AttemptId {
    pub fn generate() -> Self {
        let simple = Uuid::new_v4().simple().to_string();
        Self(simple[..8].to_string())
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the submission step ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionOutcome {
    Delivered,
    Failed(String),
}

/// One application the orchestrator decided to act on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationAttempt {
    pub id: AttemptId,
    pub job: JobPosting,
    pub state: ApplicationState,
    pub state_history: Vec<ApplicationState>,
    pub cv_text: Option<String>,
    pub cover_text: Option<String>,
    pub cv_fallback: bool,
    pub cover_fallback: bool,
    pub submit_attempts: u32,
    pub outcome: Option<SubmissionOutcome>,
    pub notes: Vec<String>,
    pub discovered_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    /// Set only when the attempt reaches SUBMITTED.
    pub submitted_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl ApplicationAttempt {
    pub fn new(job: JobPosting) -> Self {
        let now = Utc::now();
        Self {
            id: AttemptId::generate(),
            job,
            state: ApplicationState::Discovered,
            state_history: Vec::new(),
            cv_text: None,
            cover_text: None,
            cv_fallback: false,
            cover_fallback: false,
            submit_attempts: 0,
            outcome: None,
            notes: Vec::new(),
            discovered_at: now,
            decided_at: None,
            submitted_at: None,
            updated_at: now,
        }
    }

    pub fn note(&mut self, text: impl Into<String>) {
        self.notes.push(text.into());
    }
}

/// Durable copy of an attempt, as stored by a [`Ledger`](crate::collaborators::Ledger).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub id: AttemptId,
    pub title: String,
    pub company: String,
    pub source: String,
    pub url: String,
    pub status: ApplicationState,
    pub state_transitions: Vec<ApplicationState>,
    pub applied_date: Option<NaiveDate>,
    pub submit_attempts: u32,
    #[serde(default)]
    pub notes: Vec<String>,
    /// Free-text response from the employer (offer notes and the like).
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub offer: bool,
    pub discovered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerRecord {
    /// Snapshot an attempt under the given status.
    pub fn from_attempt(attempt: &ApplicationAttempt, status: ApplicationState) -> Self {
        let mut transitions = attempt.state_history.clone();
        transitions.push(attempt.state);
        let key = attempt.job.key();

        Self {
            id: attempt.id.clone(),
            title: key.title,
            company: key.company,
            source: key.source,
            url: key.url,
            status,
            state_transitions: transitions,
            applied_date: match status {
                ApplicationState::Submitted => attempt.submitted_at.map(|at| at.date_naive()),
                _ => None,
            },
            submit_attempts: attempt.submit_attempts,
            notes: attempt.notes.clone(),
            response: None,
            offer: false,
            discovered_at: attempt.discovered_at,
            updated_at: attempt.updated_at,
        }
    }

    pub fn key(&self) -> PostingKey {
        PostingKey {
            title: self.title.clone(),
            company: self.company.clone(),
            source: self.source.clone(),
            url: self.url.clone(),
        }
    }

    pub fn headline(&self) -> String {
        format!("{} at {}", self.title, self.company)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::StateMachine;

    fn job() -> JobPosting {
        JobPosting {
            title: "Data Engineer".into(),
            company: "Initech".into(),
            source: "feed".into(),
            url: "https://jobs.example/7".into(),
            description: "Pipelines".into(),
            location: Some("Johannesburg".into()),
            contact: None,
        }
    }

    #[test]
    fn attempt_creation_defaults() {
        let attempt = ApplicationAttempt::new(job());
        assert_eq!(attempt.state, ApplicationState::Discovered);
        assert_eq!(attempt.submit_attempts, 0);
        assert_eq!(attempt.id.0.len(), 8);
        assert!(attempt.state_history.is_empty());
        assert!(attempt.decided_at.is_none());
    }

    #[test]
    fn attempt_ids_are_unique() {
        let a = ApplicationAttempt::new(job());
        let b = ApplicationAttempt::new(job());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn record_from_submitted_attempt_carries_applied_date() {
        let mut attempt = ApplicationAttempt::new(job());
        for next in [
            ApplicationState::AwaitingConfirmation,
            ApplicationState::Approved,
            ApplicationState::Customizing,
            ApplicationState::Submitting,
            ApplicationState::Submitted,
        ] {
            StateMachine::advance(&mut attempt, next).unwrap();
        }
        attempt.submit_attempts = 2;

        let record = LedgerRecord::from_attempt(&attempt, attempt.state);
        assert_eq!(record.status, ApplicationState::Submitted);
        assert_eq!(record.submit_attempts, 2);
        assert!(record.applied_date.is_some());
        assert_eq!(record.state_transitions.len(), 6);
        assert_eq!(record.key(), attempt.job.key());
        assert!(!record.offer);
    }

    #[test]
    fn record_from_expired_attempt_has_no_applied_date() {
        let mut attempt = ApplicationAttempt::new(job());
        StateMachine::advance(&mut attempt, ApplicationState::AwaitingConfirmation).unwrap();
        StateMachine::advance(&mut attempt, ApplicationState::Expired).unwrap();

        let record = LedgerRecord::from_attempt(&attempt, attempt.state);
        assert_eq!(record.status, ApplicationState::Expired);
        assert!(record.applied_date.is_none());
        assert_eq!(record.headline(), "Data Engineer at Initech");
    }
}
