use thiserror::Error;

pub use crate::anthropic::AnthropicError;
use crate::state_machine::TransitionError;

#[derive(Debug, Error)]
pub enum PilotError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Missing required configuration: {}", .0.join(", "))]
    MissingCredentials(Vec<&'static str>),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("State machine error: {0}")]
    Transition(#[from] TransitionError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    #[error("Anthropic API error: {0}")]
    Anthropic(#[from] AnthropicError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Telemetry error: {0}")]
    Telemetry(String),
}

/// Failure to fetch a batch of postings. Always isolated to a single poll.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("job feed request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("job feed returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("job feed is not configured")]
    NotConfigured,
}

/// Transient failure of a document rewrite. Retried, then replaced by the base text.
#[derive(Debug, Error)]
pub enum CustomizeError {
    #[error("model call failed: {0}")]
    Model(#[from] AnthropicError),

    #[error("model returned no text")]
    EmptyOutput,

    #[error("customizer unavailable: {0}")]
    Unavailable(String),
}

/// Transient failure of an application delivery.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("mail transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("mail relay rejected the message (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("submitter unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("chat transport failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("chat API error: {0}")]
    Api(String),

    #[error("delivered to {delivered} of {total} subscribers")]
    Partial { delivered: usize, total: usize },
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ledger serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ledger line {line} is corrupt: {source}")]
    Corrupt {
        line: usize,
        source: serde_json::Error,
    },

    #[error("posting already recorded as attempt {existing}")]
    DuplicatePosting { existing: String },

    #[error("attempt not found: {0}")]
    NotFound(String),

    #[error("attempt {id} is {status}; offers are only accepted for SUBMITTED attempts")]
    NotSubmitted { id: String, status: String },
}

impl LedgerError {
    /// The posting is already recorded; writing it again will never succeed.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, LedgerError::DuplicatePosting { .. })
    }
}

/// Rejection of an offer report.
#[derive(Debug, Error)]
pub enum OfferError {
    #[error("no attempt with id {0}")]
    UnknownAttempt(String),

    #[error("attempt {id} is {status}; only SUBMITTED attempts can receive offers")]
    NotSubmitted { id: String, status: String },

    #[error(transparent)]
    Ledger(LedgerError),
}

impl From<LedgerError> for OfferError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(id) => OfferError::UnknownAttempt(id),
            LedgerError::NotSubmitted { id, status } => OfferError::NotSubmitted { id, status },
            other => OfferError::Ledger(other),
        }
    }
}
