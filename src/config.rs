//! jobpilot configuration loaded from `jobpilot.toml`.
//!
//! [`PilotConfig`] holds every tunable, grouped by section. Values missing
//! from the file fall back to defaults. Credentials preferably come from
//! the environment (or a `.env` file), which takes precedence over the
//! file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::PilotError;
use crate::orchestrator::PipelineSettings;
use crate::retry::RetryPolicy;
use crate::subscribers::ChatId;

/// File looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "jobpilot.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PilotConfig {
    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub confirmation: ConfirmationConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub documents: DocumentsConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub mail: MailConfig,

    #[serde(default)]
    pub anthropic: AnthropicConfig,

    /// Default log filter (`EnvFilter` syntax), used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Job search.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_query")]
    pub query: String,

    #[serde(default = "default_location")]
    pub location: String,

    /// URL of the JSON job feed.
    #[serde(default)]
    pub feed_url: String,

    /// Source name stamped on postings that carry none.
    #[serde(default = "default_source_name")]
    pub source_name: String,

    #[serde(default = "default_max_jobs")]
    pub max_jobs: usize,

    /// Fixed interval between searches, in seconds.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Pause between two postings of the same batch, in seconds.
    #[serde(default = "default_posting_delay_secs")]
    pub posting_delay_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmationConfig {
    /// Time a human has to answer, in seconds.
    #[serde(default = "default_confirmation_timeout_secs")]
    pub timeout_secs: u64,
}

/// Retry policy for the customization and submission steps.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_attempts")]
    pub customize_attempts: u32,

    #[serde(default = "default_customize_backoff_ms")]
    pub customize_backoff_ms: u64,

    #[serde(default = "default_attempts")]
    pub submit_attempts: u32,

    #[serde(default = "default_submit_backoff_ms")]
    pub submit_backoff_ms: u64,
}

/// Base documents, also used when customization fails.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentsConfig {
    #[serde(default = "default_base_cv")]
    pub base_cv: PathBuf,

    #[serde(default = "default_base_cover")]
    pub base_cover: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub token: String,

    /// First subscriber to alerts.
    #[serde(default)]
    pub chat_id: Option<i64>,

    /// `getUpdates` long-polling timeout, in seconds.
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    /// HTTP endpoint of the mail relay.
    #[serde(default)]
    pub relay_url: String,

    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub password: String,

    /// Recipient when the posting names no contact.
    #[serde(default = "default_recipient")]
    pub default_recipient: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicConfig {
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

// Field defaults.

fn default_log_level() -> String {
    "info".to_string()
}

fn default_query() -> String {
    "Python Developer".to_string()
}

fn default_location() -> String {
    "Remote".to_string()
}

fn default_source_name() -> String {
    "jobfeed".to_string()
}

fn default_max_jobs() -> usize {
    20
}

fn default_poll_interval_secs() -> u64 {
    15 * 60
}

fn default_posting_delay_secs() -> u64 {
    5
}

fn default_confirmation_timeout_secs() -> u64 {
    5 * 60
}

fn default_attempts() -> u32 {
    3
}

fn default_customize_backoff_ms() -> u64 {
    2_000
}

fn default_submit_backoff_ms() -> u64 {
    5_000
}

fn default_base_cv() -> PathBuf {
    PathBuf::from("base_cv.txt")
}

fn default_base_cover() -> PathBuf {
    PathBuf::from("cover_template.txt")
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("jobs.jsonl")
}

fn default_poll_timeout_secs() -> u64 {
    30
}

fn default_recipient() -> String {
    "hiring@company.com".to_string()
}

fn default_model() -> String {
    "claude-haiku-4-5-20251001".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            query: default_query(),
            location: default_location(),
            feed_url: String::new(),
            source_name: default_source_name(),
            max_jobs: default_max_jobs(),
            poll_interval_secs: default_poll_interval_secs(),
            posting_delay_secs: default_posting_delay_secs(),
        }
    }
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_confirmation_timeout_secs(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            customize_attempts: default_attempts(),
            customize_backoff_ms: default_customize_backoff_ms(),
            submit_attempts: default_attempts(),
            submit_backoff_ms: default_submit_backoff_ms(),
        }
    }
}

impl RetryConfig {
    pub fn customization(&self) -> RetryPolicy {
        RetryPolicy::new(self.customize_attempts, self.customize_backoff_ms)
    }

    pub fn submission(&self) -> RetryPolicy {
        RetryPolicy::new(self.submit_attempts, self.submit_backoff_ms)
    }
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            base_cv: default_base_cv(),
            base_cover: default_base_cover(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            chat_id: None,
            poll_timeout_secs: default_poll_timeout_secs(),
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            relay_url: String::new(),
            user: String::new(),
            password: String::new(),
            default_recipient: default_recipient(),
        }
    }
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            search: SearchConfig::default(),
            confirmation: ConfirmationConfig::default(),
            retry: RetryConfig::default(),
            documents: DocumentsConfig::default(),
            ledger: LedgerConfig::default(),
            telegram: TelegramConfig::default(),
            mail: MailConfig::default(),
            anthropic: AnthropicConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl PilotConfig {
    /// Load `.env` (if present), then the config file, then apply the
    /// environment overrides.
    ///
    /// Without `path`, reads `jobpilot.toml` from the working directory or
    /// uses the defaults if it is absent. An explicit `path` must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, PilotError> {
        dotenvy::dotenv().ok();

        let mut config = match path {
            Some(path) if !path.exists() => {
                return Err(PilotError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            Some(path) => Self::from_file(path)?,
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::from_file(path)?
                } else {
                    debug!("no {DEFAULT_CONFIG_FILE} found, using defaults");
                    Self::default()
                }
            }
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, PilotError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str::<PilotConfig>(&contents)?)
    }

    /// Override credentials and log level from the environment.
    /// Empty variables are ignored.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), PilotError> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(token) = var("TELEGRAM_TOKEN") {
            self.telegram.token = token;
        }
        if let Some(chat) = var("TELEGRAM_CHAT_ID") {
            let id = chat.trim().parse::<i64>().map_err(|_| {
                PilotError::Config(format!("TELEGRAM_CHAT_ID is not a chat id: {chat}"))
            })?;
            self.telegram.chat_id = Some(id);
        }
        if let Some(user) = var("EMAIL_USER") {
            self.mail.user = user;
        }
        if let Some(password) = var("EMAIL_PASS") {
            self.mail.password = password;
        }
        if let Some(key) = var("ANTHROPIC_API_KEY") {
            self.anthropic.api_key = key;
        }
        if let Some(level) = var("JOBPILOT_LOG") {
            self.log_level = level;
        }
        Ok(())
    }

    /// Report every required credential missing for `jobpilot run`.
    pub fn validate_for_run(&self) -> Result<(), PilotError> {
        let mut missing = Vec::new();
        if self.telegram.token.trim().is_empty() {
            missing.push("TELEGRAM_TOKEN");
        }
        if self.telegram.chat_id.is_none() {
            missing.push("TELEGRAM_CHAT_ID");
        }
        if self.mail.user.trim().is_empty() {
            missing.push("EMAIL_USER");
        }
        if self.mail.password.is_empty() {
            missing.push("EMAIL_PASS");
        }
        if self.anthropic.api_key.trim().is_empty() {
            missing.push("ANTHROPIC_API_KEY");
        }
        if self.search.feed_url.trim().is_empty() {
            missing.push("search.feed_url");
        }
        if self.mail.relay_url.trim().is_empty() {
            missing.push("mail.relay_url");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(PilotError::MissingCredentials(missing))
        }
    }

    pub fn initial_subscribers(&self) -> Vec<ChatId> {
        self.telegram.chat_id.map(ChatId).into_iter().collect()
    }

    /// Pipeline settings, with the base documents already read.
    pub fn pipeline_settings(&self, base_cv: String, base_cover: String) -> PipelineSettings {
        PipelineSettings {
            query: self.search.query.clone(),
            location: self.search.location.clone(),
            poll_interval: Duration::from_secs(self.search.poll_interval_secs),
            posting_delay: Duration::from_secs(self.search.posting_delay_secs),
            confirmation_timeout: Duration::from_secs(self.confirmation.timeout_secs),
            customize_retry: self.retry.customization(),
            submit_retry: self.retry.submission(),
            ledger_retry: RetryPolicy::ledger(),
            base_cv,
            base_cover,
        }
    }
}
