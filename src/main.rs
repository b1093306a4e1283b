mod anthropic;
mod bot;
mod cli;
mod collaborators;
mod config;
mod confirmation;
mod customizer;
mod demo;
mod error;
mod ledger;
mod messages;
mod orchestrator;
mod posting;
mod retry;
mod source;
mod state_machine;
mod submitter;
mod subscribers;
mod telegram;
mod telemetry;
#[cfg(test)]
mod test_support;
mod ui;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use anthropic::AnthropicClient;
use cli::{Cli, Command};
use collaborators::{Collaborators, Ledger};
use config::PilotConfig;
use customizer::LlmCustomizer;
use ledger::JsonLedger;
use orchestrator::Orchestrator;
use source::HttpJobSource;
use submitter::MailRelaySubmitter;
use telegram::TelegramClient;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = PilotConfig::load(cli.config.as_deref())?;
    telemetry::init(&config.log_level, cli.verbose)?;

    match cli.command {
        Command::Run { query, location } => {
            if let Some(query) = query {
                config.search.query = query;
            }
            if let Some(location) = location {
                config.search.location = location;
            }
            run(config).await
        }
        Command::Stats => stats(&config).await,
        Command::Demo { postings } => demo::run(postings).await,
    }
}

async fn read_document(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("cannot read base document {}", path.display()))
}

async fn run(config: PilotConfig) -> Result<()> {
    config.validate_for_run()?;
    let base_cv = read_document(&config.documents.base_cv).await?;
    let base_cover = read_document(&config.documents.base_cover).await?;

    let telegram = Arc::new(TelegramClient::new(
        config.telegram.token.clone(),
        config.telegram.poll_timeout_secs,
    )?);
    let anthropic = AnthropicClient::new(config.anthropic.api_key.clone())?;
    let ledger = JsonLedger::open(&config.ledger.path).await?;
    info!(path = %ledger.path().display(), "ledger opened");
    let collab = Collaborators {
        source: Arc::new(HttpJobSource::new(
            config.search.feed_url.clone(),
            config.search.source_name.clone(),
            config.search.max_jobs,
        )?),
        customizer: Arc::new(LlmCustomizer::new(
            anthropic,
            config.anthropic.model.clone(),
            config.anthropic.max_tokens,
        )),
        submitter: Arc::new(MailRelaySubmitter::new(
            config.mail.relay_url.clone(),
            config.mail.user.clone(),
            config.mail.password.clone(),
            config.mail.default_recipient.clone(),
        )?),
        notifier: telegram.clone(),
        ledger: Arc::new(ledger),
    };

    let orch = Orchestrator::new(
        config.pipeline_settings(base_cv, base_cover),
        collab,
        config.initial_subscribers(),
    );
    let listener = tokio::spawn(bot::listen(orch.clone(), telegram));
    orch.start();
    let pipeline = orch.spawn();
    info!(
        query = %config.search.query,
        location = %config.search.location,
        "jobpilot running, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, finishing the attempt in flight");
    orch.stop();

    tokio::select! {
        joined = pipeline => joined?,
        _ = tokio::signal::ctrl_c() => warn!("second interrupt, abandoning the attempt in flight"),
    }
    listener.abort();
    Ok(())
}

async fn stats(config: &PilotConfig) -> Result<()> {
    let ledger = JsonLedger::open(&config.ledger.path).await?;
    let stats = ledger.stats().await?;
    ui::print_stats(&stats);
    ui::print_records(&ledger.records().await?);
    Ok(())
}
