//! `jobpilot demo`: the real pipeline wired to in-memory collaborators, with
//! every confirmation approved automatically.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::collaborators::{
    Collaborators, DocumentCustomizer, JobSource, Ledger, Notifier, Submitter,
};
use crate::confirmation::Verdict;
use crate::error::{CustomizeError, NotifyError, SourceError, SubmitError};
use crate::ledger::MemoryLedger;
use crate::orchestrator::{Orchestrator, PipelineSettings};
use crate::posting::JobPosting;
use crate::retry::RetryPolicy;
use crate::subscribers::ChatId;
use crate::ui::{self, PipelineProgress};

const COMPANIES: [&str; 5] = ["TechCorp", "Initech", "Globex", "Umbrella", "Hooli"];
/// The demo customizer always fails for this company, to show the fallback.
const FLAKY_COMPANY: &str = "Globex";

const DEMO_CV: &str = "Jane Doe\nPython developer, 5 years of Django and PostgreSQL.";
const DEMO_COVER: &str = "Dear hiring team,\nI would love to join you.";

struct DemoSource {
    postings: usize,
    served: AtomicBool,
}

#[async_trait]
impl JobSource for DemoSource {
    async fn search(&self, query: &str, location: &str) -> Result<Vec<JobPosting>, SourceError> {
        if self.served.swap(true, Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        Ok((0..self.postings)
            .map(|n| JobPosting {
                title: format!("{query} #{}", n + 1),
                company: COMPANIES[n % COMPANIES.len()].to_string(),
                source: "demo".into(),
                url: format!("https://jobs.example/demo/{}", n + 1),
                description: "Build and operate Python services.".into(),
                location: (n % 2 == 0).then(|| location.to_string()),
                contact: None,
            })
            .collect())
    }
}

struct DemoCustomizer;

#[async_trait]
impl DocumentCustomizer for DemoCustomizer {
    async fn rewrite(&self, base_text: &str, context: &JobPosting) -> Result<String, CustomizeError> {
        if context.company == FLAKY_COMPANY {
            return Err(CustomizeError::Unavailable("demo model offline".into()));
        }
        Ok(format!("[tailored for {}]\n{base_text}", context.title))
    }

    async fn generate_cover(
        &self,
        job: &JobPosting,
        base_text: &str,
    ) -> Result<String, CustomizeError> {
        if job.company == FLAKY_COMPANY {
            return Err(CustomizeError::Unavailable("demo model offline".into()));
        }
        Ok(base_text.replace("hiring team", &format!("{} team", job.company)))
    }
}

/// Rejects the very first delivery so one retry shows up.
#[derive(Default)]
struct DemoSubmitter {
    calls: AtomicUsize,
}

#[async_trait]
impl Submitter for DemoSubmitter {
    async fn submit(&self, _job: &JobPosting, _cv: &str, _cover: &str) -> Result<(), SubmitError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(SubmitError::Unavailable("demo relay warming up".into()));
        }
        Ok(())
    }
}

struct DemoNotifier {
    progress: PipelineProgress,
}

#[async_trait]
impl Notifier for DemoNotifier {
    async fn broadcast(&self, _subscribers: &[ChatId], message: &str) -> Result<(), NotifyError> {
        let first_line = message.lines().next().unwrap_or_default();
        self.progress.println(format!("  💬 {first_line}"));
        Ok(())
    }
}

pub async fn run(postings: usize) -> Result<()> {
    let progress = PipelineProgress::start("Starting demo pipeline");
    let ledger = Arc::new(MemoryLedger::new());
    let collab = Collaborators {
        source: Arc::new(DemoSource {
            postings,
            served: AtomicBool::new(false),
        }),
        customizer: Arc::new(DemoCustomizer),
        submitter: Arc::new(DemoSubmitter::default()),
        notifier: Arc::new(DemoNotifier {
            progress: progress.clone(),
        }),
        ledger: ledger.clone(),
    };
    let settings = PipelineSettings {
        poll_interval: Duration::from_secs(3600),
        posting_delay: Duration::from_millis(200),
        confirmation_timeout: Duration::from_secs(30),
        customize_retry: RetryPolicy::new(3, 100),
        submit_retry: RetryPolicy::new(3, 100),
        base_cv: DEMO_CV.into(),
        base_cover: DEMO_COVER.into(),
        ..PipelineSettings::default()
    };

    let orch = Orchestrator::new(settings, collab, [ChatId(0)]);
    orch.start();
    let pipeline = orch.spawn();

    loop {
        for (id, job) in orch.pending_confirmations() {
            progress.set_message(format!("Approving #{id}: {job}"));
            orch.reply(Some(id), Verdict::Approve);
        }
        let records = ledger.records().await?;
        if records.len() == postings && records.iter().all(|r| r.status.is_terminal()) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    orch.stop();
    pipeline.await?;

    let stats = ledger.stats().await?;
    progress.finish(
        stats.failed == 0,
        &format!("{} postings processed", stats.total),
    );
    ui::print_stats(&stats);
    ui::print_records(&ledger.records().await?);
    Ok(())
}
