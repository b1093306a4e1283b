//! Chat message texts. Plain text, no parse mode, so job titles never need
//! escaping.

use std::time::Duration;

use crate::confirmation::{ReplyOutcome, RequestId};
use crate::ledger::Stats;
use crate::orchestrator::StatusReport;
use crate::posting::JobPosting;
use crate::state_machine::{ApplicationState, LedgerRecord};

pub const WELCOME: &str = "🚀 Job Search Bot Activated\n\n\
    I'll help you with:\n\
    • Finding relevant jobs\n\
    • Customizing your CV for each position\n\
    • Sending applications after you confirm\n\
    • Tracking your applications\n\n\
    Use /stats to see your progress or /stop to pause searching.";

pub const HELP: &str = "I'm your job search assistant. Use the commands to control your job search:\n\
    /start - Begin job searching\n\
    /stats - See application statistics\n\
    /status - Current search status\n\
    /stop - Pause job searching\n\
    /resume - Resume job searching\n\
    /get_cv - Show the base CV\n\
    /subscribe, /unsubscribe - Manage alerts for this chat\n\
    /approve [id], /decline [id] - Answer a pending job (or reply yes / no)\n\
    /offer <attempt-id> - Report a job offer";

pub const PAUSED: &str = "⏸ Job searching paused. Use /resume to continue.";
pub const RESUMED: &str = "▶️ Job searching resumed. I'll notify you of new opportunities.";
pub const ALREADY_RUNNING: &str = "Job searching is already active.";
pub const STOPPED: &str = "⏹ Job searching has shut down.";
pub const THANKS: &str = "You're welcome! 😊";
pub const SEARCHING: &str =
    "I'm actively searching for jobs. I'll notify you immediately when I find a good match!";
pub const SUBSCRIBED: &str = "🔔 This chat will now receive job alerts.";
pub const ALREADY_SUBSCRIBED: &str = "This chat is already subscribed.";
pub const UNSUBSCRIBED: &str = "🔕 This chat will no longer receive job alerts.";
pub const NOT_SUBSCRIBED: &str = "This chat is not subscribed. Send /subscribe first.";
pub const NO_CV: &str = "CV file not found.";
pub const OFFER_USAGE: &str = "Usage: /offer <attempt-id> [note]";

/// "5 minutes", "1 minute", "45 seconds".
pub fn human_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (n, unit) = if secs >= 60 && secs % 60 == 0 {
        (secs / 60, "minute")
    } else {
        (secs, "second")
    };
    if n == 1 {
        format!("1 {unit}")
    } else {
        format!("{n} {unit}s")
    }
}

pub fn new_job(id: RequestId, job: &JobPosting, timeout: Duration) -> String {
    format!(
        "🚨 New Job Found! (#{id})\n\n\
         Position: {title}\n\
         Company: {company}\n\
         Location: {location}\n\
         {url}\n\n\
         Should I apply? Reply 'yes {id}' within {within} to apply automatically, or 'no {id}' to skip.",
        title = job.title.trim(),
        company = job.company.trim(),
        location = job.location_or_remote(),
        url = job.url.trim(),
        within = human_duration(timeout),
    )
}

pub fn expired(id: RequestId, job: &JobPosting) -> String {
    format!(
        "⌛ No reply for #{id}, skipped {headline}.",
        headline = job.headline()
    )
}

pub fn application_result(job: &JobPosting, success: bool) -> String {
    let status = if success {
        "✅ Successfully applied"
    } else {
        "❌ Failed to apply"
    };
    format!(
        "{status} for:\n{headline}\nLocation: {location}",
        headline = job.headline(),
        location = job.location_or_remote(),
    )
}

/// The ledger refused every write of `state`; the record is stale.
pub fn ledger_write_failed(job: &JobPosting, state: ApplicationState) -> String {
    format!(
        "⚠️ Could not record {headline} as {state}. \
         The application history is out of date for this job.",
        headline = job.headline(),
    )
}

pub fn offer(record: &LedgerRecord) -> String {
    format!(
        "🎉 CONGRATULATIONS!\n\n\
         You received a job offer from:\n\
         {company} for {title}\n\n\
         Job searching has been paused. Use /resume to continue searching.",
        company = record.company,
        title = record.title,
    )
}

pub fn stats(stats: &Stats) -> String {
    let last = stats
        .last_application
        .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "never".into());
    format!(
        "📊 Application Statistics\n\n\
         • Total Applications: {}\n\
         • Successful: {}\n\
         • Failed: {}\n\
         • Pending: {}\n\
         • Offers: {}\n\n\
         ⏱ Last Application: {last}",
        stats.total, stats.successful, stats.failed, stats.pending, stats.offers,
    )
}

pub fn status(report: &StatusReport) -> String {
    let next = match report.next_poll {
        Some(at) => {
            let mins = (at - chrono::Utc::now()).num_minutes().max(0);
            format!("{mins} minutes")
        }
        None => "-".into(),
    };
    format!(
        "🔍 Current Search Status\n\n\
         • Status: {state}\n\
         • Query: {query}\n\
         • Location: {location}\n\
         • Last Job Seen: {last}\n\
         • Awaiting Confirmation: {awaiting}\n\
         • Last Applied: {applied}\n\
         • Next Search In: {next}",
        state = report.state,
        query = report.query,
        location = report.location,
        last = report.last_job.as_deref().unwrap_or("none yet"),
        awaiting = report.awaiting_confirmation,
        applied = report
            .last_applied
            .map(|day| day.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "never".into()),
    )
}

pub fn reply_outcome(outcome: &ReplyOutcome) -> String {
    match outcome {
        ReplyOutcome::Accepted { id, resolution, job } => {
            format!("👍 #{id} {resolution}: {job}")
        }
        ReplyOutcome::AlreadyResolved { id, resolution } => {
            format!("#{id} was already {resolution}.")
        }
        ReplyOutcome::NoSuchRequest(Some(id)) => format!("No pending job #{id}."),
        ReplyOutcome::NoSuchRequest(None) => "No job is waiting for an answer.".into(),
    }
}

pub fn offer_recorded(record: &LedgerRecord) -> String {
    format!("Offer recorded for {}.", record.headline())
}

pub fn base_cv(text: &str) -> String {
    format!("Here's your current CV:\n\n{text}")
}
