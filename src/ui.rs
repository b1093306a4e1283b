//! Terminal output for jobpilot: a spinner and colored summaries.
//!
//! `indicatif` drives the spinner while the pipeline works; `console`
//! styles the statistics and ledger records.

use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::ledger::Stats;
use crate::state_machine::{ApplicationState, LedgerRecord};

/// Spinner shown while the pipeline runs in the foreground.
#[derive(Clone)]
pub struct PipelineProgress {
    // indicatif spinner.
    pb: ProgressBar,
    green: Style,
    red: Style,
}

impl PipelineProgress {
    pub fn start(message: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
        }
    }

    pub fn set_message(&self, message: impl Into<String>) {
        self.pb.set_message(message.into());
    }

    /// Print a line above the spinner without interrupting it.
    pub fn println(&self, line: impl AsRef<str>) {
        self.pb.println(line.as_ref());
    }

    /// Finish the spinner with a green (success) or red summary.
    pub fn finish(&self, ok: bool, summary: &str) {
        self.pb.finish_and_clear();
        if ok {
            println!("  {} {summary}", self.green.apply_to("✓"));
        } else {
            println!("  {} {summary}", self.red.apply_to("✗"));
        }
    }
}

/// Color for each ledger state.
fn state_style(state: ApplicationState) -> Style {
    match state {
        ApplicationState::Submitted => Style::new().green(),
        ApplicationState::SubmitFailed => Style::new().red(),
        ApplicationState::Expired | ApplicationState::Declined => Style::new().dim(),
        _ => Style::new().yellow(),
    }
}

pub fn print_stats(stats: &Stats) {
    let bold = Style::new().bold();
    let last = stats
        .last_application
        .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "never".into());

    println!("{}", bold.apply_to("─── Application Statistics ───"));
    println!("  Total:      {}", stats.total);
    println!("  Successful: {}", Style::new().green().apply_to(stats.successful));
    println!("  Failed:     {}", Style::new().red().apply_to(stats.failed));
    println!("  Pending:    {}", Style::new().yellow().apply_to(stats.pending));
    println!("  Offers:     {}", Style::new().cyan().bold().apply_to(stats.offers));
    println!("  Last:       {last}");
}

/// One line per record: id, state, job and offer mark.
pub fn print_records(records: &[LedgerRecord]) {
    if records.is_empty() {
        return;
    }
    println!();
    for record in records {
        let offer = if record.offer { " 🎉" } else { "" };
        println!(
            "  {}  {} {}{offer}",
            Style::new().dim().apply_to(&record.id),
            state_style(record.status).apply_to(format!("{:<22}", record.status.to_string())),
            record.headline(),
        );
    }
}
