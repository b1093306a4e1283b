//! jobpilot command line, built on clap.
//!
//! [`Cli`] carries the [`Command`] subcommands (run, stats, demo) and the
//! global flags (--config, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// jobpilot: finds jobs, asks for confirmation over chat and sends applications.
#[derive(Debug, Parser)]
#[command(name = "jobpilot", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the config file (default: `jobpilot.toml`).
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the pipeline and the bot until Ctrl-C.
    Run {
        /// Search term; overrides `search.query`.
        #[arg(long, short)]
        query: Option<String>,

        /// Location; overrides `search.location`.
        #[arg(long, short)]
        location: Option<String>,
    },

    /// Show ledger statistics.
    Stats,

    /// Run the pipeline on in-memory collaborators with automatic approval.
    Demo {
        /// Number of fake postings.
        #[arg(long, default_value_t = 3)]
        postings: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_run_subcommand() {
        let cli = Cli::parse_from(["jobpilot", "run", "--query", "Rust Developer", "-l", "Cape Town"]);
        match cli.command {
            Command::Run { query, location } => {
                assert_eq!(query.as_deref(), Some("Rust Developer"));
                assert_eq!(location.as_deref(), Some("Cape Town"));
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from(["jobpilot", "--config", "alt.toml", "--verbose", "stats"]);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("alt.toml")));
        assert!(matches!(cli.command, Command::Stats));
    }

    #[test]
    fn cli_parses_demo_defaults() {
        let cli = Cli::parse_from(["jobpilot", "demo"]);
        assert!(matches!(cli.command, Command::Demo { postings: 3 }));
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
