//! Command-line interface

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

use crate::engine::RunReport;

#[derive(Parser, Debug)]
#[command(name = "gmail-rules")]
#[command(version)]
#[command(about = "Configuration-based rule automation for Gmail labels", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to OAuth2 credentials file
    #[arg(long, default_value = "credentials.json")]
    pub credentials: PathBuf,

    /// Path to token cache file
    #[arg(long, default_value = ".gmail-rules/token.json")]
    pub token_cache: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authenticate with Gmail API
    Auth {
        /// Force re-authentication even if token exists
        #[arg(long)]
        force: bool,
    },

    /// Evaluate rules against the mailbox and apply label changes
    Run {
        /// Files or directories containing rule YAML files
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Dry run mode (count matches, change nothing)
        #[arg(long)]
        dry_run: bool,

        /// Recurse into subdirectories when scanning rule locations
        /// (directories are scanned one level deep by default)
        #[arg(long)]
        recursive: bool,
    },

    /// Load and compile rules without touching the mailbox
    Check {
        /// Files or directories containing rule YAML files
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Recurse into subdirectories when scanning rule locations
        #[arg(long)]
        recursive: bool,
    },
}

/// Progress reporter using indicatif
pub struct ProgressReporter {
    spinner_style: ProgressStyle,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        Self { spinner_style }
    }

    /// Spinner for the whole run; match counts are unknown up front,
    /// so the caption tracks the rule currently being applied
    pub fn run_spinner(&self) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        pb.set_style(self.spinner_style.clone());
        pb.set_message("Applying rules...");
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Print the per-rule summary block for a completed run
pub fn print_report(report: &RunReport) {
    println!("\n========================================");
    if report.dry_run {
        println!("Run Summary (DRY RUN - nothing changed)");
    } else {
        println!("Run Summary");
    }
    println!("========================================");
    println!(
        "Duration: {} seconds",
        (report.completed_at - report.started_at).num_seconds()
    );

    for result in &report.results {
        if let Some(fatal) = &result.fatal {
            println!("\nRule '{}': FAILED - {}", result.rule, fatal);
            continue;
        }
        println!(
            "\nRule '{}': matched={} labeled={} failed={}{}",
            result.rule,
            result.matched,
            result.labeled,
            result.failed.len(),
            if result.cancelled { " (cancelled)" } else { "" }
        );
        if let Some(truncated) = &result.truncated {
            println!("  search aborted mid-rule: {}", truncated);
        }
        for failure in &result.failed {
            println!(
                "  - message {}: {} ({})",
                failure.message_id, failure.kind, failure.detail
            );
        }
    }

    if report.cancelled {
        println!("\nRun was cancelled; results above are partial.");
    }
    println!("========================================");
}
