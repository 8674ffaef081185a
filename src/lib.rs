//! Gmail Rules
//!
//! Configuration-based automation for Gmail: declarative rules pair a
//! search (Gmail query operators) with a label delta, and the engine
//! applies the delta to every matching message — idempotently, with
//! bounded retry on transient API errors, and with per-message failure
//! isolation so one vanished message never sinks a run.
//!
//! # Example Usage
//!
//! ```no_run
//! use std::path::PathBuf;
//! use gmail_rules::{auth, client::GmailApiClient, engine::RuleEngine, rules};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let rules = rules::load_rules(&[PathBuf::from("rules/")], false)?;
//!
//!     let hub = auth::initialize_gmail_hub(
//!         "credentials.json".as_ref(),
//!         ".gmail-rules/token.json".as_ref(),
//!     )
//!     .await?;
//!
//!     let client = GmailApiClient::new(hub, 10, 100);
//!     let report = RuleEngine::new(client).run(&rules).await;
//!
//!     for result in &report.results {
//!         println!("{}: {}/{} labeled", result.rule, result.labeled, result.matched);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - OAuth2 authentication and Gmail API initialization
//! - [`cli`] - Command-line interface and progress reporting
//! - [`client`] - Mail client capability trait and Gmail implementation
//! - [`config`] - Engine configuration
//! - [`engine`] - Rule evaluation orchestrator with retry and cancellation
//! - [`error`] - Error types and result aliases
//! - [`labels`] - Label name to id resolution
//! - [`query`] - Search criteria to Gmail query compilation
//! - [`rules`] - Rule model and rule-file loading

pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod labels;
pub mod query;
pub mod rules;

// Re-export commonly used types for convenience
pub use error::{Result, RulesError};

pub use client::{GmailApiClient, LabelInfo, MailClient, SearchPage};
pub use engine::{CancelToken, RetryPolicy, RuleEngine, RunReport, RunResult};
pub use labels::LabelResolver;
pub use rules::{Criterion, Rule};

pub use config::{Config, EngineConfig, ExecutionConfig};
