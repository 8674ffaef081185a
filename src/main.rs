use anyhow::Result;
use clap::Parser;
use gmail_rules::cli::{self, Cli, Commands, ProgressReporter};
use gmail_rules::client::GmailApiClient;
use gmail_rules::config::Config;
use gmail_rules::engine::{CancelToken, RuleEngine};
use gmail_rules::{auth, query, rules};
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Exit with proper code on error
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        eprintln!("\nFor help, run: gmail-rules --help");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Install default crypto provider for rustls
    // Multiple dependencies link different providers; pick one explicitly.
    // On non-Windows platforms, use aws-lc-rs; on Windows, ring.
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    // Initialize tracing with level based on verbose flag
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_rules=debug,info"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_rules=info,warn,error"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Auth { force } => {
            tracing::info!("Authenticating with Gmail API...");

            if let Some(parent) = cli.token_cache.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            // Delete existing token if force flag is set
            if force && cli.token_cache.exists() {
                tokio::fs::remove_file(&cli.token_cache).await?;
                tracing::info!("Removed existing token cache");
            }

            // Initialize Gmail hub (will trigger OAuth flow if needed)
            let hub = auth::initialize_gmail_hub(&cli.credentials, &cli.token_cache).await?;
            auth::secure_token_file(&cli.token_cache).await?;

            println!("Successfully authenticated with Gmail API");
            println!("Token cached at: {:?}", cli.token_cache);

            // Test the connection - must specify scope to avoid triggering another OAuth flow
            let (_, profile) = hub
                .users()
                .get_profile("me")
                .add_scope("https://www.googleapis.com/auth/gmail.modify")
                .doit()
                .await?;
            println!(
                "Connected to account: {}",
                profile.email_address.unwrap_or_default()
            );

            Ok(())
        }

        Commands::Check { paths, recursive } => {
            let loaded = rules::load_rules(&paths, recursive)?;

            println!("Loaded {} rule(s):", loaded.len());
            for rule in &loaded {
                println!(
                    "  {} ({}) -> query `{}`, +{:?} -{:?}",
                    rule.name,
                    rule.source.display(),
                    query::compile(&rule.search),
                    rule.add_labels,
                    rule.remove_labels
                );
            }

            Ok(())
        }

        Commands::Run {
            paths,
            dry_run,
            recursive,
        } => {
            let config = Config::load(&cli.config).await?;
            let dry_run = dry_run || config.execution.dry_run;
            let recursive = recursive || config.execution.recursive;

            if dry_run {
                println!("Running in DRY RUN mode - no changes will be made");
            }

            // Load-time validation is fail-fast: a malformed rule aborts
            // the run before anything is mutated.
            let loaded = rules::load_rules(&paths, recursive)?;
            tracing::info!("Loaded {} rule(s)", loaded.len());

            let hub = auth::initialize_gmail_hub(&cli.credentials, &cli.token_cache).await?;
            let client = GmailApiClient::new(
                hub,
                config.engine.max_concurrent_requests,
                config.engine.page_size,
            );

            // Ctrl-C flips the cancellation flag; the engine stops
            // issuing mutations at the next message boundary.
            let cancel = CancelToken::new();
            {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        tracing::warn!("Cancellation requested; finishing in-flight calls");
                        cancel.cancel();
                    }
                });
            }

            let reporter = ProgressReporter::new();
            let spinner = reporter.run_spinner();
            let spinner_handle = spinner.clone();
            let engine = RuleEngine::new(client)
                .with_retry_policy(config.engine.retry_policy())
                .with_dry_run(dry_run)
                .with_cancel_token(cancel)
                .with_progress(Arc::new(move |rule: &str, message_id: &str| {
                    spinner_handle.set_message(format!("Rule '{}': processed {}", rule, message_id));
                    spinner_handle.inc(1);
                }));

            let report = engine.run(&loaded).await;
            spinner.finish_and_clear();

            cli::print_report(&report);

            // Per-message failures are summarized above but do not fail
            // the process; rules that failed outright or whose search
            // was truncated mid-rule do.
            let incomplete = report.incomplete_rules();
            if incomplete > 0 {
                anyhow::bail!("{} rule(s) did not complete", incomplete);
            }

            Ok(())
        }
    }
}
