//! Rule engine: evaluates rules against the mailbox and applies label deltas
//!
//! Rules run sequentially in load order. Within a rule the engine
//! compiles the query, resolves every referenced label before any
//! mutation, then walks the paginated message-id stream applying the
//! delta one message at a time. Transient provider errors are retried
//! with bounded exponential backoff; permanent ones are recorded per
//! message and never abort the rule, let alone the run.

use async_stream::stream;
use chrono::{DateTime, Utc};
use futures::stream::{Stream, StreamExt};
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::client::MailClient;
use crate::error::Result;
use crate::labels::LabelResolver;
use crate::query;
use crate::rules::Rule;

/// Callback invoked once per processed message with the rule name and
/// message id, for progress display
pub type ProgressCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Cooperative cancellation flag shared between the engine and a
/// signal handler. Observed at message-id granularity: in-flight calls
/// complete, no new mutation is issued afterwards.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Retry policy for transient provider errors
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first (default 4 = initial + 3 retries)
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Execute an async operation with exponential backoff on transient errors
async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation_name: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut delay = policy.initial_backoff;
    let mut attempts = 0;

    loop {
        attempts += 1;
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_transient() && attempts < policy.max_attempts => {
                warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                    operation_name, attempts, policy.max_attempts, e, delay
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, policy.max_backoff);
            }
            Err(e) => return Err(e),
        }
    }
}

/// One recorded per-message failure
#[derive(Debug, Clone)]
pub struct MessageFailure {
    pub message_id: String,
    pub kind: &'static str,
    pub detail: String,
}

/// Outcome of evaluating a single rule
#[derive(Debug, Clone, Default)]
pub struct RunResult {
    pub rule: String,
    /// Message ids yielded by the search
    pub matched: usize,
    /// Messages whose delta was applied (or would be, in dry run)
    pub labeled: usize,
    /// Per-message failures, in processing order
    pub failed: Vec<MessageFailure>,
    /// Set when the rule aborted before mutating anything
    /// (label resolution or search initiation failure)
    pub fatal: Option<String>,
    /// Set when the search stream failed after some messages were
    /// already processed; counts cover only what completed
    pub truncated: Option<String>,
    /// The rule was cut short by cancellation
    pub cancelled: bool,
}

impl RunResult {
    fn for_rule(rule: &Rule) -> Self {
        Self {
            rule: rule.name.clone(),
            ..Default::default()
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal.is_some()
    }
}

/// Summary of a whole run over all loaded rules
#[derive(Debug)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub dry_run: bool,
    pub cancelled: bool,
    pub results: Vec<RunResult>,
}

impl RunReport {
    /// Number of rules that aborted without mutating
    pub fn fatal_rules(&self) -> usize {
        self.results.iter().filter(|r| r.is_fatal()).count()
    }

    /// Number of rules that did not complete a full pass: aborted
    /// before mutating, or truncated by a mid-rule search failure
    pub fn incomplete_rules(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.is_fatal() || r.truncated.is_some())
            .count()
    }

    /// Total per-message failures across all rules
    pub fn failed_messages(&self) -> usize {
        self.results.iter().map(|r| r.failed.len()).sum()
    }
}

/// Orchestrates rule evaluation against an injected mail client
pub struct RuleEngine<C: MailClient> {
    client: C,
    retry: RetryPolicy,
    dry_run: bool,
    cancel: CancelToken,
    progress: Option<ProgressCallback>,
}

impl<C: MailClient> RuleEngine<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
            dry_run: false,
            cancel: CancelToken::new(),
            progress: None,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// In dry-run mode matches are counted but no mutation is issued
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Lazy message-id stream over the paginated search.
    ///
    /// Page fetches go through the retry policy; a page failure after
    /// retries surfaces as an error item and ends the stream.
    fn message_ids<'a>(&'a self, query: &'a str) -> impl Stream<Item = Result<String>> + 'a {
        stream! {
            let mut page_token: Option<String> = None;
            loop {
                let page = with_retry(&self.retry, "search", || {
                    self.client.search_page(query, page_token.as_deref())
                })
                .await;

                match page {
                    Ok(page) => {
                        for id in page.ids {
                            yield Ok(id);
                        }
                        page_token = page.next_page_token;
                        if page_token.is_none() {
                            break;
                        }
                        if self.cancel.is_cancelled() {
                            break;
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        }
    }

    /// Evaluate one rule end to end
    async fn run_rule(&self, resolver: &mut LabelResolver, rule: &Rule) -> RunResult {
        let mut result = RunResult::for_rule(rule);

        let compiled = query::compile(&rule.search);
        info!(
            "Rule '{}'{}: query `{}`",
            rule.name,
            rule.description
                .as_deref()
                .map(|d| format!(" ({})", d))
                .unwrap_or_default(),
            compiled
        );

        // Resolve every referenced label before any mutation: one bad
        // label name fails the rule atomically, never after a partial
        // batch.
        let add_ids = match resolver.resolve_all(&self.client, &rule.add_labels).await {
            Ok(ids) => ids,
            Err(e) => {
                result.fatal = Some(e.to_string());
                return result;
            }
        };
        let remove_ids = match resolver.resolve_all(&self.client, &rule.remove_labels).await {
            Ok(ids) => ids,
            Err(e) => {
                result.fatal = Some(e.to_string());
                return result;
            }
        };

        let mut ids = pin!(self.message_ids(&compiled));
        while let Some(item) = ids.next().await {
            let message_id = match item {
                Ok(id) => id,
                Err(e) => {
                    // No further ids come either way. An early failure
                    // is rule-fatal; a mid-rule one marks the result
                    // truncated so the summary never passes it off as
                    // a complete pass over the mailbox.
                    if result.matched == 0 {
                        result.fatal = Some(e.to_string());
                    } else {
                        warn!("Rule '{}': search aborted mid-rule: {}", rule.name, e);
                        result.truncated = Some(e.to_string());
                    }
                    break;
                }
            };

            // Check cancellation before counting: a cancelled run
            // reports only the messages it actually completed.
            if self.cancel.is_cancelled() {
                result.cancelled = true;
                break;
            }

            result.matched += 1;

            if self.dry_run {
                debug!("Dry run: would modify labels on {}", message_id);
                result.labeled += 1;
            } else {
                let applied = with_retry(&self.retry, "modify_labels", || {
                    self.client
                        .modify_labels(&message_id, &add_ids, &remove_ids)
                })
                .await;

                match applied {
                    Ok(()) => result.labeled += 1,
                    Err(e) => {
                        warn!(
                            "Rule '{}': failed to label message {}: {}",
                            rule.name, message_id, e
                        );
                        result.failed.push(MessageFailure {
                            message_id: message_id.clone(),
                            kind: e.kind(),
                            detail: e.to_string(),
                        });
                    }
                }
            }

            if let Some(progress) = &self.progress {
                progress(&rule.name, &message_id);
            }
        }

        info!(
            "Rule '{}': matched={} labeled={} failed={}{}",
            rule.name,
            result.matched,
            result.labeled,
            result.failed.len(),
            if result.cancelled { " (cancelled)" } else { "" }
        );
        result
    }

    /// Run every rule in load order and aggregate the outcomes.
    ///
    /// The label resolver cache is constructed fresh here, so runs
    /// never see stale label ids from a previous invocation. One rule's
    /// failure never blocks the next; cancellation stops the run at
    /// message granularity while still reporting partial results.
    pub async fn run(&self, rules: &[Rule]) -> RunReport {
        let started_at = Utc::now();
        let mut resolver = LabelResolver::new();
        let mut results = Vec::with_capacity(rules.len());

        for rule in rules {
            if self.cancel.is_cancelled() {
                break;
            }
            results.push(self.run_rule(&mut resolver, rule).await);
        }

        RunReport {
            started_at,
            completed_at: Utc::now(),
            dry_run: self.dry_run,
            cancelled: self.cancel.is_cancelled(),
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RulesError;

    #[tokio::test]
    async fn test_with_retry_succeeds_after_transient_error() {
        use std::sync::atomic::{AtomicU32, Ordering};

        let policy = RetryPolicy {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(10),
        };
        let attempt_count = Arc::new(AtomicU32::new(0));
        let attempt_count_clone = Arc::clone(&attempt_count);

        let result = with_retry(&policy, "test_op", || {
            let count = Arc::clone(&attempt_count_clone);
            async move {
                let current = count.fetch_add(1, Ordering::SeqCst);
                if current < 2 {
                    Err(RulesError::NetworkError("Connection timeout".to_string()))
                } else {
                    Ok("success".to_string())
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_fails_on_permanent_error() {
        use std::sync::atomic::{AtomicU32, Ordering};

        let policy = RetryPolicy::default();
        let attempt_count = Arc::new(AtomicU32::new(0));
        let attempt_count_clone = Arc::clone(&attempt_count);

        let result = with_retry(&policy, "test_op", || {
            let count = Arc::clone(&attempt_count_clone);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Err::<String, _>(RulesError::MessageNotFound("gone".to_string()))
            }
        })
        .await;

        assert!(result.is_err());
        // Permanent errors are never retried
        assert_eq!(attempt_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_exhausts_all_attempts() {
        use std::sync::atomic::{AtomicU32, Ordering};

        let policy = RetryPolicy {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        };
        let attempt_count = Arc::new(AtomicU32::new(0));
        let attempt_count_clone = Arc::clone(&attempt_count);

        let result = with_retry(&policy, "test_op", || {
            let count = Arc::clone(&attempt_count_clone);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Err::<String, _>(RulesError::RateLimitExceeded { retry_after: 1 })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempt_count.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_cancel_token_starts_clear() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_cancel_token_clones_share_state() {
        let token = CancelToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
