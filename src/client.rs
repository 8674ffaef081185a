//! Gmail API client adapter
//!
//! The engine consumes the narrow [`MailClient`] capability rather than
//! the Gmail hub directly, so it can be exercised against a fake
//! adapter in tests. Retry policy lives in the engine; this layer only
//! bounds concurrency and translates API errors into the crate's
//! taxonomy.

use async_trait::async_trait;
use google_gmail1::{
    api::ModifyMessageRequest, hyper_rustls, hyper_util, Gmail,
};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::error::{Result, RulesError};

/// Label info returned from Gmail API
#[derive(Debug, Clone)]
pub struct LabelInfo {
    pub id: String,
    pub name: String,
}

/// One page of search results; the token is provider-managed and opaque
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub ids: Vec<String>,
    pub next_page_token: Option<String>,
}

/// Narrow capability surface over the mail provider
#[async_trait]
pub trait MailClient: Send + Sync {
    /// List all labels in the account
    async fn list_labels(&self) -> Result<Vec<LabelInfo>>;

    /// Fetch one page of message ids matching a query
    async fn search_page(&self, query: &str, page_token: Option<&str>) -> Result<SearchPage>;

    /// Add and remove label ids on a single message.
    ///
    /// Gmail's modify endpoint has set semantics: adding a label the
    /// message already carries, or removing one it does not, succeeds
    /// as a no-op. Re-running a rule therefore converges.
    async fn modify_labels(
        &self,
        message_id: &str,
        add_ids: &[String],
        remove_ids: &[String],
    ) -> Result<()>;
}

type HubConnector = hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;

/// Production Gmail client with semaphore-bounded concurrency
pub struct GmailApiClient {
    hub: Gmail<HubConnector>,
    rate_limiter: Arc<Semaphore>,
    page_size: u32,
}

impl GmailApiClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `hub` - Gmail API hub instance
    /// * `max_concurrent` - Maximum concurrent requests against the API
    /// * `page_size` - Message ids requested per search page (max 500)
    pub fn new(hub: Gmail<HubConnector>, max_concurrent: usize, page_size: u32) -> Self {
        Self {
            hub,
            rate_limiter: Arc::new(Semaphore::new(max_concurrent.max(1))),
            page_size,
        }
    }

    async fn acquire_permit(&self) -> Result<tokio::sync::SemaphorePermit<'_>> {
        self.rate_limiter
            .acquire()
            .await
            .map_err(|e| RulesError::ApiError(format!("Failed to acquire permit: {}", e)))
    }
}

#[async_trait]
impl MailClient for GmailApiClient {
    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        let _permit = self.acquire_permit().await?;

        let (_, response) = self
            .hub
            .users()
            .labels_list("me")
            .add_scope("https://www.googleapis.com/auth/gmail.labels")
            .doit()
            .await?;

        let labels: Vec<LabelInfo> = response
            .labels
            .unwrap_or_default()
            .into_iter()
            .filter_map(|label| match (label.id, label.name) {
                (Some(id), Some(name)) => Some(LabelInfo { id, name }),
                _ => None,
            })
            .collect();

        debug!("Listed {} labels", labels.len());
        Ok(labels)
    }

    async fn search_page(&self, query: &str, page_token: Option<&str>) -> Result<SearchPage> {
        let _permit = self.acquire_permit().await?;

        let mut call = self
            .hub
            .users()
            .messages_list("me")
            .q(query)
            .max_results(self.page_size);

        if let Some(token) = page_token {
            call = call.page_token(token);
        }

        let (_, response) = call
            .add_scope("https://www.googleapis.com/auth/gmail.modify")
            .doit()
            .await?;

        let ids = response
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|msg| msg.id)
            .collect::<Vec<_>>();

        debug!("Search page returned {} ids", ids.len());
        Ok(SearchPage {
            ids,
            next_page_token: response.next_page_token,
        })
    }

    async fn modify_labels(
        &self,
        message_id: &str,
        add_ids: &[String],
        remove_ids: &[String],
    ) -> Result<()> {
        let _permit = self.acquire_permit().await?;

        let request = ModifyMessageRequest {
            add_label_ids: if add_ids.is_empty() {
                None
            } else {
                Some(add_ids.to_vec())
            },
            remove_label_ids: if remove_ids.is_empty() {
                None
            } else {
                Some(remove_ids.to_vec())
            },
        };

        self.hub
            .users()
            .messages_modify(request, "me", message_id)
            .add_scope("https://www.googleapis.com/auth/gmail.modify")
            .doit()
            .await?;

        Ok(())
    }
}

// Forward the capability through Arc so the engine and CLI can share
// one client.
#[async_trait]
impl<C: MailClient + ?Sized> MailClient for Arc<C> {
    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        self.as_ref().list_labels().await
    }

    async fn search_page(&self, query: &str, page_token: Option<&str>) -> Result<SearchPage> {
        self.as_ref().search_page(query, page_token).await
    }

    async fn modify_labels(
        &self,
        message_id: &str,
        add_ids: &[String],
        remove_ids: &[String],
    ) -> Result<()> {
        self.as_ref()
            .modify_labels(message_id, add_ids, remove_ids)
            .await
    }
}
