//! Common test utilities and fixtures
//!
//! `FakeMailClient` is an in-memory `MailClient` with scripted labels,
//! paginated searches, per-message failure injection, and full call
//! recording, so engine behavior can be asserted without the Gmail API.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use gmail_rules::client::{LabelInfo, MailClient, SearchPage};
use gmail_rules::engine::CancelToken;
use gmail_rules::error::{Result, RulesError};

/// One recorded modify_labels call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyCall {
    pub message_id: String,
    pub add_ids: Vec<String>,
    pub remove_ids: Vec<String>,
}

#[derive(Default)]
struct FakeState {
    /// Per-message label sets, mutated with Gmail's set semantics
    message_labels: HashMap<String, HashSet<String>>,
    /// Remaining transient failures per message id
    transient_failures: HashMap<String, u32>,
    modify_calls: Vec<ModifyCall>,
    list_label_calls: usize,
    search_calls: Vec<String>,
}

/// Scripted in-memory mail provider
pub struct FakeMailClient {
    labels: Vec<(String, String)>, // (id, name)
    /// Message ids returned by any search, pre-split into pages
    pages: Vec<Vec<String>>,
    /// Messages that always fail permanently on modify
    permanent_failures: HashSet<String>,
    /// Fail every search with a permanent error
    search_fails: bool,
    /// Fail the fetch of this page index with a permanent error
    fail_page: Option<usize>,
    /// Cancel this token after N modify calls have been issued
    cancel_after: Option<(CancelToken, usize)>,
    state: Mutex<FakeState>,
}

impl FakeMailClient {
    pub fn new() -> Self {
        Self {
            labels: vec![
                ("Label_TRASH".to_string(), "TRASH".to_string()),
                ("Label_INBOX".to_string(), "INBOX".to_string()),
                ("Label_1".to_string(), "Receipts".to_string()),
            ],
            pages: Vec::new(),
            permanent_failures: HashSet::new(),
            search_fails: false,
            fail_page: None,
            cancel_after: None,
            state: Mutex::new(FakeState::default()),
        }
    }

    pub fn with_messages(mut self, ids: &[&str]) -> Self {
        self.pages = vec![ids.iter().map(|s| s.to_string()).collect()];
        self
    }

    /// Script search results split into explicit pages
    pub fn with_pages(mut self, pages: &[&[&str]]) -> Self {
        self.pages = pages
            .iter()
            .map(|page| page.iter().map(|s| s.to_string()).collect())
            .collect();
        self
    }

    pub fn with_permanent_failure(mut self, message_id: &str) -> Self {
        self.permanent_failures.insert(message_id.to_string());
        self
    }

    /// Make the first `count` modify calls on a message fail transiently
    pub fn with_transient_failures(self, message_id: &str, count: u32) -> Self {
        self.state
            .lock()
            .unwrap()
            .transient_failures
            .insert(message_id.to_string(), count);
        self
    }

    pub fn with_failing_search(mut self) -> Self {
        self.search_fails = true;
        self
    }

    /// Fail the fetch of page `index` (0-based) with a permanent error
    pub fn with_failing_page(mut self, index: usize) -> Self {
        self.fail_page = Some(index);
        self
    }

    pub fn with_cancel_after(mut self, token: CancelToken, calls: usize) -> Self {
        self.cancel_after = Some((token, calls));
        self
    }

    pub fn modify_calls(&self) -> Vec<ModifyCall> {
        self.state.lock().unwrap().modify_calls.clone()
    }

    pub fn search_queries(&self) -> Vec<String> {
        self.state.lock().unwrap().search_calls.clone()
    }

    pub fn list_label_calls(&self) -> usize {
        self.state.lock().unwrap().list_label_calls
    }

    pub fn labels_of(&self, message_id: &str) -> HashSet<String> {
        self.state
            .lock()
            .unwrap()
            .message_labels
            .get(message_id)
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for FakeMailClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MailClient for FakeMailClient {
    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        let mut state = self.state.lock().unwrap();
        state.list_label_calls += 1;
        Ok(self
            .labels
            .iter()
            .map(|(id, name)| LabelInfo {
                id: id.clone(),
                name: name.clone(),
            })
            .collect())
    }

    async fn search_page(&self, query: &str, page_token: Option<&str>) -> Result<SearchPage> {
        let mut state = self.state.lock().unwrap();
        state.search_calls.push(query.to_string());

        if self.search_fails {
            return Err(RulesError::BadRequest("Invalid query".to_string()));
        }

        // Page tokens are the page index, opaque to the engine
        let index: usize = page_token.map(|t| t.parse().unwrap()).unwrap_or(0);
        if self.fail_page == Some(index) {
            return Err(RulesError::BadRequest("Invalid query".to_string()));
        }
        let ids = self.pages.get(index).cloned().unwrap_or_default();
        let next_page_token = if index + 1 < self.pages.len() {
            Some((index + 1).to_string())
        } else {
            None
        };

        Ok(SearchPage {
            ids,
            next_page_token,
        })
    }

    async fn modify_labels(
        &self,
        message_id: &str,
        add_ids: &[String],
        remove_ids: &[String],
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();

        if let Some(remaining) = state.transient_failures.get_mut(message_id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(RulesError::NetworkError("connection reset".to_string()));
            }
        }

        if self.permanent_failures.contains(message_id) {
            return Err(RulesError::MessageNotFound(message_id.to_string()));
        }

        state.modify_calls.push(ModifyCall {
            message_id: message_id.to_string(),
            add_ids: add_ids.to_vec(),
            remove_ids: remove_ids.to_vec(),
        });

        // Set semantics: re-adding or re-removing is a no-op success
        let labels = state
            .message_labels
            .entry(message_id.to_string())
            .or_default();
        for id in add_ids {
            labels.insert(id.clone());
        }
        for id in remove_ids {
            labels.remove(id);
        }

        if let Some((token, after)) = &self.cancel_after {
            if state.modify_calls.len() >= *after {
                token.cancel();
            }
        }

        Ok(())
    }
}
