//! Label name resolution
//!
//! Maps human-readable label names to Gmail label ids. The cache is
//! run-local and populated by a single `labels.list` round trip,
//! amortized across every rule in the run; it is never refreshed
//! mid-run, since a run assumes label identity is stable for its
//! duration.

use std::collections::HashMap;
use tracing::info;

use crate::client::MailClient;
use crate::error::{Result, RulesError};

/// Run-scoped label name -> id resolver.
///
/// Lookups are case-insensitive: Gmail preserves label case but rule
/// authors routinely don't, and `trash` failing to match `TRASH` is a
/// support ticket rather than a safety feature.
///
/// Resolving a name that does not exist is an error, never an implicit
/// label creation: auto-creating would silently mask typos in rule
/// files.
pub struct LabelResolver {
    cache: Option<HashMap<String, String>>, // lowercase name -> id
}

impl LabelResolver {
    /// Create an empty resolver; the cache fills on first resolve
    pub fn new() -> Self {
        Self { cache: None }
    }

    /// Number of labels in the cache, if populated
    pub fn cached_len(&self) -> Option<usize> {
        self.cache.as_ref().map(|c| c.len())
    }

    async fn ensure_populated<C: MailClient>(&mut self, client: &C) -> Result<&HashMap<String, String>> {
        if self.cache.is_none() {
            let labels = client.list_labels().await?;
            let mut map = HashMap::with_capacity(labels.len());
            for label in labels {
                map.insert(label.name.to_lowercase(), label.id);
            }
            info!("Loaded {} labels into resolver cache", map.len());
            self.cache = Some(map);
        }
        Ok(self.cache.as_ref().expect("cache populated above"))
    }

    /// Resolve a label name to its provider id.
    ///
    /// The first miss triggers exactly one `labels.list` call; a name
    /// still absent after population is `LabelNotFound`.
    pub async fn resolve<C: MailClient>(&mut self, client: &C, name: &str) -> Result<String> {
        let cache = self.ensure_populated(client).await?;
        cache
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| RulesError::LabelNotFound(name.to_string()))
    }

    /// Resolve every name, failing on the first unknown one.
    ///
    /// The engine calls this before touching any message so a single
    /// bad label name fails the whole rule atomically.
    pub async fn resolve_all<C: MailClient>(
        &mut self,
        client: &C,
        names: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for name in names {
            ids.push(self.resolve(client, name.as_ref()).await?);
        }
        Ok(ids)
    }
}

impl Default for LabelResolver {
    fn default() -> Self {
        Self::new()
    }
}
