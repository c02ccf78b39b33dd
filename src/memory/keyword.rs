//! In-process memory store with keyword-overlap relevance.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{ForgetPredicate, MemoryId, MemoryItem, MemoryStore};
use crate::error::Result;

/// Keyword-scored memory store.
///
/// Relevance is the count of query tokens appearing in the item, with
/// recency as the tie-break. Good enough for tests and single-process use;
/// a vector-store backend slots in behind the same trait.
#[derive(Default)]
pub struct KeywordMemoryStore {
    scopes: Mutex<HashMap<String, Vec<MemoryItem>>>,
}

impl KeywordMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total item count across all scopes.
    pub fn len(&self) -> usize {
        self.scopes
            .lock()
            .expect("memory store poisoned")
            .values()
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl MemoryStore for KeywordMemoryStore {
    async fn upsert(&self, scope: &str, content: &str) -> Result<MemoryId> {
        let mut scopes = self.scopes.lock().expect("memory store poisoned");
        let items = scopes.entry(scope.to_string()).or_default();

        // Upsert: identical content within a scope refreshes the timestamp.
        if let Some(existing) = items.iter_mut().find(|item| item.content == content) {
            existing.created_at = Utc::now();
            return Ok(existing.id);
        }

        let item = MemoryItem {
            id: Uuid::new_v4(),
            scope: scope.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        };
        let id = item.id;
        items.push(item);
        Ok(id)
    }

    async fn retrieve(&self, scope: &str, query: &str, k: usize) -> Result<Vec<MemoryItem>> {
        let query_tokens = tokens(query);
        if query_tokens.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let scopes = self.scopes.lock().expect("memory store poisoned");
        let Some(items) = scopes.get(scope) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<(usize, &MemoryItem)> = items
            .iter()
            .filter_map(|item| {
                let item_tokens = tokens(&item.content);
                let score = query_tokens
                    .iter()
                    .filter(|t| item_tokens.contains(t))
                    .count();
                (score > 0).then_some((score, item))
            })
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.created_at.cmp(&a.1.created_at)));
        Ok(scored.into_iter().take(k).map(|(_, item)| item.clone()).collect())
    }

    async fn forget(&self, scope: &str, predicate: ForgetPredicate<'_>) -> Result<usize> {
        let mut scopes = self.scopes.lock().expect("memory store poisoned");
        let Some(items) = scopes.get_mut(scope) else {
            return Ok(0);
        };
        let before = items.len();
        items.retain(|item| !predicate(item));
        Ok(before - items.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn retrieve_ranks_by_token_overlap() {
        let store = KeywordMemoryStore::new();
        store.upsert("s", "user prefers rust and tokio").await.unwrap();
        store.upsert("s", "user owns a cat").await.unwrap();
        store.upsert("s", "rust project uses tokio streams").await.unwrap();

        let items = store.retrieve("s", "rust tokio", 2).await.unwrap();
        assert_eq!(items.len(), 2);
        for item in &items {
            assert!(item.content.contains("rust"));
        }
    }

    #[tokio::test]
    async fn retrieve_respects_scope_boundaries() {
        let store = KeywordMemoryStore::new();
        store.upsert("a", "rust everywhere").await.unwrap();
        let items = store.retrieve("b", "rust", 5).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn upsert_refreshes_identical_content() {
        let store = KeywordMemoryStore::new();
        let first = store.upsert("s", "same fact").await.unwrap();
        let second = store.upsert("s", "same fact").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn forget_removes_matching_items() {
        let store = KeywordMemoryStore::new();
        store.upsert("s", "keep this").await.unwrap();
        store.upsert("s", "drop this topic").await.unwrap();
        store.upsert("s", "drop this too").await.unwrap();

        let removed = store
            .forget("s", &|item| item.content.starts_with("drop"))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn no_overlap_means_no_results() {
        let store = KeywordMemoryStore::new();
        store.upsert("s", "completely unrelated").await.unwrap();
        let items = store.retrieve("s", "quantum chromodynamics", 5).await.unwrap();
        assert!(items.is_empty());
    }
}
