//! Long-term memory: retrieval/upsert capability consumed by sessions.
//!
//! The engine treats memory as best-effort. Recall for a turn runs under a
//! bounded deadline via [`recall_within`]; a slow or failing backend costs
//! nothing but the context it would have contributed.

pub mod keyword;

pub use keyword::KeywordMemoryStore;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Unique memory item identifier.
pub type MemoryId = Uuid;

/// One extracted fact, owned by the memory store and referenced (never
/// embedded) from messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryItem {
    pub id: MemoryId,
    /// Scope tag (topic / session scope).
    pub scope: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Predicate used by [`MemoryStore::forget`].
pub type ForgetPredicate<'a> = &'a (dyn Fn(&MemoryItem) -> bool + Send + Sync);

/// Retrieval/upsert capability over some memory backend.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Store (or refresh) a fact under a scope, returning its id.
    async fn upsert(&self, scope: &str, content: &str) -> Result<MemoryId>;

    /// Most relevant items for a query, best first, at most `k`.
    async fn retrieve(&self, scope: &str, query: &str, k: usize) -> Result<Vec<MemoryItem>>;

    /// Remove items in a scope matching the predicate; returns how many.
    async fn forget(&self, scope: &str, predicate: ForgetPredicate<'_>) -> Result<usize>;
}

/// Best-effort recall with a hard deadline.
///
/// Runs `retrieve` concurrently with whatever the caller does next; if the
/// lookup misses the deadline or fails, returns `None` — the turn proceeds
/// without memory context rather than waiting.
pub async fn recall_within(
    store: Arc<dyn MemoryStore>,
    scope: &str,
    query: &str,
    k: usize,
    deadline: Duration,
) -> Option<Vec<MemoryItem>> {
    match tokio::time::timeout(deadline, store.retrieve(scope, query, k)).await {
        Ok(Ok(items)) if !items.is_empty() => Some(items),
        Ok(Ok(_)) => None,
        Ok(Err(err)) => {
            tracing::debug!(scope, error = %err, "memory retrieval failed, continuing without context");
            None
        }
        Err(_) => {
            tracing::debug!(scope, deadline_ms = deadline.as_millis() as u64, "memory retrieval missed deadline, dropped");
            None
        }
    }
}
