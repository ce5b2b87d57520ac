//! Short-lived cache for upstream fetches.
//!
//! Entries are keyed by `(query_type, project_id, start, end)` and expire
//! after a fixed TTL. There is no explicit invalidation; a full cache first
//! drops expired entries, then the oldest one.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::config::CacheConfig;
use crate::error::Result;
use crate::models::ConversationRecord;
use crate::period::DateRange;
use crate::upstream::ConversationSource;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub query_type: &'static str,
    pub project_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl CacheKey {
    pub fn new(query_type: &'static str, project_id: &str, range: &DateRange) -> Self {
        Self {
            query_type,
            project_id: project_id.to_string(),
            start: range.start(),
            end: range.end(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.query_type,
            self.project_id,
            self.start.to_rfc3339(),
            self.end.to_rfc3339()
        )
    }
}

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

pub struct TtlCache<V> {
    entries: DashMap<CacheKey, CacheEntry<V>>,
    ttl: Duration,
    max_entries: usize,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let ttl = self.ttl;
        // remove_if takes the shard lock itself; no guard may be alive here.
        self.entries
            .remove_if(key, |_, entry| entry.inserted_at.elapsed() >= ttl);
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn insert(&self, key: CacheKey, value: V) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.evict();
        }
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict(&self) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| entry.inserted_at.elapsed() < ttl);

        if self.entries.len() >= self.max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().inserted_at)
                .map(|entry| entry.key().clone());
            if let Some(key) = oldest {
                self.entries.remove(&key);
            }
        }
    }
}

/// Caches `list_conversations` results of the wrapped source. Transcript
/// detail lookups pass straight through.
pub struct CachedSource {
    inner: Arc<dyn ConversationSource>,
    lists: TtlCache<Vec<ConversationRecord>>,
}

impl CachedSource {
    pub const QUERY_TYPE: &'static str = "conversations";

    pub fn new(inner: Arc<dyn ConversationSource>, config: &CacheConfig) -> Self {
        Self {
            inner,
            lists: TtlCache::new(Duration::from_secs(config.ttl_seconds), config.max_entries),
        }
    }

    pub fn cached_entries(&self) -> usize {
        self.lists.len()
    }
}

#[async_trait]
impl ConversationSource for CachedSource {
    async fn list_conversations(
        &self,
        project_id: &str,
        range: &DateRange,
    ) -> Result<Vec<ConversationRecord>> {
        let key = CacheKey::new(Self::QUERY_TYPE, project_id, range);
        if let Some(records) = self.lists.get(&key) {
            tracing::debug!(key = %key, "Cache hit");
            return Ok(records);
        }

        let records = self.inner.list_conversations(project_id, range).await?;
        tracing::debug!(key = %key, records = records.len(), "Cache miss, stored");
        self.lists.insert(key, records.clone());
        Ok(records)
    }

    async fn get_conversation(&self, transcript_id: &str) -> Result<ConversationRecord> {
        self.inner.get_conversation(transcript_id).await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
