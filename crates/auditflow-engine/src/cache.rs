//! Node result cache
//!
//! Results of cacheable nodes are memoized under a key derived from the node
//! type, its bound inputs and its config. Two invocations with the same
//! triple are interchangeable, so the second one skips the node body.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::time::Instant;

use crate::types::{NodeConfig, NodeInputs, NodeOutputs};

/// Content hash identifying a node invocation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Hash `(node_type, inputs, config)`
    ///
    /// Maps are serialized with sorted keys so insertion order never changes
    /// the key.
    pub fn compute(
        node_type: &str,
        inputs: &NodeInputs,
        config: &NodeConfig,
    ) -> Result<Self, serde_json::Error> {
        let sorted_inputs: BTreeMap<&String, &serde_json::Value> = inputs.iter().collect();

        let mut hasher = blake3::Hasher::new();
        hasher.update(node_type.as_bytes());
        hasher.update(&[0]);
        serde_json::to_writer(&mut hasher, &sorted_inputs)?;
        hasher.update(&[0]);
        serde_json::to_writer(&mut hasher, config)?;

        Ok(Self(hasher.finalize().to_hex().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cache hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Storage for memoized node outputs
///
/// Implementations may be remote (a key-value service), hence async.
#[async_trait]
pub trait ResultCache: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Option<NodeOutputs>;

    async fn put(&self, key: CacheKey, outputs: NodeOutputs);

    /// Remove one entry, returning whether it existed
    async fn invalidate(&self, key: &CacheKey) -> bool;

    async fn clear(&self);

    fn stats(&self) -> CacheStats;
}

struct CacheEntry {
    outputs: NodeOutputs,
    inserted: Instant,
}

/// Process-local cache with optional TTL and size bound
pub struct InMemoryCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    ttl: Option<Duration>,
    max_entries: Option<usize>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl InMemoryCache {
    /// Unbounded cache whose entries never expire
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: None,
            max_entries: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Bound the number of entries; the oldest entry is evicted first
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max.max(1));
        self
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        self.ttl.is_some_and(|ttl| entry.inserted.elapsed() >= ttl)
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResultCache for InMemoryCache {
    async fn get(&self, key: &CacheKey) -> Option<NodeOutputs> {
        let expired = {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if !self.is_expired(entry) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.outputs.clone());
                }
                Some(_) => true,
                None => false,
            }
        };
        if expired {
            self.entries.write().remove(key);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    async fn put(&self, key: CacheKey, outputs: NodeOutputs) {
        let mut entries = self.entries.write();
        if let Some(max) = self.max_entries {
            if !entries.contains_key(&key) && entries.len() >= max {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, e)| e.inserted)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }
        entries.insert(
            key,
            CacheEntry {
                outputs,
                inserted: Instant::now(),
            },
        );
    }

    async fn invalidate(&self, key: &CacheKey) -> bool {
        self.entries.write().remove(key).is_some()
    }

    async fn clear(&self) {
        self.entries.write().clear();
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.read().len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
