//! In-process key-value store with TTL expiry
//!
//! Entries carry their insertion instant and lifetime; expired entries are
//! evicted lazily on read and in bulk by [`MemoryStore::evict_expired`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::store::KeyValueStore;
use crate::Result;

/// Thread-safe in-memory store with TTL expiry
pub struct MemoryStore {
    /// Entries keyed by cache key
    entries: DashMap<String, StoredEntry>,
    /// Total evictions (expired entries removed)
    evictions: AtomicU64,
}

/// A stored payload with TTL metadata
struct StoredEntry {
    /// Raw payload bytes
    value: Vec<u8>,
    /// When this entry was written
    stored_at: Instant,
    /// Time-to-live duration
    ttl: Duration,
}

impl StoredEntry {
    /// Check if this entry has expired
    fn is_expired(&self) -> bool {
        Instant::now().duration_since(self.stored_at) >= self.ttl
    }
}

impl MemoryStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            evictions: AtomicU64::new(0),
        }
    }

    /// Number of entries currently held, expired or not
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of evicted entries
    #[must_use]
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Evict expired entries (background maintenance)
    ///
    /// Returns the number of entries removed.
    pub fn evict_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let count = before.saturating_sub(self.entries.len());

        if count > 0 {
            self.evictions.fetch_add(count as u64, Ordering::Relaxed);
        }
        count
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let Some(entry) = self.entries.get(key) else {
            return Ok(None);
        };

        if entry.is_expired() {
            drop(entry);
            // Re-check under the write lock; a concurrent writer may have refreshed it
            if self
                .entries
                .remove_if(key, |_, entry| entry.is_expired())
                .is_some()
            {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
            return Ok(None);
        }

        Ok(Some(entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let entry = StoredEntry {
            value: value.to_vec(),
            stored_at: Instant::now(),
            ttl,
        };
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}
