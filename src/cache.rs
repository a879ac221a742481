//! In-memory schema metadata cache.
//!
//! One flat namespace holds two kinds of entries: `table → owning stable` and
//! `stable → descriptor`. Table and supertable names therefore must not
//! collide, which TDengine already guarantees within a database.
//!
//! Entries live until deleted unless a TTL was configured. The map is a
//! [`DashMap`], so lookups from many threads do not serialize on one lock.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::schema::StableDescriptor;

/// A cached schema fact.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEntry {
    /// A child table and the supertable it was created from.
    Table(String),
    /// A supertable and its field layout.
    Stable(Arc<StableDescriptor>),
}

#[derive(Debug, Clone)]
struct Slot {
    entry: CacheEntry,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Concurrent key/value cache of schema metadata.
#[derive(Debug, Default)]
pub struct SchemaCache {
    entries: DashMap<String, Slot>,
    ttl: Option<Duration>,
}

impl SchemaCache {
    /// Creates a cache whose entries never expire.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache applying `ttl` to every entry set without an explicit
    /// TTL. `None` keeps entries until deleted.
    pub fn with_ttl(ttl: Option<Duration>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Returns the live entry for `key`. Expired entries are evicted on read.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let now = Instant::now();
        if let Some(slot) = self.entries.get(key) {
            if !slot.is_expired(now) {
                return Some(slot.entry.clone());
            }
        } else {
            return None;
        }
        self.entries.remove_if(key, |_, slot| slot.is_expired(now));
        None
    }

    /// Stores an entry using the cache-wide TTL.
    pub fn set(&self, key: impl Into<String>, entry: CacheEntry) {
        self.set_with_ttl(key, entry, self.ttl);
    }

    /// Stores an entry with its own TTL (`None` = no expiry).
    pub fn set_with_ttl(&self, key: impl Into<String>, entry: CacheEntry, ttl: Option<Duration>) {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries.insert(key.into(), Slot { entry, expires_at });
    }

    pub fn delete(&self, key: &str) -> Option<CacheEntry> {
        self.entries.remove(key).map(|(_, slot)| slot.entry)
    }

    /// Returns the supertable cached for `table`.
    pub fn table_stable(&self, table: &str) -> Option<String> {
        match self.get(table)? {
            CacheEntry::Table(stable) => Some(stable),
            CacheEntry::Stable(_) => None,
        }
    }

    /// Returns the descriptor cached for `stable`.
    pub fn stable(&self, stable: &str) -> Option<Arc<StableDescriptor>> {
        match self.get(stable)? {
            CacheEntry::Stable(desc) => Some(desc),
            CacheEntry::Table(_) => None,
        }
    }

    pub fn set_table(&self, table: impl Into<String>, stable: impl Into<String>) {
        self.set(table, CacheEntry::Table(stable.into()));
    }

    pub fn set_stable(&self, stable: impl Into<String>, desc: Arc<StableDescriptor>) {
        self.set(stable, CacheEntry::Stable(desc));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
