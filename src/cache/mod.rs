//! LRU + TTL cache of prepared statements, keyed by literal SQL text.
//!
//! The cache owns every statement it hands out through a [`StatementArena`]; callers hold
//! [`StatementId`] handles. Keys are compared byte for byte: `"SELECT 1"` and `"SELECT  1"`
//! are different entries. Callers who want whitespace-insensitive keys can normalise with
//! [`crate::hash::normalize_sql`] before calling in.

mod arena;

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::statement::Statement;

pub use arena::{StatementArena, StatementId};

pub const DEFAULT_MAX_SIZE: usize = 100;

/// Counters reported by [`StatementCache::get_stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub evictions: u64,
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    id: StatementId,
    created_at: u64,
    last_access: u64,
    seq: u64,
}

pub struct StatementCache {
    entries: HashMap<String, CacheEntry>,
    arena: StatementArena,
    max_size: usize,
    ttl_ms: u64,
    clock: Arc<dyn Clock>,
    next_seq: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl Default for StatementCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE, 0)
    }
}

impl StatementCache {
    /// `max_size` below 1 is raised to 1; a `ttl_ms` of 0 disables expiry.
    #[must_use]
    pub fn new(max_size: usize, ttl_ms: u64) -> Self {
        Self::with_clock(max_size, ttl_ms, Arc::new(SystemClock::default()))
    }

    #[must_use]
    pub fn with_clock(max_size: usize, ttl_ms: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            arena: StatementArena::new(),
            max_size: max_size.max(1),
            ttl_ms,
            clock,
            next_seq: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    #[must_use]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    #[must_use]
    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, entry: &CacheEntry, now: u64) -> bool {
        self.ttl_ms > 0 && now.saturating_sub(entry.last_access) > self.ttl_ms
    }

    /// Free the statement behind `id`. Errors while finalizing are logged; the slot is gone
    /// either way.
    fn discard(&mut self, sql: &str, id: StatementId) {
        if let Some(mut statement) = self.arena.remove(id)
            && let Err(err) = statement.free()
        {
            warn!(sql, error = %err, "failed to free evicted statement");
        }
    }

    /// Look up a statement by its exact SQL text.
    ///
    /// An entry idle for longer than the TTL is evicted, freed, and reported as a miss.
    pub fn get(&mut self, sql: &str) -> Option<StatementId> {
        let now = self.clock.now_ms();
        let Some(entry) = self.entries.get(sql).copied() else {
            self.misses += 1;
            return None;
        };
        if self.is_expired(&entry, now) {
            self.entries.remove(sql);
            self.discard(sql, entry.id);
            self.misses += 1;
            debug!(sql, "statement cache entry expired");
            return None;
        }
        if let Some(live) = self.entries.get_mut(sql) {
            live.last_access = now;
        }
        self.hits += 1;
        Some(entry.id)
    }

    /// Insert `statement` under `sql`, returning its handle.
    ///
    /// Replacing an existing key frees the old statement. Inserting a new key into a full
    /// cache first evicts the least recently accessed entry.
    pub fn set(&mut self, sql: &str, statement: Statement) -> StatementId {
        let now = self.clock.now_ms();

        if let Some(existing) = self.entries.get(sql).copied() {
            self.discard(sql, existing.id);
            let id = self.arena.insert(statement);
            self.entries.insert(
                sql.to_owned(),
                CacheEntry {
                    id,
                    created_at: now,
                    last_access: now,
                    seq: existing.seq,
                },
            );
            return id;
        }

        if self.entries.len() >= self.max_size {
            self.evict_least_recent();
        }

        let id = self.arena.insert(statement);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            sql.to_owned(),
            CacheEntry {
                id,
                created_at: now,
                last_access: now,
                seq,
            },
        );
        id
    }

    fn evict_least_recent(&mut self) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| (entry.last_access, entry.seq))
            .map(|(sql, entry)| (sql.clone(), entry.id));
        if let Some((sql, id)) = victim {
            self.entries.remove(&sql);
            self.discard(&sql, id);
            self.evictions += 1;
            debug!(sql = %sql, "evicted least recently used statement");
        }
    }

    /// Remove and free one entry. Returns whether it existed.
    pub fn delete(&mut self, sql: &str) -> bool {
        match self.entries.remove(sql) {
            Some(entry) => {
                self.discard(sql, entry.id);
                true
            }
            None => false,
        }
    }

    /// Remove and free every entry. Counters are kept.
    pub fn clear(&mut self) {
        let drained: Vec<(String, CacheEntry)> = self.entries.drain().collect();
        for (sql, entry) in drained {
            self.discard(&sql, entry.id);
        }
    }

    /// Sweep every expired entry now instead of waiting for the next lookup.
    pub fn purge_expired(&mut self) -> usize {
        if self.ttl_ms == 0 {
            return 0;
        }
        let now = self.clock.now_ms();
        let expired: Vec<(String, StatementId)> = self
            .entries
            .iter()
            .filter(|(_, entry)| self.is_expired(entry, now))
            .map(|(sql, entry)| (sql.clone(), entry.id))
            .collect();
        for (sql, id) in &expired {
            self.entries.remove(sql);
            self.discard(sql, *id);
        }
        expired.len()
    }

    #[must_use]
    pub fn get_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            size: self.entries.len(),
            evictions: self.evictions,
        }
    }

    pub fn statement_mut(&mut self, id: StatementId) -> Option<&mut Statement> {
        self.arena.get_mut(id)
    }

    #[must_use]
    pub fn is_live(&self, id: StatementId) -> bool {
        self.arena.contains(id)
    }

    /// Remove whichever entry owns `id` and free its statement.
    pub fn release(&mut self, id: StatementId) -> bool {
        let key = self
            .entries
            .iter()
            .find(|(_, entry)| entry.id == id)
            .map(|(sql, _)| sql.clone());
        match key {
            Some(sql) => self.delete(&sql),
            None => false,
        }
    }

    /// Age of an entry in milliseconds, measured from its last insertion.
    #[must_use]
    pub fn age_ms(&self, sql: &str) -> Option<u64> {
        let now = self.clock.now_ms();
        self.entries
            .get(sql)
            .map(|entry| now.saturating_sub(entry.created_at))
    }
}

impl Drop for StatementCache {
    fn drop(&mut self) {
        self.clear();
    }
}
