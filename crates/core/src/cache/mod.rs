//! TTL cache of accepted inflation values.
//!
//! Keyed by period. Lookups only touch the map shard for that key and never
//! block on I/O. Expired entries are dropped lazily on lookup or in bulk by
//! [`InflationCache::purge_expired`].

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Duration;
use dashmap::DashMap;
use log::debug;

use crate::clock::Clock;
use crate::models::{CachedEntry, InflationReading, Period, DEFAULT_CACHE_TTL_HOURS};

pub struct InflationCache {
    entries: DashMap<Period, CachedEntry>,
    ttl_seconds: AtomicI64,
    clock: Arc<dyn Clock>,
}

impl InflationCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_ttl(clock, Duration::hours(DEFAULT_CACHE_TTL_HOURS as i64))
    }

    pub fn with_ttl(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl_seconds: AtomicI64::new(ttl.num_seconds()),
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::seconds(self.ttl_seconds.load(Ordering::Relaxed))
    }

    /// Changes the TTL for entries written from now on.
    pub fn set_ttl(&self, ttl: Duration) {
        self.ttl_seconds.store(ttl.num_seconds(), Ordering::Relaxed);
    }

    /// Returns the entry for `period` if `now < expires_at`.
    pub fn get(&self, period: &Period) -> Option<CachedEntry> {
        let now = self.clock.now();
        let hit = self.entries.get(period).map(|e| e.value().clone())?;
        if hit.is_expired(now) {
            self.entries
                .remove_if(period, |_, entry| entry.is_expired(now));
            debug!("Cache entry for {} expired", period);
            return None;
        }
        Some(hit)
    }

    /// Stores an accepted reading, expiring one TTL from now.
    pub fn set(&self, reading: InflationReading, quality_score: f64, validated: bool) -> CachedEntry {
        let entry = CachedEntry::from_reading(
            reading,
            quality_score,
            validated,
            self.ttl(),
            self.clock.now(),
        );
        self.entries.insert(entry.period, entry.clone());
        entry
    }

    /// Loads persisted entries, skipping expired ones. Returns how many were kept.
    pub fn warm(&self, entries: Vec<CachedEntry>) -> usize {
        let now = self.clock.now();
        let mut kept = 0;
        for entry in entries.into_iter().filter(|e| !e.is_expired(now)) {
            self.entries.insert(entry.period, entry);
            kept += 1;
        }
        kept
    }

    pub fn invalidate(&self, period: &Period) -> bool {
        self.entries.remove(period).is_some()
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
