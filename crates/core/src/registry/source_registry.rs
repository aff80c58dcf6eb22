//! In-memory registry of configured sources.
//!
//! Each source lives in its own mutex, so writes to one source's counters are
//! serialized while different sources can be updated concurrently. The outer
//! lock only guards membership.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use log::{info, warn};

use crate::errors::{FetchError, Result};
use crate::models::{validate_priority, HealthStatus, Source, NEUTRAL_RELIABILITY};

use super::health::{HealthPolicy, HealthTracker};

#[derive(Debug)]
struct SourceRecord {
    source: Source,
    streaks: HealthTracker,
}

#[derive(Default)]
struct Inner {
    by_id: HashMap<String, Arc<Mutex<SourceRecord>>>,
    order: Vec<String>,
}

/// Thread-safe source registry.
pub struct SourceRegistry {
    inner: RwLock<Inner>,
    policy: HealthPolicy,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::with_policy(HealthPolicy::default())
    }

    pub fn with_policy(policy: HealthPolicy) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            policy,
        }
    }

    pub fn policy(&self) -> &HealthPolicy {
        &self.policy
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|poisoned| {
            warn!("Source registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|poisoned| {
            warn!("Source registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_record(record: &Mutex<SourceRecord>) -> MutexGuard<'_, SourceRecord> {
        record.lock().unwrap_or_else(|poisoned| {
            warn!("Source record lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn record(&self, id: &str) -> Result<Arc<Mutex<SourceRecord>>> {
        self.read()
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| FetchError::SourceNotFound(id.to_string()))
    }

    /// Applies `f` to one record under its own lock and returns the new snapshot.
    fn update<F>(&self, id: &str, f: F) -> Result<Source>
    where
        F: FnOnce(&mut SourceRecord, &HealthPolicy),
    {
        let record = self.record(id)?;
        let mut guard = Self::lock_record(&record);
        let before = guard.source.health_status;
        f(&mut *guard, &self.policy);
        let after = guard.source.health_status;
        if before != after {
            info!(
                "Source '{}' health {} -> {}",
                guard.source.name, before, after
            );
        }
        Ok(guard.source.clone())
    }

    /// Registers a new source. Ids must be unique.
    pub fn add(&self, source: Source) -> Result<()> {
        let mut inner = self.write();
        if inner.by_id.contains_key(&source.id) {
            return Err(FetchError::InvalidInput(format!(
                "source '{}' is already registered",
                source.id
            )));
        }
        let id = source.id.clone();
        inner.by_id.insert(
            id.clone(),
            Arc::new(Mutex::new(SourceRecord {
                source,
                streaks: HealthTracker::default(),
            })),
        );
        inner.order.push(id);
        Ok(())
    }

    /// Loads persisted sources, replacing any in-memory copy with the same id.
    pub fn restore(&self, sources: Vec<Source>) {
        let mut inner = self.write();
        for source in sources {
            let id = source.id.clone();
            let record = Arc::new(Mutex::new(SourceRecord {
                source,
                streaks: HealthTracker::default(),
            }));
            if inner.by_id.insert(id.clone(), record).is_none() {
                inner.order.push(id);
            }
        }
    }

    pub fn get_by_id(&self, id: &str) -> Result<Source> {
        let record = self.record(id)?;
        let guard = Self::lock_record(&record);
        Ok(guard.source.clone())
    }

    /// All sources in registration order.
    pub fn get_all(&self) -> Vec<Source> {
        let records: Vec<_> = {
            let inner = self.read();
            inner
                .order
                .iter()
                .filter_map(|id| inner.by_id.get(id).cloned())
                .collect()
        };
        records
            .iter()
            .map(|r| Self::lock_record(r).source.clone())
            .collect()
    }

    pub fn get_active(&self) -> Vec<Source> {
        self.get_all().into_iter().filter(|s| s.active).collect()
    }

    pub fn find_by_provider(&self, provider_id: &str) -> Option<Source> {
        self.get_all()
            .into_iter()
            .find(|s| s.provider_id == provider_id)
    }

    pub fn len(&self) -> usize {
        self.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn activate(&self, id: &str, at: DateTime<Utc>) -> Result<Source> {
        self.set_active(id, true, at)
    }

    pub fn deactivate(&self, id: &str, at: DateTime<Utc>) -> Result<Source> {
        self.set_active(id, false, at)
    }

    fn set_active(&self, id: &str, active: bool, at: DateTime<Utc>) -> Result<Source> {
        self.update(id, |record, _| {
            record.source.active = active;
            record.source.updated_at = at;
        })
    }

    /// Counts a success, folds `response_time_ms` into the running average and
    /// clears any throttle the provider had signalled.
    pub fn record_success(&self, id: &str, response_time_ms: u64, at: DateTime<Utc>) -> Result<Source> {
        self.update(id, |record, policy| {
            let source = &mut record.source;
            source.success_count = source.success_count.saturating_add(1);
            source.avg_response_time_ms +=
                (response_time_ms as f64 - source.avg_response_time_ms) / source.success_count as f64;
            source.recompute_reliability();
            source.health_status = record.streaks.on_success(source.health_status, policy);
            source.rate_budget.remaining = None;
            source.rate_budget.reset_at = None;
            source.updated_at = at;
        })
    }

    pub fn record_failure(&self, id: &str, reason: &str, at: DateTime<Utc>) -> Result<Source> {
        self.update(id, |record, policy| {
            let source = &mut record.source;
            source.failure_count = source.failure_count.saturating_add(1);
            source.recompute_reliability();
            source.health_status = record.streaks.on_failure(source.health_status, policy);
            source.last_error = Some(reason.to_string());
            source.updated_at = at;
        })
    }

    /// Records a probe outcome and stamps `last_health_check`.
    pub fn record_health_check(
        &self,
        id: &str,
        healthy: bool,
        response_time_ms: u64,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Source> {
        if healthy {
            self.record_success(id, response_time_ms, at)?;
        } else {
            self.record_failure(id, reason.unwrap_or("health check failed"), at)?;
        }
        self.update(id, |record, _| {
            record.source.last_health_check = Some(at);
        })
    }

    /// Marks the provider quota as spent until `reset_at`.
    pub fn record_throttle(
        &self,
        id: &str,
        reset_at: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> Result<Source> {
        self.update(id, |record, _| {
            record.source.rate_budget.remaining = Some(0);
            record.source.rate_budget.reset_at = reset_at;
            record.source.updated_at = at;
        })
    }

    /// Resets counters, latency, reliability and streaks.
    pub fn rotate_counters(&self, id: &str, at: DateTime<Utc>) -> Result<Source> {
        self.update(id, |record, _| {
            let source = &mut record.source;
            source.success_count = 0;
            source.failure_count = 0;
            source.avg_response_time_ms = 0.0;
            source.reliability_score = NEUTRAL_RELIABILITY;
            source.health_status = HealthStatus::Unknown;
            source.last_error = None;
            source.updated_at = at;
            record.streaks.reset();
        })
    }

    pub fn update_priority(&self, id: &str, priority: u8, at: DateTime<Utc>) -> Result<Source> {
        validate_priority(priority)?;
        self.update(id, |record, _| {
            record.source.priority = priority;
            record.source.updated_at = at;
        })
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
