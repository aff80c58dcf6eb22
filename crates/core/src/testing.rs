//! Test doubles shared by unit tests across the crate.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::errors::{FetchError, Result};
use crate::fetch::SessionSnapshot;
use crate::models::{
    AuthRequirement, AutoConfig, CachedEntry, InflationReading, PayloadFormat, Period, Source,
};
use crate::provider::{InflationProvider, PeriodSupport, ProviderDescriptor, RateLimit};
use crate::secrets::CredentialProvider;
use crate::store::{AutoConfigStore, CacheStore, SessionStore, SourceStore};

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

// =============================================================================
// In-memory store
// =============================================================================

#[derive(Default)]
pub(crate) struct MemoryStore {
    sources: Mutex<HashMap<String, Source>>,
    sessions: Mutex<HashMap<String, SessionSnapshot>>,
    cache: Mutex<HashMap<Period, CachedEntry>>,
    configs: Mutex<HashMap<String, AutoConfig>>,
    pub source_writes: AtomicUsize,
    pub session_writes: AtomicUsize,
    pub cache_writes: AtomicUsize,
    pub config_writes: AtomicUsize,
    fail_writes: AtomicBool,
    fail_cache_writes: AtomicBool,
    latency_ms: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every write fail with a storage error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes only cache-entry writes fail.
    pub fn fail_cache_writes(&self, fail: bool) {
        self.fail_cache_writes.store(fail, Ordering::SeqCst);
    }

    /// Delays session saves and auto-config calls, opening the windows where
    /// concurrent callers interleave.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    async fn pause(&self) {
        let ms = self.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    fn check_write(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(FetchError::Storage("disk I/O error".to_string()));
        }
        Ok(())
    }

    pub fn config_count(&self) -> usize {
        lock(&self.configs).len()
    }

    pub fn stored_session(&self, id: &str) -> Option<SessionSnapshot> {
        lock(&self.sessions).get(id).cloned()
    }

    pub fn stored_entry(&self, period: &Period) -> Option<CachedEntry> {
        lock(&self.cache).get(period).cloned()
    }
}

#[async_trait]
impl SourceStore for MemoryStore {
    async fn save_source(&self, source: &Source) -> Result<()> {
        self.check_write()?;
        self.source_writes.fetch_add(1, Ordering::SeqCst);
        lock(&self.sources).insert(source.id.clone(), source.clone());
        Ok(())
    }

    async fn load_sources(&self) -> Result<Vec<Source>> {
        let mut sources: Vec<_> = lock(&self.sources).values().cloned().collect();
        sources.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(sources)
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn save_session(&self, session: &SessionSnapshot) -> Result<()> {
        self.pause().await;
        self.check_write()?;
        self.session_writes.fetch_add(1, Ordering::SeqCst);
        lock(&self.sessions).insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<SessionSnapshot>> {
        Ok(lock(&self.sessions).get(id).cloned())
    }

    async fn list_sessions(
        &self,
        period: Option<&Period>,
        limit: usize,
    ) -> Result<Vec<SessionSnapshot>> {
        let mut sessions: Vec<_> = lock(&self.sessions)
            .values()
            .filter(|s| period.map(|p| s.period == *p).unwrap_or(true))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions.truncate(limit);
        Ok(sessions)
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn save_cached_entry(&self, entry: &CachedEntry) -> Result<()> {
        self.check_write()?;
        if self.fail_cache_writes.load(Ordering::SeqCst) {
            return Err(FetchError::Storage("database is locked".to_string()));
        }
        self.cache_writes.fetch_add(1, Ordering::SeqCst);
        lock(&self.cache).insert(entry.period, entry.clone());
        Ok(())
    }

    async fn load_cached_entries(&self) -> Result<Vec<CachedEntry>> {
        Ok(lock(&self.cache).values().cloned().collect())
    }

    async fn delete_cached_entry(&self, period: &Period) -> Result<()> {
        self.check_write()?;
        lock(&self.cache).remove(period);
        Ok(())
    }
}

#[async_trait]
impl AutoConfigStore for MemoryStore {
    async fn get_auto_config(&self, name: &str) -> Result<Option<AutoConfig>> {
        self.pause().await;
        Ok(lock(&self.configs).get(name).cloned())
    }

    async fn insert_auto_config(&self, config: &AutoConfig) -> Result<()> {
        self.pause().await;
        self.check_write()?;
        let mut configs = lock(&self.configs);
        if configs.contains_key(&config.name) {
            return Err(FetchError::Storage(format!(
                "UNIQUE constraint failed: auto_configs.name ({})",
                config.name
            )));
        }
        self.config_writes.fetch_add(1, Ordering::SeqCst);
        configs.insert(config.name.clone(), config.clone());
        Ok(())
    }

    async fn update_auto_config(&self, config: &AutoConfig) -> Result<()> {
        self.check_write()?;
        self.config_writes.fetch_add(1, Ordering::SeqCst);
        lock(&self.configs).insert(config.name.clone(), config.clone());
        Ok(())
    }
}

// =============================================================================
// Scripted provider
// =============================================================================

pub(crate) const MOCK_RATE: Decimal = dec!(68.50);
pub(crate) const MOCK_MONTHLY_RATE: Decimal = dec!(3.16);

/// Provider whose fetch outcomes are scripted. Once the script runs out,
/// every call uses the default outcome.
pub(crate) struct MockProvider {
    id: &'static str,
    name: String,
    attribution: Option<String>,
    support: PeriodSupport,
    script: Mutex<VecDeque<Result<Decimal>>>,
    default: Mutex<Result<Decimal>>,
    fetch_delay: Duration,
    probe_ok: bool,
    probe_delay: Duration,
    pub fetch_calls: AtomicUsize,
    pub probe_calls: AtomicUsize,
}

impl MockProvider {
    pub fn new(id: &'static str, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            attribution: None,
            support: PeriodSupport::ALL,
            script: Mutex::new(VecDeque::new()),
            default: Mutex::new(Ok(MOCK_RATE)),
            fetch_delay: Duration::ZERO,
            probe_ok: true,
            probe_delay: Duration::ZERO,
            fetch_calls: AtomicUsize::new(0),
            probe_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_rate(self, rate: Decimal) -> Self {
        *lock(&self.default) = Ok(rate);
        self
    }

    /// Every fetch fails with `error`.
    pub fn failing(self, error: FetchError) -> Self {
        *lock(&self.default) = Err(error);
        self
    }

    /// Outcomes for the next calls, in order.
    pub fn script(self, outcomes: Vec<Result<Decimal>>) -> Self {
        lock(&self.script).extend(outcomes);
        self
    }

    pub fn set_default(&self, outcome: Result<Decimal>) {
        *lock(&self.default) = outcome;
    }

    pub fn attributed_to(mut self, name: &str) -> Self {
        self.attribution = Some(name.to_string());
        self
    }

    pub fn annual_only(mut self) -> Self {
        self.support = PeriodSupport::ANNUAL_ONLY;
        self
    }

    pub fn fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    pub fn probe_fails(mut self) -> Self {
        self.probe_ok = false;
        self
    }

    pub fn probe_delay(mut self, delay: Duration) -> Self {
        self.probe_delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InflationProvider for MockProvider {
    fn id(&self) -> &'static str {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            endpoint: format!("mock://{}", self.id),
            series_code: "TP.FG.J0".to_string(),
            format: PayloadFormat::Json,
            auth: AuthRequirement::None,
        }
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit {
            requests_per_minute: 6000,
            burst_capacity: 100.0,
        }
    }

    fn period_support(&self) -> PeriodSupport {
        self.support
    }

    async fn fetch(
        &self,
        series_code: &str,
        period: &Period,
        _credential: Option<&str>,
    ) -> Result<InflationReading> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }
        let outcome = lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| lock(&self.default).clone());
        let rate = outcome?;
        let source = self.attribution.clone().unwrap_or_else(|| self.name.clone());
        let mut reading = InflationReading::new(*period, rate, source, series_code, Utc::now());
        if period.is_monthly() {
            reading = reading.with_monthly_rate(MOCK_MONTHLY_RATE);
        }
        Ok(reading)
    }

    async fn probe(&self, _credential: Option<&str>) -> Result<()> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        if !self.probe_delay.is_zero() {
            tokio::time::sleep(self.probe_delay).await;
        }
        if self.probe_ok {
            Ok(())
        } else {
            Err(FetchError::Network(format!("{}: connection refused", self.id)))
        }
    }
}

// =============================================================================
// Credentials
// =============================================================================

#[derive(Default)]
pub(crate) struct StaticCredentials {
    secrets: HashMap<String, String>,
}

impl StaticCredentials {
    pub fn with(mut self, source_id: &str, secret: &str) -> Self {
        self.secrets.insert(source_id.to_string(), secret.to_string());
        self
    }
}

impl CredentialProvider for StaticCredentials {
    fn get_active_credential(&self, source_id: &str) -> Result<Option<String>> {
        Ok(self.secrets.get(source_id).cloned())
    }
}
