//! Source ranking, health checks and outcome recording.
//!
//! The manager is the only writer of source bookkeeping. Every recording
//! operation mutates the in-memory registry first and then persists the new
//! snapshot; a store failure is returned to the caller but the in-memory
//! state is kept.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::errors::{FetchError, Result};
use crate::models::{HealthStatus, NewSource, Period, Source, SourceHealthSummary};
use crate::provider::{ProviderSet, RateLimit};
use crate::secrets::CredentialProvider;
use crate::store::SourceStore;

use super::rate_limiter::RateLimiter;
use super::source_registry::SourceRegistry;

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Which sources the fallback loop may try.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Every active source, whatever its health.
    #[default]
    AllActive,
    /// Active sources that are not `failed`.
    ExcludeFailed,
    /// Active sources that are `healthy` or not yet assessed (`unknown`).
    HealthyOnly,
}

impl FallbackPolicy {
    pub fn admits(&self, status: HealthStatus) -> bool {
        match self {
            Self::AllActive => true,
            Self::ExcludeFailed => status != HealthStatus::Failed,
            Self::HealthyOnly => matches!(status, HealthStatus::Healthy | HealthStatus::Unknown),
        }
    }
}

impl fmt::Display for FallbackPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AllActive => "all_active",
            Self::ExcludeFailed => "exclude_failed",
            Self::HealthyOnly => "healthy_only",
        })
    }
}

impl FromStr for FallbackPolicy {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all_active" => Ok(Self::AllActive),
            "exclude_failed" => Ok(Self::ExcludeFailed),
            "healthy_only" => Ok(Self::HealthyOnly),
            other => Err(FetchError::InvalidInput(format!(
                "unknown fallback policy '{}'",
                other
            ))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ManagerConfig {
    /// Bound on a single liveness probe.
    pub probe_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

/// Result of probing one source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckOutcome {
    pub source_id: String,
    pub source: String,
    pub healthy: bool,
    /// True when the source could not be probed (no adapter or credential)
    /// and its bookkeeping was left untouched.
    pub skipped: bool,
    pub response_time_ms: u64,
    pub health_status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct SourceManager {
    registry: Arc<SourceRegistry>,
    store: Arc<dyn SourceStore>,
    providers: ProviderSet,
    credentials: Arc<dyn CredentialProvider>,
    rate_limiter: Arc<RateLimiter>,
    config: ManagerConfig,
    clock: Arc<dyn Clock>,
}

impl SourceManager {
    pub fn new(
        registry: Arc<SourceRegistry>,
        store: Arc<dyn SourceStore>,
        providers: ProviderSet,
        credentials: Arc<dyn CredentialProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            store,
            providers,
            credentials,
            rate_limiter: Arc::new(RateLimiter::new()),
            config: ManagerConfig::default(),
            clock,
        }
    }

    pub fn with_config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    pub fn providers(&self) -> &ProviderSet {
        &self.providers
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// The credential for `source`, `None` when it needs none or has none.
    pub fn credential_for(&self, source: &Source) -> Result<Option<String>> {
        if !source.auth.is_required() {
            return Ok(None);
        }
        self.credential_for_id(&source.id)
    }

    /// Credential lookup by source id, for sources not registered yet.
    pub fn credential_for_id(&self, source_id: &str) -> Result<Option<String>> {
        self.credentials.get_active_credential(source_id)
    }

    fn configure_limiter(&self, source: &Source) {
        let burst = self
            .providers
            .get(&source.provider_id)
            .map(|p| p.rate_limit().burst_capacity)
            .unwrap_or_else(|| RateLimit::default().burst_capacity);
        self.rate_limiter.configure(
            &source.id,
            RateLimit {
                requests_per_minute: source.rate_budget.requests_per_minute,
                burst_capacity: burst,
            },
        );
    }

    async fn persist(&self, source: Source) -> Result<Source> {
        if let Err(e) = self.store.save_source(&source).await {
            warn!("Failed to persist source '{}': {}", source.id, e);
            return Err(e);
        }
        Ok(source)
    }

    /// Loads persisted sources into the registry.
    pub async fn load_from_store(&self) -> Result<usize> {
        let sources = self.store.load_sources().await?;
        for source in &sources {
            self.configure_limiter(source);
        }
        let count = sources.len();
        self.registry.restore(sources);
        debug!("Loaded {} sources from store", count);
        Ok(count)
    }

    /// Validates, registers and persists a new source.
    pub async fn register_source(&self, new_source: NewSource) -> Result<Source> {
        let Some(provider) = self.providers.get(&new_source.provider_id) else {
            return Err(FetchError::InvalidInput(format!(
                "no adapter for provider '{}'",
                new_source.provider_id
            )));
        };
        let source = Source::new(new_source, self.now())?;
        if source.name != provider.name() {
            warn!(
                "Source '{}' is named differently from its adapter '{}'; attribution checks will reject its data",
                source.name,
                provider.name()
            );
        }
        self.registry.add(source.clone())?;
        self.configure_limiter(&source);
        info!("Registered source '{}' ({})", source.name, source.id);
        self.persist(source).await
    }

    /// Top candidate for `period`: active, not failed, adapter serves the period.
    pub fn get_best_source(&self, period: &Period) -> Option<Source> {
        self.get_source_priority_order()
            .into_iter()
            .filter(|s| s.health_status != HealthStatus::Failed)
            .find(|s| self.serves(s, period))
    }

    /// All active sources, any health, by (priority asc, reliability desc, latency asc).
    pub fn get_source_priority_order(&self) -> Vec<Source> {
        let mut sources = self.registry.get_active();
        sources.sort_by(|a, b| a.rank_cmp(b));
        sources
    }

    /// Priority order filtered by `policy`.
    pub fn get_fallback_order(&self, policy: FallbackPolicy) -> Vec<Source> {
        self.get_source_priority_order()
            .into_iter()
            .filter(|s| policy.admits(s.health_status))
            .collect()
    }

    /// Whether a registered adapter can serve `period` for `source`.
    pub fn serves(&self, source: &Source, period: &Period) -> bool {
        self.providers
            .get(&source.provider_id)
            .map(|p| p.supports_period(period))
            .unwrap_or(false)
    }

    pub async fn mark_source_failed(&self, id: &str, reason: &str) -> Result<Source> {
        let source = self.registry.record_failure(id, reason, self.now())?;
        self.persist(source).await
    }

    pub async fn mark_source_success(&self, id: &str, response_time_ms: u64) -> Result<Source> {
        let source = self.registry.record_success(id, response_time_ms, self.now())?;
        self.persist(source).await
    }

    pub async fn update_source_health(
        &self,
        id: &str,
        healthy: bool,
        response_time_ms: u64,
    ) -> Result<Source> {
        let source =
            self.registry
                .record_health_check(id, healthy, response_time_ms, None, self.now())?;
        self.persist(source).await
    }

    /// Marks the source's quota spent until `reset_at`.
    pub async fn record_throttle(&self, id: &str, reset_at: Option<DateTime<Utc>>) -> Result<Source> {
        let source = self.registry.record_throttle(id, reset_at, self.now())?;
        self.persist(source).await
    }

    pub async fn set_active(&self, id: &str, active: bool) -> Result<Source> {
        let source = if active {
            self.registry.activate(id, self.now())?
        } else {
            self.registry.deactivate(id, self.now())?
        };
        info!(
            "Source '{}' {}",
            source.name,
            if active { "activated" } else { "deactivated" }
        );
        self.persist(source).await
    }

    pub async fn rotate_counters(&self, id: &str) -> Result<Source> {
        let source = self.registry.rotate_counters(id, self.now())?;
        info!("Rotated counters of source '{}'", source.name);
        self.persist(source).await
    }

    pub async fn update_priority(&self, id: &str, priority: u8) -> Result<Source> {
        let source = self.registry.update_priority(id, priority, self.now())?;
        self.persist(source).await
    }

    /// Health overview of every registered source, ranked.
    pub fn health_summary(&self) -> Vec<SourceHealthSummary> {
        let mut sources = self.registry.get_all();
        sources.sort_by(|a, b| a.rank_cmp(b));
        sources.iter().map(SourceHealthSummary::from).collect()
    }

    /// Probes every active source concurrently.
    ///
    /// Each probe is bounded by the configured timeout. Outcomes are recorded
    /// through the per-source write path as each probe completes.
    pub async fn run_health_checks(&self) -> Vec<HealthCheckOutcome> {
        let sources = self.registry.get_active();
        let probes = sources.into_iter().map(|source| self.check_source(source));
        let outcomes = join_all(probes).await;
        let healthy = outcomes.iter().filter(|o| o.healthy).count();
        info!("Health checks: {}/{} sources healthy", healthy, outcomes.len());
        outcomes
    }

    async fn check_source(&self, source: Source) -> HealthCheckOutcome {
        let skipped = |error: String| HealthCheckOutcome {
            source_id: source.id.clone(),
            source: source.name.clone(),
            healthy: false,
            skipped: true,
            response_time_ms: 0,
            health_status: source.health_status,
            error: Some(error),
        };

        let Some(provider) = self.providers.get(&source.provider_id) else {
            return skipped(format!("no adapter for provider '{}'", source.provider_id));
        };
        let credential = match self.credential_for(&source) {
            Ok(Some(credential)) => Some(credential),
            Ok(None) if source.auth.is_required() => {
                return skipped(FetchError::MissingCredential(source.id.clone()).to_string())
            }
            Ok(None) => None,
            Err(e) => return skipped(e.to_string()),
        };

        let started = Instant::now();
        let result = match tokio::time::timeout(
            self.config.probe_timeout,
            provider.probe(credential.as_deref()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                source_name: source.name.clone(),
                timeout_ms: self.config.probe_timeout.as_millis() as u64,
            }),
        };
        let elapsed = started.elapsed().as_millis() as u64;

        let error = result.err().map(|e| e.to_string());
        let healthy = error.is_none();
        let now = self.now();
        let health_status = match self.registry.record_health_check(
            &source.id,
            healthy,
            elapsed,
            error.as_deref(),
            now,
        ) {
            Ok(updated) => {
                let status = updated.health_status;
                if let Err(e) = self.persist(updated).await {
                    debug!("Health check outcome of '{}' not persisted: {}", source.id, e);
                }
                status
            }
            Err(e) => {
                warn!("Health check for '{}' not recorded: {}", source.id, e);
                source.health_status
            }
        };

        HealthCheckOutcome {
            source_id: source.id.clone(),
            source: source.name.clone(),
            healthy,
            skipped: false,
            response_time_ms: elapsed,
            health_status,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::models::{AuthRequirement, PayloadFormat, RateBudget};
    use crate::provider::InflationProvider;
    use crate::testing::{MemoryStore, MockProvider, StaticCredentials};
    use proptest::prelude::*;
    use std::sync::atomic::Ordering;

    fn new_source(id: &str, provider_id: &str, name: &str, priority: u8) -> NewSource {
        NewSource {
            id: Some(id.to_string()),
            provider_id: provider_id.to_string(),
            name: name.to_string(),
            endpoint: String::new(),
            series_code: "TP.FG.J0".to_string(),
            format: PayloadFormat::Json,
            auth: AuthRequirement::None,
            rate_budget: RateBudget::default(),
            priority,
        }
    }

    fn manager(providers: Vec<Arc<MockProvider>>, store: Arc<MemoryStore>) -> SourceManager {
        let providers = providers
            .into_iter()
            .map(|p| p as Arc<dyn InflationProvider>)
            .collect();
        SourceManager::new(
            Arc::new(SourceRegistry::new()),
            store,
            ProviderSet::new(providers),
            Arc::new(StaticCredentials::default()),
            Arc::new(SystemClock),
        )
    }

    #[tokio::test]
    async fn test_register_rejects_unknown_provider() {
        let m = manager(vec![], Arc::new(MemoryStore::new()));
        let result = m.register_source(new_source("a", "NOPE", "A", 1)).await;
        assert!(matches!(result, Err(FetchError::InvalidInput(_))));
        assert!(m.registry().is_empty());
    }

    #[tokio::test]
    async fn test_priority_order_and_best_source() {
        let a = Arc::new(MockProvider::new("MOCK_A", "A"));
        let b = Arc::new(MockProvider::new("MOCK_B", "B"));
        let store = Arc::new(MemoryStore::new());
        let m = manager(vec![a, b], store.clone());

        m.register_source(new_source("a", "MOCK_A", "A", 1)).await.unwrap();
        m.register_source(new_source("b", "MOCK_B", "B", 2)).await.unwrap();
        assert_eq!(store.source_writes.load(Ordering::SeqCst), 2);

        for _ in 0..3 {
            m.mark_source_failed("a", "timeout").await.unwrap();
        }
        let order: Vec<_> = m.get_source_priority_order().into_iter().map(|s| s.id).collect();
        assert_eq!(order, vec!["a", "b"]);

        let period = Period::monthly(2024, 3).unwrap();
        assert_eq!(m.get_best_source(&period).unwrap().id, "b");
        let excluded: Vec<_> = m
            .get_fallback_order(FallbackPolicy::ExcludeFailed)
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(excluded, vec!["b"]);
    }

    #[tokio::test]
    async fn test_best_source_skips_unsupported_period() {
        let annual = Arc::new(MockProvider::new("MOCK_A", "A").annual_only());
        let m = manager(vec![annual], Arc::new(MemoryStore::new()));
        m.register_source(new_source("a", "MOCK_A", "A", 1)).await.unwrap();

        assert!(m.get_best_source(&Period::monthly(2024, 3).unwrap()).is_none());
        assert!(m.get_best_source(&Period::annual(2023).unwrap()).is_some());
    }

    #[tokio::test]
    async fn test_unknown_id_fails_with_source_not_found() {
        let m = manager(vec![], Arc::new(MemoryStore::new()));
        assert!(matches!(
            m.mark_source_success("ghost", 10).await,
            Err(FetchError::SourceNotFound(_))
        ));
        assert!(matches!(
            m.update_source_health("ghost", true, 10).await,
            Err(FetchError::SourceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_store_failure_keeps_memory_state() {
        let a = Arc::new(MockProvider::new("MOCK_A", "A"));
        let store = Arc::new(MemoryStore::new());
        let m = manager(vec![a], store.clone());
        m.register_source(new_source("a", "MOCK_A", "A", 1)).await.unwrap();

        store.fail_writes(true);
        let result = m.mark_source_failed("a", "boom").await;
        assert!(matches!(result, Err(FetchError::Storage(_))));
        assert_eq!(m.registry().get_by_id("a").unwrap().failure_count, 1);
    }

    #[tokio::test]
    async fn test_health_checks_probe_concurrently_and_record() {
        let ok = Arc::new(MockProvider::new("MOCK_A", "A"));
        let down = Arc::new(MockProvider::new("MOCK_B", "B").probe_fails());
        let slow = Arc::new(MockProvider::new("MOCK_C", "C").probe_delay(Duration::from_secs(5)));
        let m = manager(vec![ok.clone(), down, slow], Arc::new(MemoryStore::new()))
            .with_config(ManagerConfig {
                probe_timeout: Duration::from_millis(50),
            });
        m.register_source(new_source("a", "MOCK_A", "A", 1)).await.unwrap();
        m.register_source(new_source("b", "MOCK_B", "B", 2)).await.unwrap();
        m.register_source(new_source("c", "MOCK_C", "C", 3)).await.unwrap();

        let started = Instant::now();
        let outcomes = m.run_health_checks().await;
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(outcomes.len(), 3);

        let by_id = |id: &str| outcomes.iter().find(|o| o.source_id == id).unwrap().clone();
        assert!(by_id("a").healthy);
        assert!(!by_id("b").healthy);
        assert!(by_id("c").error.as_deref().unwrap_or_default().contains("Timeout"));
        assert_eq!(ok.probe_calls.load(Ordering::SeqCst), 1);

        let a = m.registry().get_by_id("a").unwrap();
        assert!(a.last_health_check.is_some());
        assert_eq!(a.success_count, 1);
        assert_eq!(m.registry().get_by_id("b").unwrap().failure_count, 1);
    }

    #[tokio::test]
    async fn test_health_check_skips_source_without_credential() {
        let keyed = Arc::new(MockProvider::new("MOCK_A", "A"));
        let m = manager(vec![keyed.clone()], Arc::new(MemoryStore::new()));
        let mut input = new_source("a", "MOCK_A", "A", 1);
        input.auth = AuthRequirement::ApiKey;
        m.register_source(input).await.unwrap();

        let outcomes = m.run_health_checks().await;
        assert!(outcomes[0].skipped);
        assert_eq!(keyed.probe_calls.load(Ordering::SeqCst), 0);
        assert_eq!(m.registry().get_by_id("a").unwrap().failure_count, 0);
    }

    proptest! {
        #[test]
        fn prop_priority_order_is_sorted(
            specs in proptest::collection::vec((0u8..=10, 0u32..20, 0u32..20), 1..12)
        ) {
            let registry = SourceRegistry::new();
            let now = Utc::now();
            for (i, (priority, ok, failed)) in specs.iter().enumerate() {
                let id = format!("s{}", i);
                let source = Source::new(new_source(&id, "MOCK_A", "A", *priority), now).unwrap();
                registry.add(source).unwrap();
                for _ in 0..*ok {
                    registry.record_success(&id, 10, now).unwrap();
                }
                for _ in 0..*failed {
                    registry.record_failure(&id, "x", now).unwrap();
                }
            }
            let m = SourceManager::new(
                Arc::new(registry),
                Arc::new(MemoryStore::new()),
                ProviderSet::default(),
                Arc::new(StaticCredentials::default()),
                Arc::new(SystemClock),
            );

            let order = m.get_source_priority_order();
            prop_assert_eq!(order.len(), specs.len());
            for pair in order.windows(2) {
                let (a, b) = (&pair[0], &pair[1]);
                prop_assert!(
                    a.priority < b.priority
                        || (a.priority == b.priority && a.reliability_score >= b.reliability_score)
                );
            }
        }
    }
}
