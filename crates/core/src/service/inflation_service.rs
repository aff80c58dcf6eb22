use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};

use super::inflation_traits::InflationServiceTrait;
use crate::autoconfig::{AutoConfigurator, DiscoveredSource};
use crate::cache::InflationCache;
use crate::clock::{Clock, SystemClock};
use crate::errors::Result;
use crate::fetch::{FetchOrchestrator, FetchResult, OrchestratorConfig, SessionSnapshot};
use crate::models::{AutoConfig, AutoConfigUpdate, NewSource, Period, Source, SourceHealthSummary};
use crate::provider::ProviderSet;
use crate::registry::{
    HealthCheckOutcome, HealthPolicy, ManagerConfig, ResponseValidator, SourceManager,
    SourceRegistry, ValidatorConfig,
};
use crate::secrets::CredentialProvider;
use crate::store::{CacheStore, FetchStores};

/// Tunables for every component the service wires together.
#[derive(Clone, Debug, Default)]
pub struct ServiceConfig {
    pub orchestrator: OrchestratorConfig,
    pub manager: ManagerConfig,
    pub health: HealthPolicy,
    pub validator: ValidatorConfig,
}

/// Wires registry, manager, validator, cache, orchestrator and
/// auto-configurator over one set of stores.
pub struct InflationService {
    sources: Arc<SourceManager>,
    cache: Arc<InflationCache>,
    orchestrator: FetchOrchestrator,
    auto_config: Arc<AutoConfigurator>,
    stores: FetchStores,
}

impl InflationService {
    pub fn new(
        providers: ProviderSet,
        stores: FetchStores,
        credentials: Arc<dyn CredentialProvider>,
        config: ServiceConfig,
    ) -> Self {
        Self::with_clock(providers, stores, credentials, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        providers: ProviderSet,
        stores: FetchStores,
        credentials: Arc<dyn CredentialProvider>,
        config: ServiceConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let registry = Arc::new(SourceRegistry::with_policy(config.health));
        let sources = Arc::new(
            SourceManager::new(
                registry,
                stores.sources.clone(),
                providers,
                credentials,
                clock.clone(),
            )
            .with_config(config.manager),
        );
        let cache = Arc::new(InflationCache::new(clock.clone()));
        let validator =
            Arc::new(ResponseValidator::with_config(config.validator).with_clock(clock.clone()));
        let auto_config = Arc::new(AutoConfigurator::new(
            stores.auto_config.clone(),
            sources.clone(),
        ));
        let orchestrator = FetchOrchestrator::new(
            cache.clone(),
            sources.clone(),
            validator,
            stores.sessions.clone(),
            stores.cache.clone(),
            clock,
        )
        .with_config(config.orchestrator)
        .with_auto_config(auto_config.clone());

        Self {
            sources,
            cache,
            orchestrator,
            auto_config,
            stores,
        }
    }

    /// Hydrates sources and cached values from the stores and applies the
    /// persisted auto-config record, if any.
    pub async fn initialize(&self) -> Result<()> {
        let sources = self.sources.load_from_store().await?;
        let entries = self.stores.cache.load_cached_entries().await?;
        let cached = self.cache.warm(entries);
        if let Some(config) = self.auto_config.get_config().await? {
            self.apply(&config);
        }
        info!(
            "Inflation service ready: {} sources, {} cached periods",
            sources, cached
        );
        Ok(())
    }

    /// Pushes runtime settings of the record into the cache and orchestrator.
    fn apply(&self, config: &AutoConfig) {
        self.cache.set_ttl(config.cache_ttl());
        self.orchestrator
            .set_validation_enabled(config.validation_enabled);
        debug!(
            "Applied auto-config '{}': ttl={}h validation={}",
            config.name, config.cache_ttl_hours, config.validation_enabled
        );
    }

    pub fn orchestrator(&self) -> &FetchOrchestrator {
        &self.orchestrator
    }

    pub fn source_manager(&self) -> &Arc<SourceManager> {
        &self.sources
    }

    pub fn cache(&self) -> &Arc<InflationCache> {
        &self.cache
    }
}

#[async_trait]
impl InflationServiceTrait for InflationService {
    async fn fetch_easy(&self, period: Period) -> Result<FetchResult> {
        self.orchestrator.fetch_easy(period).await
    }

    async fn retry_session(&self, session_id: &str) -> Result<FetchResult> {
        self.orchestrator.retry(session_id).await
    }

    async fn cancel_session(&self, session_id: &str) -> Result<SessionSnapshot> {
        self.orchestrator.cancel(session_id).await
    }

    async fn get_session(&self, session_id: &str) -> Result<SessionSnapshot> {
        self.orchestrator.get_session(session_id).await
    }

    async fn list_sessions(
        &self,
        period: Option<Period>,
        limit: usize,
    ) -> Result<Vec<SessionSnapshot>> {
        self.orchestrator.list_sessions(period, limit).await
    }

    async fn invalidate_cache(&self, period: Period) -> Result<bool> {
        self.orchestrator.invalidate(&period).await
    }

    fn purge_expired_cache(&self) -> usize {
        self.cache.purge_expired()
    }

    fn get_source_health_summary(&self) -> Vec<SourceHealthSummary> {
        self.sources.health_summary()
    }

    async fn run_health_checks(&self) -> Vec<HealthCheckOutcome> {
        self.sources.run_health_checks().await
    }

    fn list_sources(&self) -> Vec<Source> {
        let mut sources = self.sources.registry().get_all();
        sources.sort_by(|a, b| a.rank_cmp(b));
        sources
    }

    fn get_source(&self, source_id: &str) -> Result<Source> {
        self.sources.registry().get_by_id(source_id)
    }

    fn get_best_source(&self, period: &Period) -> Option<Source> {
        self.sources.get_best_source(period)
    }

    async fn register_source(&self, new_source: NewSource) -> Result<Source> {
        self.sources.register_source(new_source).await
    }

    async fn set_source_active(&self, source_id: &str, active: bool) -> Result<Source> {
        self.sources.set_active(source_id, active).await
    }

    async fn rotate_source_counters(&self, source_id: &str) -> Result<Source> {
        self.sources.rotate_counters(source_id).await
    }

    async fn update_source_priority(&self, source_id: &str, priority: u8) -> Result<Source> {
        self.sources.update_priority(source_id, priority).await
    }

    async fn setup_zero_config(&self) -> Result<AutoConfig> {
        let config = self.auto_config.setup_zero_config().await?;
        self.apply(&config);
        Ok(config)
    }

    async fn get_auto_config(&self) -> Result<Option<AutoConfig>> {
        self.auto_config.get_config().await
    }

    async fn update_auto_config(&self, update: AutoConfigUpdate) -> Result<AutoConfig> {
        let config = self.auto_config.update_config(update).await?;
        self.apply(&config);
        Ok(config)
    }

    async fn enable_auto_config(&self) -> Result<AutoConfig> {
        self.auto_config.enable_auto_config().await
    }

    async fn disable_auto_config(&self) -> Result<AutoConfig> {
        self.auto_config.disable_auto_config().await
    }

    async fn discover_sources(&self) -> Result<Vec<DiscoveredSource>> {
        self.auto_config.discover_available_sources().await
    }

    async fn auto_configure_sources(&self) -> Result<Vec<Source>> {
        self.auto_config.auto_configure_sources().await
    }
}
