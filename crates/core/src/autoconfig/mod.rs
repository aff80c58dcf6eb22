//! Zero-touch bootstrap of the source list and the named config record.
//!
//! The [`AutoConfig`] record is the source of truth for discovery, cache TTL
//! and validation. The configurator keeps a copy of it in memory after the
//! first read so the orchestrator can ask "is discovery on?" without a store
//! round-trip.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use futures::future::join_all;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::errors::{FetchError, Result};
use crate::models::{
    AuthRequirement, AutoConfig, AutoConfigUpdate, NewSource, PayloadFormat, RateBudget, Source,
    MAX_PRIORITY,
};
use crate::provider::InflationProvider;
use crate::registry::SourceManager;
use crate::store::AutoConfigStore;

pub const DEFAULT_CONFIG_NAME: &str = "default";

const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// A provider that answered its discovery probe.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredSource {
    pub provider_id: String,
    pub name: String,
    pub endpoint: String,
    pub series_code: String,
    pub format: PayloadFormat,
    pub auth: AuthRequirement,
    /// Position in discovery order, starting at 1.
    pub priority: u8,
    pub response_time_ms: u64,
    pub already_registered: bool,
}

impl DiscoveredSource {
    /// The id a source auto-configured from this provider gets.
    pub fn source_id(&self) -> String {
        source_id_for(&self.provider_id)
    }
}

fn source_id_for(provider_id: &str) -> String {
    provider_id.to_ascii_lowercase()
}

pub struct AutoConfigurator {
    name: String,
    store: Arc<dyn AutoConfigStore>,
    sources: Arc<SourceManager>,
    discovery_timeout: Duration,
    current: RwLock<Option<AutoConfig>>,
}

impl AutoConfigurator {
    pub fn new(store: Arc<dyn AutoConfigStore>, sources: Arc<SourceManager>) -> Self {
        Self {
            name: DEFAULT_CONFIG_NAME.to_string(),
            store,
            sources,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            current: RwLock::new(None),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn cached(&self) -> Option<AutoConfig> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| {
                warn!("Auto-config lock was poisoned, recovering");
                poisoned.into_inner()
            })
            .clone()
    }

    fn remember(&self, config: &AutoConfig) {
        let mut current = self.current.write().unwrap_or_else(|poisoned| {
            warn!("Auto-config lock was poisoned, recovering");
            poisoned.into_inner()
        });
        *current = Some(config.clone());
    }

    /// The config record, if one exists.
    pub async fn get_config(&self) -> Result<Option<AutoConfig>> {
        if let Some(config) = self.cached() {
            return Ok(Some(config));
        }
        let config = self.store.get_auto_config(&self.name).await?;
        if let Some(config) = &config {
            self.remember(config);
        }
        Ok(config)
    }

    /// Discovery runs when no record exists yet or the record enables it.
    pub async fn is_discovery_enabled(&self) -> Result<bool> {
        Ok(self
            .get_config()
            .await?
            .map(|c| c.discovery_enabled)
            .unwrap_or(true))
    }

    /// Ensures the named record exists. An existing record is returned
    /// unchanged and nothing is written.
    pub async fn setup_zero_config(&self) -> Result<AutoConfig> {
        if let Some(existing) = self.get_config().await? {
            debug!("Auto-config '{}' already exists", self.name);
            return Ok(existing);
        }

        let order = self.sources.providers().ids();
        let config = AutoConfig::zero_config(&self.name, order, self.sources.now())?;
        if let Err(e) = self.store.insert_auto_config(&config).await {
            // A concurrent setup may have created the record after our read.
            return match self.store.get_auto_config(&self.name).await? {
                Some(existing) => {
                    debug!("Auto-config '{}' was created concurrently", self.name);
                    self.remember(&existing);
                    Ok(existing)
                }
                None => Err(e),
            };
        }
        self.remember(&config);
        info!(
            "Created auto-config '{}' with discovery order {:?}",
            config.name, config.default_priority_order
        );
        Ok(config)
    }

    /// Applies a partial update, creating the record first if needed.
    pub async fn update_config(&self, update: AutoConfigUpdate) -> Result<AutoConfig> {
        let current = self.setup_zero_config().await?;
        let next = current.apply(update, self.sources.now())?;
        self.store.update_auto_config(&next).await?;
        self.remember(&next);
        Ok(next)
    }

    pub async fn enable_auto_config(&self) -> Result<AutoConfig> {
        let config = self
            .update_config(AutoConfigUpdate {
                discovery_enabled: Some(true),
                ..Default::default()
            })
            .await?;
        info!("Auto-config '{}' enabled", config.name);
        Ok(config)
    }

    pub async fn disable_auto_config(&self) -> Result<AutoConfig> {
        let config = self
            .update_config(AutoConfigUpdate {
                discovery_enabled: Some(false),
                ..Default::default()
            })
            .await?;
        info!("Auto-config '{}' disabled", config.name);
        Ok(config)
    }

    /// Providers in discovery order: the record's `default_priority_order`
    /// first, then every other adapter by its own priority hint.
    async fn discovery_order(&self) -> Result<Vec<Arc<dyn InflationProvider>>> {
        let preferred = self
            .get_config()
            .await?
            .map(|c| c.default_priority_order)
            .unwrap_or_default();
        let providers = self.sources.providers();

        let mut order: Vec<Arc<dyn InflationProvider>> = Vec::with_capacity(providers.len());
        for id in &preferred {
            match providers.get(id) {
                Some(provider) => order.push(provider),
                None => debug!("Auto-config lists unknown provider '{}'", id),
            }
        }
        for provider in providers.iter() {
            if !preferred.iter().any(|id| id == provider.id()) {
                order.push(provider.clone());
            }
        }
        Ok(order)
    }

    /// Probes every known adapter concurrently and returns the ones that
    /// answered, numbered in discovery order.
    pub async fn discover_available_sources(&self) -> Result<Vec<DiscoveredSource>> {
        let order = self.discovery_order().await?;
        let probes = order.iter().map(|provider| self.probe(provider.clone()));
        let outcomes = join_all(probes).await;

        let registry = self.sources.registry();
        let mut discovered = Vec::new();
        for (provider, outcome) in order.iter().zip(outcomes) {
            let response_time_ms = match outcome {
                Ok(ms) => ms,
                Err(e) => {
                    debug!("Provider '{}' not discovered: {}", provider.id(), e);
                    continue;
                }
            };
            let descriptor = provider.descriptor();
            let priority = (discovered.len() + 1).min(MAX_PRIORITY as usize) as u8;
            discovered.push(DiscoveredSource {
                provider_id: provider.id().to_string(),
                name: provider.name().to_string(),
                endpoint: descriptor.endpoint,
                series_code: descriptor.series_code,
                format: descriptor.format,
                auth: descriptor.auth,
                priority,
                response_time_ms,
                already_registered: registry.find_by_provider(provider.id()).is_some(),
            });
        }
        info!(
            "Discovery found {}/{} providers reachable",
            discovered.len(),
            order.len()
        );
        Ok(discovered)
    }

    async fn probe(&self, provider: Arc<dyn InflationProvider>) -> Result<u64> {
        let source_id = source_id_for(provider.id());
        let credential = if provider.descriptor().auth.is_required() {
            let credential = self
                .sources
                .credential_for_id(&source_id)?
                .ok_or_else(|| FetchError::MissingCredential(source_id.clone()))?;
            Some(credential)
        } else {
            None
        };

        let started = Instant::now();
        match tokio::time::timeout(self.discovery_timeout, provider.probe(credential.as_deref()))
            .await
        {
            Ok(result) => result.map(|_| started.elapsed().as_millis() as u64),
            Err(_) => Err(FetchError::Timeout {
                source_name: provider.name().to_string(),
                timeout_ms: self.discovery_timeout.as_millis() as u64,
            }),
        }
    }

    /// Registers every discovered provider that has no source yet.
    ///
    /// Returns the newly registered sources. Calling it again once the
    /// sources exist registers nothing.
    pub async fn auto_configure_sources(&self) -> Result<Vec<Source>> {
        let discovered = self
            .discover_available_sources()
            .await
            .map_err(|e| FetchError::AutoConfigFailed(e.to_string()))?;

        let mut registered = Vec::new();
        let mut errors = Vec::new();
        for candidate in discovered {
            if candidate.already_registered
                || self
                    .sources
                    .registry()
                    .find_by_provider(&candidate.provider_id)
                    .is_some()
            {
                continue;
            }
            let rate_budget = self
                .sources
                .providers()
                .get(&candidate.provider_id)
                .map(|p| RateBudget::per_minute(p.rate_limit().requests_per_minute))
                .unwrap_or_default();
            let new_source = NewSource {
                id: Some(candidate.source_id()),
                provider_id: candidate.provider_id.clone(),
                name: candidate.name.clone(),
                endpoint: candidate.endpoint.clone(),
                series_code: candidate.series_code.clone(),
                format: candidate.format,
                auth: candidate.auth,
                rate_budget,
                priority: candidate.priority,
            };
            match self.sources.register_source(new_source).await {
                Ok(source) => registered.push(source),
                Err(e) => {
                    warn!("Could not register '{}': {}", candidate.provider_id, e);
                    errors.push(format!("{}: {}", candidate.provider_id, e));
                }
            }
        }

        if registered.is_empty() && !errors.is_empty() {
            return Err(FetchError::AutoConfigFailed(errors.join("; ")));
        }
        if registered.is_empty() && self.sources.registry().is_empty() {
            return Err(FetchError::AutoConfigFailed(
                "no provider answered its discovery probe".to_string(),
            ));
        }
        info!("Auto-configured {} new sources", registered.len());
        Ok(registered)
    }
}
