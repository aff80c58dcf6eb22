use std::sync::Arc;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};
use tufe_core::{
    fetch::OrchestratorConfig,
    provider::{
        evds::EvdsProvider,
        json_mirror::{JsonMirrorConfig, JsonMirrorProvider},
        world_bank::WorldBankProvider,
        InflationProvider, ProviderSet,
    },
    registry::ManagerConfig,
    InflationService, InflationServiceTrait, ServiceConfig,
};

use crate::{config::Config, secrets::EnvCredentialProvider};

const MIRROR_NAME: &str = "JSON Mirror";

pub struct AppState {
    pub inflation_service: Arc<dyn InflationServiceTrait>,
    pub db_path: String,
}

pub fn init_tracing() {
    let log_format = std::env::var("TUFE_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    // `init` also routes `log` records from the library crates into tracing.
    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

/// Adapters this deployment can use: EVDS, World Bank and an optional mirror.
pub fn build_providers(config: &Config) -> anyhow::Result<ProviderSet> {
    let mut providers: Vec<Arc<dyn InflationProvider>> = vec![
        Arc::new(EvdsProvider::with_series(config.evds_series.clone())),
        Arc::new(WorldBankProvider::new()),
    ];
    if let Some(url) = &config.mirror_url {
        let mut mirror = JsonMirrorConfig::new(MIRROR_NAME, url.clone());
        mirror.rate_pointer = config.mirror_rate_pointer.clone();
        providers.push(Arc::new(JsonMirrorProvider::new(mirror)?));
        tracing::info!("JSON mirror enabled: {}", url);
    }
    Ok(ProviderSet::new(providers))
}

pub async fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let providers = build_providers(config)?;
    build_state_with(config, providers).await
}

pub async fn build_state_with(
    config: &Config,
    providers: ProviderSet,
) -> anyhow::Result<Arc<AppState>> {
    tracing::info!("Database path in use: {}", config.db_path);
    let stores = tufe_storage_sqlite::open_stores(&config.db_path)?;

    let service_config = ServiceConfig {
        orchestrator: OrchestratorConfig {
            attempt_timeout: config.attempt_timeout,
            fallback_policy: config.fallback_policy,
            concurrent_fetch: config.concurrent_fetch,
            ..OrchestratorConfig::default()
        },
        manager: ManagerConfig {
            probe_timeout: config.probe_timeout,
        },
        ..ServiceConfig::default()
    };
    tracing::info!(
        "Providers: {:?}; fallback={} concurrent={}",
        providers.ids(),
        config.fallback_policy,
        config.concurrent_fetch
    );

    let service = InflationService::new(
        providers,
        stores,
        Arc::new(EnvCredentialProvider::new()),
        service_config,
    );
    service.initialize().await?;

    Ok(Arc::new(AppState {
        inflation_service: Arc::new(service),
        db_path: config.db_path.clone(),
    }))
}
