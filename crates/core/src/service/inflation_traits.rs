use async_trait::async_trait;

use crate::autoconfig::DiscoveredSource;
use crate::errors::Result;
use crate::fetch::{FetchResult, SessionSnapshot};
use crate::models::{AutoConfig, AutoConfigUpdate, NewSource, Period, Source, SourceHealthSummary};
use crate::registry::HealthCheckOutcome;

/// Trait for inflation service operations
#[async_trait]
pub trait InflationServiceTrait: Send + Sync {
    async fn fetch_easy(&self, period: Period) -> Result<FetchResult>;
    async fn retry_session(&self, session_id: &str) -> Result<FetchResult>;
    async fn cancel_session(&self, session_id: &str) -> Result<SessionSnapshot>;
    async fn get_session(&self, session_id: &str) -> Result<SessionSnapshot>;
    async fn list_sessions(&self, period: Option<Period>, limit: usize)
        -> Result<Vec<SessionSnapshot>>;

    async fn invalidate_cache(&self, period: Period) -> Result<bool>;
    fn purge_expired_cache(&self) -> usize;

    fn get_source_health_summary(&self) -> Vec<SourceHealthSummary>;
    async fn run_health_checks(&self) -> Vec<HealthCheckOutcome>;
    fn list_sources(&self) -> Vec<Source>;
    fn get_source(&self, source_id: &str) -> Result<Source>;
    fn get_best_source(&self, period: &Period) -> Option<Source>;
    async fn register_source(&self, new_source: NewSource) -> Result<Source>;
    async fn set_source_active(&self, source_id: &str, active: bool) -> Result<Source>;
    async fn rotate_source_counters(&self, source_id: &str) -> Result<Source>;
    async fn update_source_priority(&self, source_id: &str, priority: u8) -> Result<Source>;

    async fn setup_zero_config(&self) -> Result<AutoConfig>;
    async fn get_auto_config(&self) -> Result<Option<AutoConfig>>;
    async fn update_auto_config(&self, update: AutoConfigUpdate) -> Result<AutoConfig>;
    async fn enable_auto_config(&self) -> Result<AutoConfig>;
    async fn disable_auto_config(&self) -> Result<AutoConfig>;
    async fn discover_sources(&self) -> Result<Vec<DiscoveredSource>>;
    async fn auto_configure_sources(&self) -> Result<Vec<Source>>;
}
