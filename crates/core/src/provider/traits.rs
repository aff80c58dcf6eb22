//! Inflation provider trait definitions.

use async_trait::async_trait;

use crate::errors::Result;
use crate::models::{InflationReading, Period};

use super::capabilities::{PeriodSupport, ProviderDescriptor, RateLimit};

/// Trait for inflation data providers.
///
/// One implementation per upstream service. Adapters translate the upstream
/// payload into an [`InflationReading`] and map transport failures onto
/// [`crate::errors::FetchError`] so the orchestrator can classify them.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use tufe_core::provider::{InflationProvider, ProviderDescriptor, RateLimit};
///
/// struct MyProvider;
///
/// #[async_trait]
/// impl InflationProvider for MyProvider {
///     fn id(&self) -> &'static str {
///         "MY_PROVIDER"
///     }
///
///     fn name(&self) -> &str {
///         "My Provider"
///     }
///
///     // ... descriptor, rate_limit, fetch, probe
/// }
/// ```
#[async_trait]
pub trait InflationProvider: Send + Sync {
    /// Unique identifier, a constant like "TCMB_EVDS".
    ///
    /// Sources reference their adapter through this id.
    fn id(&self) -> &'static str;

    /// Attribution name stamped on every reading this adapter returns.
    fn name(&self) -> &str;

    /// Discovery ordering hint. Lower values are probed first. Default is 10.
    fn priority(&self) -> u8 {
        10
    }

    fn descriptor(&self) -> ProviderDescriptor;

    fn rate_limit(&self) -> RateLimit {
        RateLimit::default()
    }

    fn period_support(&self) -> PeriodSupport {
        PeriodSupport::ALL
    }

    fn supports_period(&self, period: &Period) -> bool {
        self.period_support().supports(period)
    }

    /// Fetch the inflation value for `period` from `series_code`.
    async fn fetch(
        &self,
        series_code: &str,
        period: &Period,
        credential: Option<&str>,
    ) -> Result<InflationReading>;

    /// Lightweight liveness check used by health checks and discovery.
    async fn probe(&self, credential: Option<&str>) -> Result<()>;
}
