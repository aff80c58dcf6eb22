//! Provider adapters for upstream inflation services.

mod capabilities;
mod set;
mod traits;

pub mod evds;
pub mod json_mirror;
pub mod world_bank;

pub use capabilities::{PeriodSupport, ProviderDescriptor, RateLimit};
pub use set::ProviderSet;
pub use traits::InflationProvider;

use std::time::Duration;

use reqwest::Client;

/// Default HTTP request timeout for adapters.
///
/// The orchestrator applies its own, usually tighter, per-attempt bound.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn http_client() -> Client {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Converts an `f64` percentage into a decimal rounded to two places.
pub(crate) fn percent(provider: &str, value: f64) -> crate::errors::Result<rust_decimal::Decimal> {
    rust_decimal::Decimal::try_from(value)
        .map(|d| d.round_dp(2))
        .map_err(|_| crate::errors::FetchError::provider(provider, format!("non-finite rate {}", value)))
}

/// Parses a `Retry-After` value given in seconds. Values that do not fit a
/// timestamp are dropped.
fn retry_after_hint(
    value: &str,
    now: chrono::DateTime<chrono::Utc>,
) -> Option<chrono::DateTime<chrono::Utc>> {
    let secs = value.trim().parse::<i64>().ok()?;
    let delay = chrono::Duration::try_seconds(secs)?;
    now.checked_add_signed(delay)
}

/// Maps non-success HTTP statuses onto fetch errors.
///
/// 429 becomes [`crate::errors::FetchError::RateLimitExceeded`] carrying the
/// `Retry-After` hint when the provider sends one in seconds.
pub(crate) fn check_status(
    provider: &str,
    response: reqwest::Response,
) -> crate::errors::Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| retry_after_hint(v, chrono::Utc::now()));
        return Err(crate::errors::FetchError::RateLimitExceeded {
            source_name: provider.to_string(),
            retry_after,
        });
    }
    Err(crate::errors::FetchError::provider(
        provider,
        format!("HTTP {}", status),
    ))
}
