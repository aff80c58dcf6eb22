//! Provider descriptors and rate limiting configuration.

use crate::models::{AuthRequirement, PayloadFormat, Period, PeriodKind};

/// Static description of the series a provider serves by default.
///
/// Used by auto-configuration to build a [`crate::models::Source`] for a
/// discovered provider.
#[derive(Clone, Debug)]
pub struct ProviderDescriptor {
    /// Base endpoint, informational.
    pub endpoint: String,

    /// Series identifier requested when the source does not override it.
    pub series_code: String,

    /// Wire format of the payload.
    pub format: PayloadFormat,

    /// Whether the provider needs a credential.
    pub auth: AuthRequirement,
}

/// Which period kinds a provider can serve.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PeriodSupport {
    pub annual: bool,
    pub monthly: bool,
}

impl PeriodSupport {
    pub const ALL: Self = Self {
        annual: true,
        monthly: true,
    };

    pub const ANNUAL_ONLY: Self = Self {
        annual: true,
        monthly: false,
    };

    pub fn supports(&self, period: &Period) -> bool {
        match period.kind() {
            PeriodKind::Annual => self.annual,
            PeriodKind::Monthly => self.monthly,
        }
    }
}

/// Rate limiting configuration for a provider.
#[derive(Clone, Debug)]
pub struct RateLimit {
    /// Maximum requests allowed per minute.
    pub requests_per_minute: u32,

    /// Tokens available for an initial burst.
    pub burst_capacity: f64,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            burst_capacity: 5.0,
        }
    }
}
