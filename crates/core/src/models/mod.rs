//! Domain models shared across the fetch subsystem.

mod auto_config;
mod cache_entry;
mod period;
mod reading;
mod source;
mod validation;

pub use auto_config::{
    AutoConfig, AutoConfigUpdate, DEFAULT_CACHE_TTL_HOURS, MAX_CACHE_TTL_HOURS,
    MIN_CACHE_TTL_HOURS,
};
pub use cache_entry::CachedEntry;
pub use period::{Period, PeriodKind};
pub use reading::InflationReading;
pub use source::{
    AuthRequirement, HealthStatus, NewSource, PayloadFormat, RateBudget, Source,
    SourceHealthSummary, MAX_PRIORITY, NEUTRAL_RELIABILITY,
};
pub(crate) use source::validate_priority;
pub use validation::{checks, CheckOutcome, ValidationResult};
