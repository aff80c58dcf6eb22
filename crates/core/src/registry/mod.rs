//! Source registry module.
//!
//! This module provides bookkeeping and ranking for inflation sources:
//! - Source registration and per-source health/reliability counters
//! - Ranking and concurrent health checks
//! - Rate limiting per source
//! - Response validation

mod health;
mod rate_limiter;
mod source_manager;
mod source_registry;
mod validator;

pub use health::{HealthPolicy, HealthTracker};
pub use rate_limiter::RateLimiter;
pub use source_manager::{FallbackPolicy, HealthCheckOutcome, ManagerConfig, SourceManager};
pub use source_registry::SourceRegistry;
pub use validator::{ResponseValidator, ValidatorConfig};
