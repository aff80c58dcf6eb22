//! TÜFE Core - resilient multi-source inflation fetching.
//!
//! This crate contains the fetch subsystem: source registry and health
//! bookkeeping, ranking, response validation, a TTL cache, the fallback
//! orchestrator and zero-touch auto-configuration. It is database-agnostic
//! and defines store traits that are implemented by the `storage-sqlite`
//! crate.

pub mod autoconfig;
pub mod cache;
pub mod clock;
pub mod errors;
pub mod fetch;
pub mod models;
pub mod provider;
pub mod registry;
pub mod secrets;
pub mod service;
pub mod store;

#[cfg(test)]
mod testing;

pub use fetch::{FetchOrchestrator, FetchResult};
pub use models::{Period, Source};
pub use service::{InflationService, InflationServiceTrait, ServiceConfig};

// Re-export error types
pub use errors::FetchError;
pub use errors::Result;
