//! Caller-facing facade over the fetch subsystem.

mod inflation_service;
mod inflation_traits;

pub use inflation_service::{InflationService, ServiceConfig};
pub use inflation_traits::InflationServiceTrait;
