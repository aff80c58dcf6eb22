use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{FetchError, Result};

pub const MIN_CACHE_TTL_HOURS: u32 = 1;
pub const MAX_CACHE_TTL_HOURS: u32 = 168;
pub const DEFAULT_CACHE_TTL_HOURS: u32 = 24;

/// Named auto-configuration record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoConfig {
    pub name: String,
    pub discovery_enabled: bool,
    /// Provider ids in preferred discovery order.
    pub default_priority_order: Vec<String>,
    pub fallback_to_manual: bool,
    pub cache_ttl_hours: u32,
    pub validation_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AutoConfig {
    /// The record created by zero-touch setup.
    pub fn zero_config(
        name: impl Into<String>,
        default_priority_order: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        Self::new(
            name.into(),
            true,
            default_priority_order,
            true,
            DEFAULT_CACHE_TTL_HOURS,
            true,
            now,
        )
    }

    pub fn new(
        name: String,
        discovery_enabled: bool,
        default_priority_order: Vec<String>,
        fallback_to_manual: bool,
        cache_ttl_hours: u32,
        validation_enabled: bool,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(FetchError::InvalidInput("config name is required".into()));
        }
        validate_ttl(cache_ttl_hours)?;
        Ok(Self {
            name,
            discovery_enabled,
            default_priority_order,
            fallback_to_manual,
            cache_ttl_hours,
            validation_enabled,
            created_at: now,
            updated_at: now,
        })
    }

    /// Applies a partial update, validating the merged record.
    pub fn apply(&self, update: AutoConfigUpdate, now: DateTime<Utc>) -> Result<Self> {
        let mut next = self.clone();
        if let Some(v) = update.discovery_enabled {
            next.discovery_enabled = v;
        }
        if let Some(v) = update.default_priority_order {
            next.default_priority_order = v;
        }
        if let Some(v) = update.fallback_to_manual {
            next.fallback_to_manual = v;
        }
        if let Some(v) = update.cache_ttl_hours {
            validate_ttl(v)?;
            next.cache_ttl_hours = v;
        }
        if let Some(v) = update.validation_enabled {
            next.validation_enabled = v;
        }
        next.updated_at = now;
        Ok(next)
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cache_ttl_hours as i64)
    }
}

fn validate_ttl(hours: u32) -> Result<()> {
    if !(MIN_CACHE_TTL_HOURS..=MAX_CACHE_TTL_HOURS).contains(&hours) {
        return Err(FetchError::InvalidInput(format!(
            "cache TTL {}h outside {}..={}",
            hours, MIN_CACHE_TTL_HOURS, MAX_CACHE_TTL_HOURS
        )));
    }
    Ok(())
}

/// Partial update of an [`AutoConfig`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoConfigUpdate {
    pub discovery_enabled: Option<bool>,
    pub default_priority_order: Option<Vec<String>>,
    pub fallback_to_manual: Option<bool>,
    pub cache_ttl_hours: Option<u32>,
    pub validation_enabled: Option<bool>,
}
