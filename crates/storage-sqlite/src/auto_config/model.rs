//! Database model for auto-configuration records.

use diesel::prelude::*;
use tufe_core::models::AutoConfig;

use crate::errors::StorageError;
use crate::utils::{from_naive, narrow, to_naive};

#[derive(Queryable, Identifiable, Insertable, AsChangeset, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::auto_configs)]
#[diesel(primary_key(name))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AutoConfigDB {
    pub name: String,
    pub discovery_enabled: bool,
    /// JSON array of provider ids.
    pub default_priority_order: String,
    pub fallback_to_manual: bool,
    pub cache_ttl_hours: i32,
    pub validation_enabled: bool,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

impl TryFrom<&AutoConfig> for AutoConfigDB {
    type Error = StorageError;

    fn try_from(config: &AutoConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            name: config.name.clone(),
            discovery_enabled: config.discovery_enabled,
            default_priority_order: serde_json::to_string(&config.default_priority_order)?,
            fallback_to_manual: config.fallback_to_manual,
            cache_ttl_hours: narrow("cache_ttl_hours", config.cache_ttl_hours)?,
            validation_enabled: config.validation_enabled,
            created_at: to_naive(config.created_at),
            updated_at: to_naive(config.updated_at),
        })
    }
}

impl TryFrom<AutoConfigDB> for AutoConfig {
    type Error = StorageError;

    fn try_from(row: AutoConfigDB) -> Result<Self, Self::Error> {
        Ok(AutoConfig {
            default_priority_order: serde_json::from_str(&row.default_priority_order)?,
            cache_ttl_hours: narrow("cache_ttl_hours", row.cache_ttl_hours)?,
            name: row.name,
            discovery_enabled: row.discovery_enabled,
            fallback_to_manual: row.fallback_to_manual,
            validation_enabled: row.validation_enabled,
            created_at: from_naive(row.created_at),
            updated_at: from_naive(row.updated_at),
        })
    }
}
