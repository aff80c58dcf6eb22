//! Database model for fetch sources.

use diesel::prelude::*;
use tufe_core::models::{RateBudget, Source};

use crate::errors::StorageError;
use crate::utils::{from_naive, narrow, parse_column, to_naive};

#[derive(Queryable, Identifiable, Insertable, AsChangeset, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::fetch_sources)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct SourceDB {
    pub id: String,
    pub provider_id: String,
    pub name: String,
    pub endpoint: String,
    pub series_code: String,
    pub format: String,
    pub auth: String,
    pub requests_per_minute: i32,
    pub rate_remaining: Option<i32>,
    pub rate_reset_at: Option<chrono::NaiveDateTime>,
    pub priority: i32,
    pub reliability_score: f64,
    pub health_status: String,
    pub success_count: i64,
    pub failure_count: i64,
    pub avg_response_time_ms: f64,
    pub last_health_check: Option<chrono::NaiveDateTime>,
    pub last_error: Option<String>,
    pub active: bool,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

impl From<&Source> for SourceDB {
    fn from(source: &Source) -> Self {
        Self {
            id: source.id.clone(),
            provider_id: source.provider_id.clone(),
            name: source.name.clone(),
            endpoint: source.endpoint.clone(),
            series_code: source.series_code.clone(),
            format: source.format.as_str().to_string(),
            auth: source.auth.as_str().to_string(),
            requests_per_minute: source.rate_budget.requests_per_minute.min(i32::MAX as u32) as i32,
            rate_remaining: source
                .rate_budget
                .remaining
                .map(|r| r.min(i32::MAX as u32) as i32),
            rate_reset_at: source.rate_budget.reset_at.map(to_naive),
            priority: source.priority as i32,
            reliability_score: source.reliability_score,
            health_status: source.health_status.as_str().to_string(),
            success_count: source.success_count.min(i64::MAX as u64) as i64,
            failure_count: source.failure_count.min(i64::MAX as u64) as i64,
            avg_response_time_ms: source.avg_response_time_ms,
            last_health_check: source.last_health_check.map(to_naive),
            last_error: source.last_error.clone(),
            active: source.active,
            created_at: to_naive(source.created_at),
            updated_at: to_naive(source.updated_at),
        }
    }
}

impl TryFrom<SourceDB> for Source {
    type Error = StorageError;

    fn try_from(row: SourceDB) -> Result<Self, Self::Error> {
        Ok(Source {
            format: parse_column("format", &row.format)?,
            auth: parse_column("auth", &row.auth)?,
            health_status: parse_column("health_status", &row.health_status)?,
            rate_budget: RateBudget {
                requests_per_minute: narrow("requests_per_minute", row.requests_per_minute)?,
                remaining: row
                    .rate_remaining
                    .map(|r| narrow("rate_remaining", r))
                    .transpose()?,
                reset_at: row.rate_reset_at.map(from_naive),
            },
            priority: narrow("priority", row.priority)?,
            success_count: narrow("success_count", row.success_count)?,
            failure_count: narrow("failure_count", row.failure_count)?,
            reliability_score: row.reliability_score,
            avg_response_time_ms: row.avg_response_time_ms,
            last_health_check: row.last_health_check.map(from_naive),
            last_error: row.last_error,
            active: row.active,
            created_at: from_naive(row.created_at),
            updated_at: from_naive(row.updated_at),
            id: row.id,
            provider_id: row.provider_id,
            name: row.name,
            endpoint: row.endpoint,
            series_code: row.series_code,
        })
    }
}
