//! Database model for cached inflation values.

use diesel::prelude::*;
use rust_decimal::Decimal;
use tufe_core::models::CachedEntry;

use crate::errors::StorageError;
use crate::utils::{from_naive, parse_column, to_naive};

/// Rates are stored as decimal text to keep them exact.
#[derive(Queryable, Identifiable, Insertable, AsChangeset, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::inflation_cache_entries)]
#[diesel(primary_key(period))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct CachedEntryDB {
    pub period: String,
    pub rate: String,
    pub monthly_rate: Option<String>,
    pub source_name: String,
    pub series_code: String,
    pub fetched_at: chrono::NaiveDateTime,
    pub expires_at: chrono::NaiveDateTime,
    pub quality_score: f64,
    pub validated: bool,
}

impl From<&CachedEntry> for CachedEntryDB {
    fn from(entry: &CachedEntry) -> Self {
        Self {
            period: entry.period.key(),
            rate: entry.rate.to_string(),
            monthly_rate: entry.monthly_rate.map(|r| r.to_string()),
            source_name: entry.source_name.clone(),
            series_code: entry.series_code.clone(),
            fetched_at: to_naive(entry.fetched_at),
            expires_at: to_naive(entry.expires_at),
            quality_score: entry.quality_score,
            validated: entry.validated,
        }
    }
}

impl TryFrom<CachedEntryDB> for CachedEntry {
    type Error = StorageError;

    fn try_from(row: CachedEntryDB) -> Result<Self, Self::Error> {
        Ok(CachedEntry {
            period: parse_column("period", &row.period)?,
            rate: parse_column::<Decimal>("rate", &row.rate)?,
            monthly_rate: row
                .monthly_rate
                .as_deref()
                .map(|r| parse_column::<Decimal>("monthly_rate", r))
                .transpose()?,
            source_name: row.source_name,
            series_code: row.series_code,
            fetched_at: from_naive(row.fetched_at),
            expires_at: from_naive(row.expires_at),
            quality_score: row.quality_score,
            validated: row.validated,
        })
    }
}
