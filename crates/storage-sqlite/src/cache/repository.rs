use std::sync::Arc;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::SqliteConnection;
use log::warn;
use tufe_core::models::{CachedEntry, Period};
use tufe_core::store::CacheStore;
use tufe_core::Result;

use super::model::CachedEntryDB;
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::IntoCore;
use crate::schema::inflation_cache_entries;

pub struct CacheRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl CacheRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl CacheStore for CacheRepository {
    async fn save_cached_entry(&self, entry: &CachedEntry) -> Result<()> {
        let row = CachedEntryDB::from(entry);
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                diesel::insert_into(inflation_cache_entries::table)
                    .values(&row)
                    .on_conflict(inflation_cache_entries::period)
                    .do_update()
                    .set(&row)
                    .execute(conn)
                    .into_core()?;
                Ok(())
            })
            .await
    }

    /// Rows that no longer parse are skipped; the cache can always refetch.
    async fn load_cached_entries(&self) -> Result<Vec<CachedEntry>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = inflation_cache_entries::table
            .select(CachedEntryDB::as_select())
            .load::<CachedEntryDB>(&mut conn)
            .into_core()?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let period = row.period.clone();
                CachedEntry::try_from(row)
                    .map_err(|e| warn!("Skipping cache row {}: {}", period, e))
                    .ok()
            })
            .collect())
    }

    async fn delete_cached_entry(&self, period: &Period) -> Result<()> {
        let key = period.key();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                diesel::delete(inflation_cache_entries::table.find(key))
                    .execute(conn)
                    .into_core()?;
                Ok(())
            })
            .await
    }
}
