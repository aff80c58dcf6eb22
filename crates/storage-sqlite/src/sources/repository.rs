use std::sync::Arc;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::SqliteConnection;
use tufe_core::models::Source;
use tufe_core::store::SourceStore;
use tufe_core::{FetchError, Result};

use super::model::SourceDB;
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::IntoCore;
use crate::schema::fetch_sources;

pub struct SourceRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SourceRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl SourceStore for SourceRepository {
    async fn save_source(&self, source: &Source) -> Result<()> {
        let row = SourceDB::from(source);
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                diesel::insert_into(fetch_sources::table)
                    .values(&row)
                    .on_conflict(fetch_sources::id)
                    .do_update()
                    .set(&row)
                    .execute(conn)
                    .into_core()?;
                Ok(())
            })
            .await
    }

    async fn load_sources(&self) -> Result<Vec<Source>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = fetch_sources::table
            .order((fetch_sources::created_at.asc(), fetch_sources::id.asc()))
            .select(SourceDB::as_select())
            .load::<SourceDB>(&mut conn)
            .into_core()?;
        rows.into_iter()
            .map(|row| Source::try_from(row).map_err(FetchError::from))
            .collect()
    }
}
