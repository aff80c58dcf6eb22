use std::sync::Arc;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::SqliteConnection;
use tufe_core::models::AutoConfig;
use tufe_core::store::AutoConfigStore;
use tufe_core::{FetchError, Result};

use super::model::AutoConfigDB;
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::IntoCore;
use crate::schema::auto_configs;

pub struct AutoConfigRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl AutoConfigRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl AutoConfigStore for AutoConfigRepository {
    async fn get_auto_config(&self, name: &str) -> Result<Option<AutoConfig>> {
        let mut conn = get_connection(&self.pool)?;
        let row = auto_configs::table
            .find(name)
            .select(AutoConfigDB::as_select())
            .first::<AutoConfigDB>(&mut conn)
            .optional()
            .into_core()?;
        row.map(|r| AutoConfig::try_from(r).map_err(FetchError::from))
            .transpose()
    }

    async fn insert_auto_config(&self, config: &AutoConfig) -> Result<()> {
        let row = AutoConfigDB::try_from(config)?;
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                diesel::insert_into(auto_configs::table)
                    .values(&row)
                    .execute(conn)
                    .into_core()?;
                Ok(())
            })
            .await
    }

    async fn update_auto_config(&self, config: &AutoConfig) -> Result<()> {
        let row = AutoConfigDB::try_from(config)?;
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                let updated = diesel::update(auto_configs::table.find(row.name.clone()))
                    .set(&row)
                    .execute(conn)
                    .into_core()?;
                if updated == 0 {
                    return Err(FetchError::Storage(format!(
                        "auto-config '{}' does not exist",
                        row.name
                    )));
                }
                Ok(())
            })
            .await
    }
}
