use std::sync::Arc;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::SqliteConnection;
use tufe_core::fetch::SessionSnapshot;
use tufe_core::models::Period;
use tufe_core::store::SessionStore;
use tufe_core::{FetchError, Result};

use super::model::SessionDB;
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::IntoCore;
use crate::schema::fetch_sessions;

pub struct SessionRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SessionRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl SessionStore for SessionRepository {
    async fn save_session(&self, session: &SessionSnapshot) -> Result<()> {
        let row = SessionDB::try_from(session)?;
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                diesel::insert_into(fetch_sessions::table)
                    .values(&row)
                    .on_conflict(fetch_sessions::id)
                    .do_update()
                    .set(&row)
                    .execute(conn)
                    .into_core()?;
                Ok(())
            })
            .await
    }

    async fn get_session(&self, id: &str) -> Result<Option<SessionSnapshot>> {
        let mut conn = get_connection(&self.pool)?;
        let row = fetch_sessions::table
            .find(id)
            .select(SessionDB::as_select())
            .first::<SessionDB>(&mut conn)
            .optional()
            .into_core()?;
        row.map(|r| SessionSnapshot::try_from(r).map_err(FetchError::from))
            .transpose()
    }

    async fn list_sessions(
        &self,
        period: Option<&Period>,
        limit: usize,
    ) -> Result<Vec<SessionSnapshot>> {
        let mut conn = get_connection(&self.pool)?;
        let mut query = fetch_sessions::table
            .select(SessionDB::as_select())
            .order((fetch_sessions::created_at.desc(), fetch_sessions::id.desc()))
            .limit(limit.min(i64::MAX as usize) as i64)
            .into_boxed();
        if let Some(period) = period {
            query = query.filter(fetch_sessions::period.eq(period.key()));
        }
        let rows = query.load::<SessionDB>(&mut conn).into_core()?;
        rows.into_iter()
            .map(|r| SessionSnapshot::try_from(r).map_err(FetchError::from))
            .collect()
    }
}
