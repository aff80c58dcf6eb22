//! Database model for fetch sessions.

use diesel::prelude::*;
use tufe_core::fetch::{SessionSnapshot, SourceAttempt};

use crate::errors::StorageError;
use crate::utils::{from_naive, narrow, parse_column, to_naive};

/// Attempts are kept as a JSON array in a text column.
#[derive(Queryable, Identifiable, Insertable, AsChangeset, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::fetch_sessions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct SessionDB {
    pub id: String,
    pub period: String,
    pub status: String,
    pub created_at: chrono::NaiveDateTime,
    pub started_at: Option<chrono::NaiveDateTime>,
    pub completed_at: Option<chrono::NaiveDateTime>,
    pub attempts: String,
    pub final_source: Option<String>,
    pub retry_count: i32,
    pub error: Option<String>,
}

impl TryFrom<&SessionSnapshot> for SessionDB {
    type Error = StorageError;

    fn try_from(session: &SessionSnapshot) -> Result<Self, Self::Error> {
        Ok(Self {
            id: session.id.clone(),
            period: session.period.key(),
            status: session.status.as_str().to_string(),
            created_at: to_naive(session.created_at),
            started_at: session.started_at.map(to_naive),
            completed_at: session.completed_at.map(to_naive),
            attempts: serde_json::to_string(&session.attempts)?,
            final_source: session.final_source.clone(),
            retry_count: narrow("retry_count", session.retry_count)?,
            error: session.error.clone(),
        })
    }
}

impl TryFrom<SessionDB> for SessionSnapshot {
    type Error = StorageError;

    fn try_from(row: SessionDB) -> Result<Self, Self::Error> {
        let attempts: Vec<SourceAttempt> = serde_json::from_str(&row.attempts)?;
        Ok(SessionSnapshot {
            period: parse_column("period", &row.period)?,
            status: parse_column("status", &row.status)?,
            created_at: from_naive(row.created_at),
            started_at: row.started_at.map(from_naive),
            completed_at: row.completed_at.map(from_naive),
            attempts,
            retry_count: narrow("retry_count", row.retry_count)?,
            final_source: row.final_source,
            error: row.error,
            id: row.id,
        })
    }
}
