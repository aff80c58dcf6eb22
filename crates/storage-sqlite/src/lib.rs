//! SQLite storage implementation for the TÜFE fetch subsystem.
//!
//! This crate provides all database-related functionality using Diesel ORM with SQLite.
//! It implements the store traits defined in `tufe-core` and contains:
//! - Database connection pooling and management
//! - Diesel migrations
//! - Repository implementations for sources, sessions, cached values and
//!   auto-config records
//! - Database-specific model types (with Diesel derives)
//!
//! All writes go through one writer actor holding a dedicated connection;
//! reads use the pool.

pub mod db;
pub mod errors;
pub mod schema;
pub mod utils;

// Repository implementations
pub mod auto_config;
pub mod cache;
pub mod sessions;
pub mod sources;

use std::sync::Arc;

use tufe_core::store::FetchStores;
use tufe_core::Result;

pub use auto_config::AutoConfigRepository;
pub use cache::CacheRepository;
pub use db::{create_pool, get_connection, init, open, run_migrations, DbConnection, DbPool, WriteHandle};
pub use errors::{IntoCore, StorageError};
pub use sessions::SessionRepository;
pub use sources::SourceRepository;

/// Builds the four stores over one pool and writer.
pub fn fetch_stores(pool: Arc<DbPool>, writer: WriteHandle) -> FetchStores {
    FetchStores {
        sources: Arc::new(SourceRepository::new(pool.clone(), writer.clone())),
        sessions: Arc::new(SessionRepository::new(pool.clone(), writer.clone())),
        cache: Arc::new(CacheRepository::new(pool.clone(), writer.clone())),
        auto_config: Arc::new(AutoConfigRepository::new(pool, writer)),
    }
}

/// Opens (and migrates) the database at `db_path` and returns its stores.
///
/// Must be called inside a Tokio runtime; the writer actor is spawned on it.
pub fn open_stores(db_path: &str) -> Result<FetchStores> {
    let (pool, writer) = open(db_path)?;
    Ok(fetch_stores(pool, writer))
}

#[cfg(test)]
mod tests;
