//! Storage traits.
//!
//! The fetch subsystem is store-agnostic. These traits are the CRUD surface it
//! needs for sources, sessions, cached entries and the auto-config record.
//! `tufe-storage-sqlite` provides the SQLite implementation.

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::Result;
use crate::fetch::SessionSnapshot;
use crate::models::{AutoConfig, CachedEntry, Period, Source};

// =============================================================================
// Source Store
// =============================================================================

#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Inserts or replaces a source by id.
    async fn save_source(&self, source: &Source) -> Result<()>;

    /// All persisted sources, inactive ones included.
    async fn load_sources(&self) -> Result<Vec<Source>>;
}

// =============================================================================
// Session Store
// =============================================================================

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Inserts or replaces a session by id, attempts included.
    async fn save_session(&self, session: &SessionSnapshot) -> Result<()>;

    async fn get_session(&self, id: &str) -> Result<Option<SessionSnapshot>>;

    /// Most recent sessions first, optionally restricted to one period.
    async fn list_sessions(
        &self,
        period: Option<&Period>,
        limit: usize,
    ) -> Result<Vec<SessionSnapshot>>;
}

// =============================================================================
// Cache Store
// =============================================================================

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Inserts or replaces the entry for its period.
    async fn save_cached_entry(&self, entry: &CachedEntry) -> Result<()>;

    async fn load_cached_entries(&self) -> Result<Vec<CachedEntry>>;

    async fn delete_cached_entry(&self, period: &Period) -> Result<()>;
}

// =============================================================================
// Auto-Config Store
// =============================================================================

#[async_trait]
pub trait AutoConfigStore: Send + Sync {
    async fn get_auto_config(&self, name: &str) -> Result<Option<AutoConfig>>;

    /// Fails if a record with the same name exists.
    async fn insert_auto_config(&self, config: &AutoConfig) -> Result<()>;

    async fn update_auto_config(&self, config: &AutoConfig) -> Result<()>;
}

/// The four stores the service needs.
#[derive(Clone)]
pub struct FetchStores {
    pub sources: Arc<dyn SourceStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub cache: Arc<dyn CacheStore>,
    pub auto_config: Arc<dyn AutoConfigStore>,
}

impl FetchStores {
    /// Uses one backend for all four stores.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: SourceStore + SessionStore + CacheStore + AutoConfigStore + 'static,
    {
        Self {
            sources: store.clone(),
            sessions: store.clone(),
            cache: store.clone(),
            auto_config: store,
        }
    }
}
