//! SQLite storage implementation for cached inflation values.

mod model;
mod repository;

pub use model::CachedEntryDB;
pub use repository::CacheRepository;
