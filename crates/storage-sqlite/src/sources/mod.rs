//! SQLite storage implementation for fetch sources.

mod model;
mod repository;

pub use model::SourceDB;
pub use repository::SourceRepository;
