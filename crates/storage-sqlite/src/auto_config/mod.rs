//! SQLite storage implementation for auto-configuration records.

mod model;
mod repository;

pub use model::AutoConfigDB;
pub use repository::AutoConfigRepository;
