//! SQLite storage implementation for fetch sessions.

mod model;
mod repository;

pub use model::SessionDB;
pub use repository::SessionRepository;
