pub mod api;
pub mod config;
pub mod error;
pub mod main_lib;
pub mod secrets;

pub use main_lib::{build_providers, build_state, build_state_with, init_tracing, AppState};
