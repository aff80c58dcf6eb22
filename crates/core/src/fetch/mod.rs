//! Fetch sessions and the fallback orchestrator.

mod orchestrator;
mod result;
mod session;

pub use orchestrator::{ConcurrentFetchPolicy, FetchOrchestrator, OrchestratorConfig};
pub use result::FetchResult;
pub use session::{FetchSession, SessionSnapshot, SessionStatus, SourceAttempt};
