use serde::{Deserialize, Serialize};

use crate::models::CachedEntry;

use super::session::SourceAttempt;

/// Outcome of a fetch handed back to callers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchResult {
    pub success: bool,
    /// The accepted value.
    pub data: Option<CachedEntry>,
    /// Name of the winning source.
    pub source: Option<String>,
    /// Attempts made by this run, in order.
    pub attempts: Vec<SourceAttempt>,
    /// True when served from the cache without contacting any source.
    pub cached: bool,
    pub duration_ms: u64,
    /// Session that produced the value; `None` for cache hits.
    pub session_id: Option<String>,
    pub error: Option<String>,
}

impl FetchResult {
    pub(crate) fn from_cache(entry: CachedEntry, duration_ms: u64) -> Self {
        Self {
            success: true,
            source: Some(entry.source_name.clone()),
            data: Some(entry),
            attempts: Vec::new(),
            cached: true,
            duration_ms,
            session_id: None,
            error: None,
        }
    }
}
