use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::FetchError;

/// Check names used as keys of [`ValidationResult::details`].
pub mod checks {
    pub const RATE_PLAUSIBILITY: &str = "rate_plausibility";
    pub const SOURCE_ATTRIBUTION: &str = "source_attribution";
    pub const FRESHNESS: &str = "freshness";
    pub const HISTORICAL_REASONABLENESS: &str = "historical_reasonableness";
    pub const FORMAT_COMPLETENESS: &str = "format_completeness";
}

/// Outcome of one validator check.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Aggregate result of validating one reading.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub valid: bool,
    pub quality_score: f64,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub details: BTreeMap<String, CheckOutcome>,
}

impl ValidationResult {
    /// Converts a rejected result into the error recorded against the source.
    pub fn to_error(&self) -> Option<FetchError> {
        if self.valid {
            return None;
        }
        Some(FetchError::ValidationFailed {
            message: self.errors.join("; "),
        })
    }
}
