use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{FetchError, Result};

/// Highest (least preferred) priority a source may carry.
pub const MAX_PRIORITY: u8 = 10;

/// Reliability assigned to a source that has no recorded outcomes.
pub const NEUTRAL_RELIABILITY: f64 = 0.5;

/// Coarse reliability classification of a source.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Failed,
    #[default]
    Unknown,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HealthStatus {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "healthy" => Ok(Self::Healthy),
            "degraded" => Ok(Self::Degraded),
            "failed" => Ok(Self::Failed),
            "unknown" => Ok(Self::Unknown),
            other => Err(FetchError::InvalidInput(format!(
                "unknown health status '{}'",
                other
            ))),
        }
    }
}

/// Wire format of a provider payload.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadFormat {
    #[default]
    Json,
    Xml,
    Csv,
}

impl PayloadFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Xml => "xml",
            Self::Csv => "csv",
        }
    }
}

impl FromStr for PayloadFormat {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(Self::Json),
            "xml" => Ok(Self::Xml),
            "csv" => Ok(Self::Csv),
            other => Err(FetchError::InvalidInput(format!(
                "unknown payload format '{}'",
                other
            ))),
        }
    }
}

/// Authentication a provider requires.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthRequirement {
    #[default]
    None,
    ApiKey,
}

impl AuthRequirement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ApiKey => "api_key",
        }
    }

    pub fn is_required(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl FromStr for AuthRequirement {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Self::None),
            "api_key" => Ok(Self::ApiKey),
            other => Err(FetchError::InvalidInput(format!(
                "unknown auth requirement '{}'",
                other
            ))),
        }
    }
}

/// Rate-limit budget of a source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateBudget {
    /// Steady-state request allowance.
    pub requests_per_minute: u32,
    /// Remaining quota reported by the provider, if it reports one.
    pub remaining: Option<u32>,
    /// When the provider's quota resets.
    pub reset_at: Option<DateTime<Utc>>,
}

impl Default for RateBudget {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            remaining: None,
            reset_at: None,
        }
    }
}

impl RateBudget {
    pub fn per_minute(requests_per_minute: u32) -> Self {
        Self {
            requests_per_minute,
            ..Default::default()
        }
    }

    /// True while the provider has told us to stop and the reset time is ahead.
    pub fn is_exhausted(&self, now: DateTime<Utc>) -> bool {
        match (self.remaining, self.reset_at) {
            (Some(0), Some(reset_at)) => now < reset_at,
            (Some(0), None) => true,
            _ => false,
        }
    }
}

/// A configured provider plus a specific series/endpoint.
///
/// Instances handed out by the registry are snapshots. Counters and health are
/// only changed through the source manager's recording operations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub id: String,
    /// Key of the provider adapter serving this source.
    pub provider_id: String,
    /// Attribution name; fetched data must report the same name.
    pub name: String,
    pub endpoint: String,
    pub series_code: String,
    pub format: PayloadFormat,
    pub auth: AuthRequirement,
    pub rate_budget: RateBudget,
    /// 0..=10, lower is more preferred.
    pub priority: u8,
    /// success / (success + failure), in [0, 1].
    pub reliability_score: f64,
    pub health_status: HealthStatus,
    pub success_count: u64,
    pub failure_count: u64,
    /// Running average over successful calls, in milliseconds.
    pub avg_response_time_ms: f64,
    pub last_health_check: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Source {
    /// Validating constructor for a fresh source.
    pub fn new(new_source: NewSource, now: DateTime<Utc>) -> Result<Self> {
        new_source.validate()?;
        Ok(Self {
            id: new_source
                .id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            provider_id: new_source.provider_id,
            name: new_source.name,
            endpoint: new_source.endpoint,
            series_code: new_source.series_code,
            format: new_source.format,
            auth: new_source.auth,
            rate_budget: new_source.rate_budget,
            priority: new_source.priority,
            reliability_score: NEUTRAL_RELIABILITY,
            health_status: HealthStatus::Unknown,
            success_count: 0,
            failure_count: 0,
            avg_response_time_ms: 0.0,
            last_health_check: None,
            last_error: None,
            active: true,
            created_at: now,
            updated_at: now,
        })
    }

    /// Recomputes `reliability_score` from the counters.
    pub(crate) fn recompute_reliability(&mut self) {
        let total = self.success_count + self.failure_count;
        self.reliability_score = if total == 0 {
            NEUTRAL_RELIABILITY
        } else {
            self.success_count as f64 / total as f64
        };
    }

    /// Ranking key: priority asc, reliability desc, latency asc.
    pub fn rank_cmp(&self, other: &Source) -> std::cmp::Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.reliability_score.total_cmp(&self.reliability_score))
            .then_with(|| self.avg_response_time_ms.total_cmp(&other.avg_response_time_ms))
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Input for registering a source.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSource {
    /// Optional stable id; a UUID is generated otherwise.
    #[serde(default)]
    pub id: Option<String>,
    pub provider_id: String,
    pub name: String,
    #[serde(default)]
    pub endpoint: String,
    pub series_code: String,
    #[serde(default)]
    pub format: PayloadFormat,
    #[serde(default)]
    pub auth: AuthRequirement,
    #[serde(default)]
    pub rate_budget: RateBudget,
    pub priority: u8,
}

impl NewSource {
    pub fn validate(&self) -> Result<()> {
        if self.provider_id.trim().is_empty() {
            return Err(FetchError::InvalidInput("provider id is required".into()));
        }
        if self.name.trim().is_empty() {
            return Err(FetchError::InvalidInput("source name is required".into()));
        }
        if self.series_code.trim().is_empty() {
            return Err(FetchError::InvalidInput("series code is required".into()));
        }
        if let Some(id) = &self.id {
            if id.trim().is_empty() {
                return Err(FetchError::InvalidInput("source id must not be blank".into()));
            }
        }
        validate_priority(self.priority)?;
        if self.rate_budget.requests_per_minute == 0 {
            return Err(FetchError::InvalidInput(
                "requests per minute must be positive".into(),
            ));
        }
        Ok(())
    }
}

pub(crate) fn validate_priority(priority: u8) -> Result<()> {
    if priority > MAX_PRIORITY {
        return Err(FetchError::InvalidInput(format!(
            "priority {} outside 0..={}",
            priority, MAX_PRIORITY
        )));
    }
    Ok(())
}

/// Health overview entry returned to callers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceHealthSummary {
    pub source_id: String,
    pub source: String,
    pub health_status: HealthStatus,
    pub reliability_score: f64,
    pub priority: u8,
    pub active: bool,
    pub avg_response_time_ms: f64,
    pub last_health_check: Option<DateTime<Utc>>,
}

impl From<&Source> for SourceHealthSummary {
    fn from(source: &Source) -> Self {
        Self {
            source_id: source.id.clone(),
            source: source.name.clone(),
            health_status: source.health_status,
            reliability_score: source.reliability_score,
            priority: source.priority,
            active: source.active,
            avg_response_time_ms: source.avg_response_time_ms,
            last_health_check: source.last_health_check,
        }
    }
}
