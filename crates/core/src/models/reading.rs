use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::period::Period;

/// A single inflation value as returned by a provider adapter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InflationReading {
    pub period: Period,
    /// Year-over-year change in percent.
    pub rate: Decimal,
    /// Month-over-month change in percent, when the provider publishes it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_rate: Option<Decimal>,
    /// Name of the provider that produced the value.
    pub source: String,
    pub series_code: String,
    pub fetched_at: DateTime<Utc>,
}

impl InflationReading {
    pub fn new(
        period: Period,
        rate: Decimal,
        source: impl Into<String>,
        series_code: impl Into<String>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            period,
            rate,
            monthly_rate: None,
            source: source.into(),
            series_code: series_code.into(),
            fetched_at,
        }
    }

    pub fn with_monthly_rate(mut self, monthly_rate: Decimal) -> Self {
        self.monthly_rate = Some(monthly_rate);
        self
    }
}
