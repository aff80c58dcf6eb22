use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::period::Period;
use super::reading::InflationReading;

/// A previously accepted value, valid until `expires_at`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedEntry {
    pub period: Period,
    pub rate: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_rate: Option<Decimal>,
    pub source_name: String,
    pub series_code: String,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub quality_score: f64,
    pub validated: bool,
}

impl CachedEntry {
    pub fn from_reading(
        reading: InflationReading,
        quality_score: f64,
        validated: bool,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            period: reading.period,
            rate: reading.rate,
            monthly_rate: reading.monthly_rate,
            source_name: reading.source,
            series_code: reading.series_code,
            fetched_at: reading.fetched_at,
            expires_at: now + ttl,
            quality_score: quality_score.clamp(0.0, 1.0),
            validated,
        }
    }

    /// An entry is live strictly before `expires_at`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_expiry_is_exclusive() {
        let now = Utc::now();
        let reading = InflationReading::new(
            Period::monthly(2024, 1).unwrap(),
            dec!(64.86),
            "TCMB EVDS",
            "TP.FG.J0",
            now,
        );
        let entry = CachedEntry::from_reading(reading, 1.0, true, Duration::hours(24), now);
        assert!(!entry.is_expired(now + Duration::hours(23)));
        assert!(entry.is_expired(now + Duration::hours(24)));
    }
}
