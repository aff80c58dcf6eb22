//! Response validation and quality scoring.
//!
//! Runs independent checks over a fetched reading and the source it claims to
//! come from:
//! - rate plausibility (configured bands for annual and monthly change)
//! - source attribution
//! - freshness of `fetched_at`
//! - deviation from known recent values of the same period kind
//! - format completeness
//!
//! Each warning and error lowers the quality score by a fixed penalty. A
//! reading is valid when no check produced an error.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::debug;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::clock::{Clock, SystemClock};
use crate::models::{checks, CheckOutcome, InflationReading, Period, Source, ValidationResult};

/// Validator thresholds.
#[derive(Clone, Debug)]
pub struct ValidatorConfig {
    /// Inclusive band for the year-over-year rate, in percent.
    pub min_rate: Decimal,
    pub max_rate: Decimal,
    /// Inclusive band for the month-over-month rate, in percent.
    pub min_monthly_rate: Decimal,
    pub max_monthly_rate: Decimal,
    /// Age after which a reading draws a warning.
    pub warn_age: Duration,
    /// Age after which a reading is rejected.
    pub stale_age: Duration,
    /// Clock skew tolerated for `fetched_at` in the future.
    pub future_tolerance: Duration,
    /// Deviation from the reference value, in percentage points.
    pub deviation_warn_pp: Decimal,
    pub deviation_error_pp: Decimal,
    /// References further away than this are ignored.
    pub reference_window_months: i64,
    pub warning_penalty: f64,
    pub error_penalty: f64,
    /// Known published values keyed by period.
    pub references: BTreeMap<Period, Decimal>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            min_rate: dec!(0),
            max_rate: dec!(100),
            min_monthly_rate: dec!(-10),
            max_monthly_rate: dec!(25),
            warn_age: Duration::hours(24),
            stale_age: Duration::hours(48),
            future_tolerance: Duration::minutes(5),
            deviation_warn_pp: dec!(15),
            deviation_error_pp: dec!(50),
            reference_window_months: 12,
            warning_penalty: 0.10,
            error_penalty: 0.35,
            references: default_references(),
        }
    }
}

/// Published TÜFE year-over-year values.
fn default_references() -> BTreeMap<Period, Decimal> {
    let monthly: [(i32, u32, Decimal); 9] = [
        (2021, 12, dec!(36.08)),
        (2022, 10, dec!(85.51)),
        (2022, 12, dec!(64.27)),
        (2023, 6, dec!(38.21)),
        (2023, 12, dec!(64.77)),
        (2024, 5, dec!(75.45)),
        (2024, 6, dec!(71.60)),
        (2024, 12, dec!(44.38)),
        (2025, 6, dec!(35.05)),
    ];
    let annual: [(i32, Decimal); 3] = [(2022, dec!(72.31)), (2023, dec!(53.86)), (2024, dec!(58.51))];

    let mut references = BTreeMap::new();
    for (year, month, value) in monthly {
        if let Ok(period) = Period::monthly(year, month) {
            references.insert(period, value);
        }
    }
    for (year, value) in annual {
        if let Ok(period) = Period::annual(year) {
            references.insert(period, value);
        }
    }
    references
}

/// Accumulates check outcomes into a [`ValidationResult`].
#[derive(Default)]
struct Report {
    warnings: Vec<String>,
    errors: Vec<String>,
    details: BTreeMap<String, CheckOutcome>,
}

impl Report {
    fn pass(&mut self, check: &str, note: Option<String>) {
        self.details.insert(
            check.to_string(),
            CheckOutcome {
                passed: true,
                message: note,
            },
        );
    }

    fn warn(&mut self, check: &str, message: String) {
        self.warnings.push(message.clone());
        self.details
            .entry(check.to_string())
            .or_insert(CheckOutcome {
                passed: true,
                message: Some(message),
            });
    }

    fn fail(&mut self, check: &str, message: String) {
        self.errors.push(message.clone());
        self.details.insert(
            check.to_string(),
            CheckOutcome {
                passed: false,
                message: Some(message),
            },
        );
    }

    fn finish(self, config: &ValidatorConfig) -> ValidationResult {
        let penalty = self.warnings.len() as f64 * config.warning_penalty
            + self.errors.len() as f64 * config.error_penalty;
        ValidationResult {
            valid: self.errors.is_empty(),
            quality_score: (1.0 - penalty).clamp(0.0, 1.0),
            warnings: self.warnings,
            errors: self.errors,
            details: self.details,
        }
    }
}

/// Validates fetched readings.
pub struct ResponseValidator {
    config: ValidatorConfig,
    clock: Arc<dyn Clock>,
}

impl ResponseValidator {
    pub fn new() -> Self {
        Self::with_config(ValidatorConfig::default())
    }

    pub fn with_config(config: ValidatorConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validates `reading` as coming from `source`, using the current time.
    pub fn validate(&self, reading: &InflationReading, source: &Source) -> ValidationResult {
        self.validate_at(reading, source, self.clock.now())
    }

    pub fn validate_at(
        &self,
        reading: &InflationReading,
        source: &Source,
        now: DateTime<Utc>,
    ) -> ValidationResult {
        let mut report = Report::default();
        self.check_rate(reading, &mut report);
        self.check_attribution(reading, source, &mut report);
        self.check_freshness(reading, now, &mut report);
        self.check_history(reading, &mut report);
        self.check_format(reading, None, &mut report);
        let result = report.finish(&self.config);
        debug!(
            "Validated {} from '{}': valid={} score={:.2}",
            reading.period, source.name, result.valid, result.quality_score
        );
        result
    }

    /// Like [`Self::validate_at`], also requiring the reading to answer `requested`.
    pub fn validate_for_period(
        &self,
        reading: &InflationReading,
        source: &Source,
        requested: &Period,
        now: DateTime<Utc>,
    ) -> ValidationResult {
        let mut report = Report::default();
        self.check_rate(reading, &mut report);
        self.check_attribution(reading, source, &mut report);
        self.check_freshness(reading, now, &mut report);
        self.check_history(reading, &mut report);
        self.check_format(reading, Some(requested), &mut report);
        report.finish(&self.config)
    }

    fn check_rate(&self, reading: &InflationReading, report: &mut Report) {
        let c = &self.config;
        if reading.rate < c.min_rate || reading.rate > c.max_rate {
            report.fail(
                checks::RATE_PLAUSIBILITY,
                format!(
                    "rate {}% outside {}%..{}%",
                    reading.rate, c.min_rate, c.max_rate
                ),
            );
            return;
        }
        if let Some(monthly) = reading.monthly_rate {
            if monthly < c.min_monthly_rate || monthly > c.max_monthly_rate {
                report.fail(
                    checks::RATE_PLAUSIBILITY,
                    format!(
                        "monthly rate {}% outside {}%..{}%",
                        monthly, c.min_monthly_rate, c.max_monthly_rate
                    ),
                );
                return;
            }
        }
        report.pass(checks::RATE_PLAUSIBILITY, None);
    }

    fn check_attribution(&self, reading: &InflationReading, source: &Source, report: &mut Report) {
        if reading.source.trim() == source.name.trim() {
            report.pass(checks::SOURCE_ATTRIBUTION, None);
        } else {
            report.fail(
                checks::SOURCE_ATTRIBUTION,
                format!(
                    "data attributed to '{}' but requested from '{}'",
                    reading.source, source.name
                ),
            );
        }
    }

    fn check_freshness(&self, reading: &InflationReading, now: DateTime<Utc>, report: &mut Report) {
        let age = now - reading.fetched_at;
        let c = &self.config;
        if age < -c.future_tolerance {
            report.fail(
                checks::FRESHNESS,
                format!("fetched_at {} is in the future", reading.fetched_at),
            );
        } else if age > c.stale_age {
            report.fail(
                checks::FRESHNESS,
                format!("data is {}h old, stale after {}h", age.num_hours(), c.stale_age.num_hours()),
            );
        } else if age > c.warn_age {
            report.warn(
                checks::FRESHNESS,
                format!("data is {}h old", age.num_hours()),
            );
        } else {
            report.pass(checks::FRESHNESS, None);
        }
    }

    /// Closest reference of the same period kind within the window.
    fn reference_for(&self, period: &Period) -> Option<(Period, Decimal)> {
        self.config
            .references
            .iter()
            .filter_map(|(p, v)| period.months_between(p).map(|d| (d, *p, *v)))
            .filter(|(d, _, _)| *d <= self.config.reference_window_months)
            .min_by_key(|(d, p, _)| (*d, *p))
            .map(|(_, p, v)| (p, v))
    }

    fn check_history(&self, reading: &InflationReading, report: &mut Report) {
        let Some((reference_period, reference)) = self.reference_for(&reading.period) else {
            report.pass(
                checks::HISTORICAL_REASONABLENESS,
                Some("no reference value".to_string()),
            );
            return;
        };
        let deviation = (reading.rate - reference).abs();
        let message = format!(
            "rate {}% deviates {}pp from {}% ({})",
            reading.rate, deviation, reference, reference_period
        );
        if deviation > self.config.deviation_error_pp {
            report.fail(checks::HISTORICAL_REASONABLENESS, message);
        } else if deviation > self.config.deviation_warn_pp {
            report.warn(checks::HISTORICAL_REASONABLENESS, message);
        } else {
            report.pass(checks::HISTORICAL_REASONABLENESS, None);
        }
    }

    fn check_format(&self, reading: &InflationReading, requested: Option<&Period>, report: &mut Report) {
        if reading.source.trim().is_empty() {
            report.fail(checks::FORMAT_COMPLETENESS, "source is empty".to_string());
            return;
        }
        if reading.series_code.trim().is_empty() {
            report.fail(checks::FORMAT_COMPLETENESS, "series code is empty".to_string());
            return;
        }
        if let Some(requested) = requested {
            if reading.period != *requested {
                report.fail(
                    checks::FORMAT_COMPLETENESS,
                    format!("requested {} but got {}", requested, reading.period),
                );
                return;
            }
        }
        if reading.period.is_monthly() && reading.monthly_rate.is_none() {
            report.warn(
                checks::FORMAT_COMPLETENESS,
                "monthly change missing".to_string(),
            );
            return;
        }
        report.pass(checks::FORMAT_COMPLETENESS, None);
    }
}

impl Default for ResponseValidator {
    fn default() -> Self {
        Self::new()
    }
}
