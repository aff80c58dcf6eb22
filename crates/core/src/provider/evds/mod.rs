//! TCMB EVDS provider.
//!
//! Reads the consumer price index series from the Central Bank's EVDS
//! service and derives the year-over-year and month-over-month changes from
//! index levels. A single request covers the target month, the month before
//! it and the same month a year earlier. Annual periods resolve to December.
//!
//! The API key is sent in the `key` header.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use log::debug;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;

use crate::errors::{FetchError, Result};
use crate::models::{AuthRequirement, InflationReading, PayloadFormat, Period};
use crate::provider::{
    check_status, http_client, InflationProvider, PeriodSupport, ProviderDescriptor, RateLimit,
};

/// Provider ID constant
pub const PROVIDER_ID: &str = "TCMB_EVDS";

const PROVIDER_NAME: &str = "TCMB EVDS";

const BASE_URL: &str = "https://evds2.tcmb.gov.tr/service/evds";

/// General CPI index (2003=100).
pub const DEFAULT_SERIES: &str = "TP.FG.J0";

#[derive(Debug, Deserialize)]
struct EvdsResponse {
    #[serde(default)]
    items: Vec<HashMap<String, serde_json::Value>>,
}

pub struct EvdsProvider {
    client: Client,
    base_url: String,
    series_code: String,
}

impl EvdsProvider {
    pub fn new() -> Self {
        Self::with_series(DEFAULT_SERIES)
    }

    pub fn with_series(series_code: impl Into<String>) -> Self {
        Self {
            client: http_client(),
            base_url: BASE_URL.to_string(),
            series_code: series_code.into(),
        }
    }

    fn url(&self, series_code: &str, start: NaiveDate, end: NaiveDate) -> String {
        format!(
            "{}/series={}&startDate={}&endDate={}&type=json&frequency=5",
            self.base_url,
            series_code,
            start.format("%d-%m-%Y"),
            end.format("%d-%m-%Y")
        )
    }

    async fn get_items(
        &self,
        series_code: &str,
        start: NaiveDate,
        end: NaiveDate,
        api_key: &str,
    ) -> Result<HashMap<(i32, u32), Decimal>> {
        let url = self.url(series_code, start, end);
        debug!("EVDS request: {}", url);

        let response = self
            .client
            .get(&url)
            .header("key", api_key)
            .send()
            .await
            .map_err(|e| FetchError::from_transport(PROVIDER_ID, e))?;
        let body: EvdsResponse = check_status(PROVIDER_ID, response)?
            .json()
            .await
            .map_err(|e| FetchError::from_transport(PROVIDER_ID, e))?;

        parse_items(&body.items, series_code)
    }
}

impl Default for EvdsProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Index levels keyed by (year, month).
fn parse_items(
    items: &[HashMap<String, serde_json::Value>],
    series_code: &str,
) -> Result<HashMap<(i32, u32), Decimal>> {
    let field = series_code.replace('.', "_");
    let mut levels = HashMap::new();

    for item in items {
        let Some(date) = item.get("Tarih").and_then(|v| v.as_str()) else {
            continue;
        };
        let Some((year, month)) = date.split_once('-') else {
            continue;
        };
        let (Ok(year), Ok(month)) = (year.parse::<i32>(), month.parse::<u32>()) else {
            continue;
        };
        let level = match item.get(&field) {
            Some(serde_json::Value::String(s)) => Decimal::from_str(s.trim()).ok(),
            Some(serde_json::Value::Number(n)) => n.as_f64().and_then(|f| Decimal::try_from(f).ok()),
            _ => None,
        };
        if let Some(level) = level {
            levels.insert((year, month), level);
        }
    }

    if levels.is_empty() {
        return Err(FetchError::provider(
            PROVIDER_ID,
            format!("no observations for series {}", series_code),
        ));
    }
    Ok(levels)
}

fn shift_month(year: i32, month: u32, back: u32) -> (i32, u32) {
    let index = year * 12 + month as i32 - 1 - back as i32;
    (index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
}

/// First and last day of the observations needed for `period`: the target
/// month back to the same month a year earlier.
fn request_window(period: &Period) -> Result<(NaiveDate, NaiveDate)> {
    let (year, month) = (period.year(), period.month().unwrap_or(12));
    let (from_year, from_month) = shift_month(year, month, 12);
    let start = NaiveDate::from_ymd_opt(from_year, from_month, 1).ok_or_else(|| {
        FetchError::provider(PROVIDER_ID, format!("no base month for {}", period))
    })?;
    Ok((start, period.last_day()))
}

fn change(current: Decimal, previous: Decimal) -> Option<Decimal> {
    if previous.is_zero() {
        return None;
    }
    Some(((current / previous - Decimal::ONE) * Decimal::ONE_HUNDRED).round_dp(2))
}

#[async_trait]
impl InflationProvider for EvdsProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn priority(&self) -> u8 {
        1
    }

    fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            endpoint: self.base_url.clone(),
            series_code: self.series_code.clone(),
            format: PayloadFormat::Json,
            auth: AuthRequirement::ApiKey,
        }
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit {
            requests_per_minute: 30,
            burst_capacity: 3.0,
        }
    }

    fn period_support(&self) -> PeriodSupport {
        PeriodSupport::ALL
    }

    async fn fetch(
        &self,
        series_code: &str,
        period: &Period,
        credential: Option<&str>,
    ) -> Result<InflationReading> {
        let api_key = credential.ok_or_else(|| FetchError::MissingCredential(PROVIDER_ID.into()))?;

        let (year, month) = (period.year(), period.month().unwrap_or(12));
        let (from_year, from_month) = shift_month(year, month, 12);
        let (start, end) = request_window(period)?;

        let levels = self.get_items(series_code, start, end, api_key).await?;

        let current = levels.get(&(year, month)).copied().ok_or_else(|| {
            FetchError::provider(PROVIDER_ID, format!("{} not published yet", period))
        })?;
        let year_ago = levels
            .get(&(from_year, from_month))
            .copied()
            .ok_or_else(|| FetchError::provider(PROVIDER_ID, "missing base month"))?;
        let rate = change(current, year_ago)
            .ok_or_else(|| FetchError::provider(PROVIDER_ID, "zero base index"))?;

        let mut reading = InflationReading::new(*period, rate, PROVIDER_NAME, series_code, Utc::now());
        if period.is_monthly() {
            let previous = shift_month(year, month, 1);
            if let Some(monthly) = levels.get(&previous).and_then(|prev| change(current, *prev)) {
                reading = reading.with_monthly_rate(monthly);
            }
        }
        Ok(reading)
    }

    async fn probe(&self, credential: Option<&str>) -> Result<()> {
        let api_key = credential.ok_or_else(|| FetchError::MissingCredential(PROVIDER_ID.into()))?;
        let today = Utc::now().date_naive();
        let start = NaiveDate::from_ymd_opt(today.year() - 1, 1, 1).unwrap_or(today);
        self.get_items(&self.series_code, start, today, api_key)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn item(date: &str, value: &str) -> HashMap<String, serde_json::Value> {
        serde_json::from_value(json!({ "Tarih": date, "TP_FG_J0": value, "UNIXTIME": {} }))
            .unwrap()
    }

    #[test]
    fn test_provider_id() {
        let provider = EvdsProvider::new();
        assert_eq!(provider.id(), "TCMB_EVDS");
        assert_eq!(provider.priority(), 1);
        assert_eq!(provider.descriptor().auth, AuthRequirement::ApiKey);
    }

    #[test]
    fn test_shift_month_crosses_year() {
        assert_eq!(shift_month(2024, 1, 1), (2023, 12));
        assert_eq!(shift_month(2024, 3, 12), (2023, 3));
        assert_eq!(shift_month(2024, 12, 12), (2023, 12));
    }

    #[test]
    fn test_request_window_reaches_before_first_period_year() {
        let period = Period::monthly(1900, 5).unwrap();
        let (start, end) = request_window(&period).unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(1899, 5, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(1900, 5, 31).unwrap());

        let annual = Period::annual(2023).unwrap();
        let (start, end) = request_window(&annual).unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2022, 12, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
    }

    #[test]
    fn test_parse_items_skips_nulls() {
        let mut items = vec![item("2023-12", "1859.38"), item("2024-1", "1984.02")];
        items.push(
            serde_json::from_value(json!({ "Tarih": "2024-2", "TP_FG_J0": null })).unwrap(),
        );
        let levels = parse_items(&items, "TP.FG.J0").unwrap();
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[&(2024, 1)], dec!(1984.02));
    }

    #[test]
    fn test_change_from_levels() {
        assert_eq!(change(dec!(200), dec!(100)), Some(dec!(100.00)));
        assert_eq!(change(dec!(164.27), dec!(100)), Some(dec!(64.27)));
        assert_eq!(change(dec!(1), Decimal::ZERO), None);
    }

    #[tokio::test]
    async fn test_fetch_without_key_is_missing_credential() {
        let provider = EvdsProvider::new();
        let period = Period::monthly(2024, 1).unwrap();
        let result = provider.fetch(DEFAULT_SERIES, &period, None).await;
        assert!(matches!(result, Err(FetchError::MissingCredential(_))));
    }
}
