//! World Bank provider.
//!
//! Public indicator API, annual values only. The series code is the
//! indicator id, `FP.CPI.TOTL.ZG` (inflation, consumer prices, annual %).

use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use reqwest::Client;
use serde::Deserialize;

use crate::errors::{FetchError, Result};
use crate::models::{AuthRequirement, InflationReading, PayloadFormat, Period};
use crate::provider::{
    check_status, http_client, percent, InflationProvider, PeriodSupport, ProviderDescriptor,
    RateLimit,
};

/// Provider ID constant
pub const PROVIDER_ID: &str = "WORLD_BANK";

const PROVIDER_NAME: &str = "World Bank";

const BASE_URL: &str = "https://api.worldbank.org/v2";

pub const DEFAULT_SERIES: &str = "FP.CPI.TOTL.ZG";

const COUNTRY_CODE: &str = "TR";


#[derive(Debug, Deserialize)]
struct WorldBankDataPoint {
    date: String,
    value: Option<f64>,
}

pub struct WorldBankProvider {
    client: Client,
    base_url: String,
}

impl WorldBankProvider {
    pub fn new() -> Self {
        Self {
            client: http_client(),
            base_url: BASE_URL.to_string(),
        }
    }

    fn url(&self, series_code: &str, date: &str) -> String {
        format!(
            "{}/country/{}/indicator/{}?format=json&date={}",
            self.base_url, COUNTRY_CODE, series_code, date
        )
    }

    async fn get_points(&self, url: &str) -> Result<Vec<WorldBankDataPoint>> {
        debug!("World Bank request: {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_transport(PROVIDER_ID, e))?;
        let body: serde_json::Value = check_status(PROVIDER_ID, response)?
            .json()
            .await
            .map_err(|e| FetchError::from_transport(PROVIDER_ID, e))?;
        parse_points(body)
    }
}

impl Default for WorldBankProvider {
    fn default() -> Self {
        Self::new()
    }
}

// The API answers `[meta, data]`, or `[{"message": [...]}]` on errors.
fn parse_points(body: serde_json::Value) -> Result<Vec<WorldBankDataPoint>> {
    match body {
        serde_json::Value::Array(mut parts) if parts.len() >= 2 => {
            let data = parts.swap_remove(1);
            if data.is_null() {
                return Ok(Vec::new());
            }
            serde_json::from_value(data).map_err(|e| FetchError::provider(PROVIDER_ID, e))
        }
        serde_json::Value::Array(parts) => Err(FetchError::provider(
            PROVIDER_ID,
            parts
                .first()
                .and_then(|meta| meta.get("message"))
                .map(|m| m.to_string())
                .unwrap_or_else(|| "unexpected payload".to_string()),
        )),
        _ => Err(FetchError::provider(PROVIDER_ID, "unexpected payload")),
    }
}

fn select_year(points: &[WorldBankDataPoint], year: i32) -> Option<f64> {
    points
        .iter()
        .find(|p| p.date.trim().parse::<i32>().ok() == Some(year))
        .and_then(|p| p.value)
}

#[async_trait]
impl InflationProvider for WorldBankProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn priority(&self) -> u8 {
        5
    }

    fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            endpoint: self.base_url.clone(),
            series_code: DEFAULT_SERIES.to_string(),
            format: PayloadFormat::Json,
            auth: AuthRequirement::None,
        }
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit {
            requests_per_minute: 60,
            burst_capacity: 5.0,
        }
    }

    fn period_support(&self) -> PeriodSupport {
        PeriodSupport::ANNUAL_ONLY
    }

    async fn fetch(
        &self,
        series_code: &str,
        period: &Period,
        _credential: Option<&str>,
    ) -> Result<InflationReading> {
        if period.is_monthly() {
            return Err(FetchError::UnsupportedPeriod {
                provider: PROVIDER_ID.to_string(),
                period: period.key(),
            });
        }

        let points = self
            .get_points(&self.url(series_code, &period.year().to_string()))
            .await?;
        let value = select_year(&points, period.year()).ok_or_else(|| {
            FetchError::provider(PROVIDER_ID, format!("no value for {}", period))
        })?;

        Ok(InflationReading::new(
            *period,
            percent(PROVIDER_ID, value)?,
            PROVIDER_NAME,
            series_code,
            Utc::now(),
        ))
    }

    async fn probe(&self, _credential: Option<&str>) -> Result<()> {
        let url = format!("{}&per_page=1&mrv=1", self.url(DEFAULT_SERIES, "2000:2100"));
        self.get_points(&url).await.map(|_| ())
    }
}
