//! Configurable JSON endpoint provider.
//!
//! Points at any HTTP service returning JSON. The URL template may contain
//! `{series}` and `{period}` placeholders, and the rate is located with a
//! JSON pointer (RFC 6901). Values may be numbers or numeric strings.

use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use reqwest::Client;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::errors::{FetchError, Result};
use crate::models::{AuthRequirement, InflationReading, PayloadFormat, Period};
use crate::provider::{
    check_status, http_client, InflationProvider, PeriodSupport, ProviderDescriptor, RateLimit,
};

/// Provider ID constant
pub const PROVIDER_ID: &str = "JSON_MIRROR";

/// Settings for a JSON mirror.
#[derive(Clone, Debug)]
pub struct JsonMirrorConfig {
    /// Attribution name stamped on readings.
    pub name: String,
    pub url_template: String,
    pub series_code: String,
    /// Pointer to the year-over-year rate, e.g. `/data/annual`.
    pub rate_pointer: String,
    pub monthly_rate_pointer: Option<String>,
    /// Pointer to the attribution reported by the mirror itself.
    ///
    /// When unset, readings are attributed to `name`.
    pub source_pointer: Option<String>,
    pub auth: AuthRequirement,
    /// Optional liveness URL; the template with the current year is used otherwise.
    pub probe_url: Option<String>,
    pub requests_per_minute: u32,
}

impl JsonMirrorConfig {
    pub fn new(name: impl Into<String>, url_template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url_template: url_template.into(),
            series_code: "TUFE".to_string(),
            rate_pointer: "/rate".to_string(),
            monthly_rate_pointer: None,
            source_pointer: None,
            auth: AuthRequirement::None,
            probe_url: None,
            requests_per_minute: 60,
        }
    }
}

pub struct JsonMirrorProvider {
    client: Client,
    config: JsonMirrorConfig,
}

impl JsonMirrorProvider {
    pub fn new(config: JsonMirrorConfig) -> Result<Self> {
        if !config.rate_pointer.starts_with('/') {
            return Err(FetchError::InvalidInput(format!(
                "rate pointer '{}' must start with '/'",
                config.rate_pointer
            )));
        }
        if config.url_template.trim().is_empty() {
            return Err(FetchError::InvalidInput("mirror URL is required".into()));
        }
        Ok(Self {
            client: http_client(),
            config,
        })
    }

    fn url(&self, series_code: &str, period: &Period) -> String {
        self.config
            .url_template
            .replace("{series}", &urlencoding::encode(series_code))
            .replace("{period}", &period.key())
    }

    async fn get_json(&self, url: &str, credential: Option<&str>) -> Result<serde_json::Value> {
        debug!("{} request: {}", self.config.name, url);
        let mut request = self.client.get(url);
        if let Some(key) = credential {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| FetchError::from_transport(PROVIDER_ID, e))?;
        check_status(PROVIDER_ID, response)?
            .json()
            .await
            .map_err(|e| FetchError::from_transport(PROVIDER_ID, e))
    }

    fn credential<'a>(&self, credential: Option<&'a str>) -> Result<Option<&'a str>> {
        if self.config.auth.is_required() && credential.is_none() {
            return Err(FetchError::MissingCredential(PROVIDER_ID.to_string()));
        }
        Ok(credential)
    }

    fn reading_from(
        &self,
        body: &serde_json::Value,
        series_code: &str,
        period: &Period,
    ) -> Result<InflationReading> {
        let rate = decimal_at(body, &self.config.rate_pointer)?.ok_or_else(|| {
            FetchError::provider(
                PROVIDER_ID,
                format!("no rate at {}", self.config.rate_pointer),
            )
        })?;
        let source = match &self.config.source_pointer {
            Some(pointer) => body
                .pointer(pointer)
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_default(),
            None => self.config.name.clone(),
        };

        let mut reading = InflationReading::new(*period, rate, source, series_code, Utc::now());
        if let Some(pointer) = &self.config.monthly_rate_pointer {
            if let Some(monthly) = decimal_at(body, pointer)? {
                reading = reading.with_monthly_rate(monthly);
            }
        }
        Ok(reading)
    }
}

fn decimal_at(body: &serde_json::Value, pointer: &str) -> Result<Option<Decimal>> {
    match body.pointer(pointer) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => n
            .as_f64()
            .and_then(|f| Decimal::try_from(f).ok())
            .map(|d| Some(d.round_dp(2)))
            .ok_or_else(|| FetchError::provider(PROVIDER_ID, format!("bad number at {}", pointer))),
        Some(serde_json::Value::String(s)) => Decimal::from_str(s.trim().trim_end_matches('%'))
            .map(|d| Some(d.round_dp(2)))
            .map_err(|_| FetchError::provider(PROVIDER_ID, format!("bad number at {}", pointer))),
        Some(other) => Err(FetchError::provider(
            PROVIDER_ID,
            format!("unexpected value at {}: {}", pointer, other),
        )),
    }
}

#[async_trait]
impl InflationProvider for JsonMirrorProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn priority(&self) -> u8 {
        8
    }

    fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            endpoint: self.config.url_template.clone(),
            series_code: self.config.series_code.clone(),
            format: PayloadFormat::Json,
            auth: self.config.auth,
        }
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit {
            requests_per_minute: self.config.requests_per_minute.max(1),
            burst_capacity: 2.0,
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
        let credential = self.credential(credential)?;
        let body = self.get_json(&self.url(series_code, period), credential).await?;
        self.reading_from(&body, series_code, period)
    }

    async fn probe(&self, credential: Option<&str>) -> Result<()> {
        let credential = self.credential(credential)?;
        let url = match &self.config.probe_url {
            Some(url) => url.clone(),
            None => {
                let period = Period::annual(chrono::Datelike::year(&Utc::now()))?;
                self.url(&self.config.series_code, &period)
            }
        };
        self.get_json(&url, credential).await.map(|_| ())
    }
}
