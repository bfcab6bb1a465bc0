use super::util::{get_json, http_client};
use crate::core::currency::USD;
use crate::core::source::{QuoteSource, RawRates};
use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::instrument;

pub const NAME: &str = "exchangerate";

#[derive(Debug, Deserialize)]
struct LatestResponse {
    result: Option<String>,
    #[serde(rename = "error-type")]
    error_type: Option<String>,
    conversion_rates: Option<HashMap<String, f64>>,
}

/// Fiat rates from ExchangeRate-API v6, quoted against USD.
///
/// Keys are `USD_<CODE>`.
pub struct ExchangeRateSource {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl ExchangeRateSource {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        if api_key.trim().is_empty() {
            bail!("ExchangeRate-API key is empty");
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
            client: http_client(timeout)?,
        })
    }
}

#[async_trait]
impl QuoteSource for ExchangeRateSource {
    fn name(&self) -> &str {
        NAME
    }

    #[instrument(name = "ExchangeRateFetch", skip(self))]
    async fn fetch_rates(&self) -> Result<RawRates> {
        let url = format!("{}/{}/latest/{}", self.base_url, self.api_key, USD);
        let response: LatestResponse = get_json(&self.client, &url, "ExchangeRate-API").await?;

        if response.result.as_deref() == Some("error") {
            bail!(
                "ExchangeRate-API error: {}",
                response.error_type.as_deref().unwrap_or("unknown")
            );
        }
        let conversion_rates = response
            .conversion_rates
            .ok_or_else(|| anyhow!("ExchangeRate-API response has no conversion_rates"))?;

        Ok(conversion_rates
            .into_iter()
            .map(|(code, rate)| (format!("{USD}_{code}"), rate))
            .collect())
    }
}
