use super::util::{get_json, http_client};
use crate::core::source::{QuoteSource, RawRates};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::instrument;

pub const NAME: &str = "coingecko";
const VS_CURRENCY: &str = "usd";

/// `{"bitcoin": {"usd": 50000.0}, ...}`
#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct SimplePriceResponse(HashMap<String, HashMap<String, f64>>);

/// Crypto prices in USD from CoinGecko's `/simple/price` endpoint.
///
/// Keys are `<ASSET-ID>_USD` (e.g. `BITCOIN_USD`); the aggregator maps asset
/// ids back to currency codes.
pub struct CoinGeckoSource {
    base_url: String,
    asset_ids: Vec<String>,
    client: reqwest::Client,
}

impl CoinGeckoSource {
    pub fn new(base_url: &str, asset_ids: Vec<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            asset_ids,
            client: http_client(timeout)?,
        })
    }
}

#[async_trait]
impl QuoteSource for CoinGeckoSource {
    fn name(&self) -> &str {
        NAME
    }

    #[instrument(name = "CoinGeckoFetch", skip(self), fields(ids = self.asset_ids.len()))]
    async fn fetch_rates(&self) -> Result<RawRates> {
        if self.asset_ids.is_empty() {
            return Ok(RawRates::new());
        }
        let url = format!(
            "{}/simple/price?ids={}&vs_currencies={}",
            self.base_url,
            self.asset_ids.join(","),
            VS_CURRENCY
        );
        let SimplePriceResponse(data) = get_json(&self.client, &url, "CoinGecko").await?;

        let mut rates = RawRates::new();
        for id in &self.asset_ids {
            let price = data
                .get(id)
                .and_then(|prices| prices.get(VS_CURRENCY))
                .ok_or_else(|| anyhow!("CoinGecko response is missing {id}/{VS_CURRENCY}"))?;
            rates.insert(
                format!("{}_{}", id.to_uppercase(), VS_CURRENCY.to_uppercase()),
                *price,
            );
        }
        Ok(rates)
    }
}
