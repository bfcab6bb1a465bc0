pub mod coingecko;
pub mod exchangerate;
pub mod util;

use crate::core::config::AppConfig;
use crate::core::currency::CurrencyRegistry;
use crate::core::source::QuoteSource;
use anyhow::Result;
use coingecko::CoinGeckoSource;
use exchangerate::ExchangeRateSource;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Builds the configured quote sources in precedence order: CoinGecko first,
/// then ExchangeRate-API.
pub fn build_sources(
    config: &AppConfig,
    registry: &CurrencyRegistry,
) -> Result<Vec<Arc<dyn QuoteSource>>> {
    let timeout = Duration::from_secs(config.request_timeout_secs);
    let mut sources: Vec<Arc<dyn QuoteSource>> = Vec::new();

    if let Some(coingecko) = &config.providers.coingecko {
        sources.push(Arc::new(CoinGeckoSource::new(
            &coingecko.base_url,
            registry.crypto_asset_ids(),
            timeout,
        )?));
    }

    if let Some(exchangerate) = &config.providers.exchangerate {
        match exchangerate.resolve_api_key() {
            Some(key) => sources.push(Arc::new(ExchangeRateSource::new(
                &exchangerate.base_url,
                &key,
                timeout,
            )?)),
            None => warn!(
                "No ExchangeRate-API key configured (set providers.exchangerate.api_key \
                 or EXCHANGERATE_API_KEY); fiat rates will not be fetched"
            ),
        }
    }

    Ok(sources)
}
