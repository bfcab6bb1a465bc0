use anyhow::{Context, Result, bail};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, error};

const USER_AGENT: &str = concat!("valutatrade/", env!("CARGO_PKG_VERSION"));

/// HTTP client shared by the quote sources. Every request is bounded by
/// `timeout`.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .context("Failed to build HTTP client")
}

/// GETs `url` and decodes the JSON body. `label` names the request in errors
/// so that URLs carrying credentials stay out of the logs.
pub async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    label: &str,
) -> Result<T> {
    debug!(request = label, "Sending request");
    let response = client
        .get(url)
        .send()
        .await
        .map_err(reqwest::Error::without_url)
        .with_context(|| format!("{label} request failed"))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(reqwest::Error::without_url)
        .with_context(|| format!("Failed to read {label} response"))?;
    if !status.is_success() {
        bail!("{label} returned HTTP {status}");
    }

    match serde_json::from_str(&body) {
        Ok(data) => Ok(data),
        Err(e) => {
            error!(
                error = ?e,
                response = %body,
                "Failed to parse {label} response"
            );
            Err(e).with_context(|| format!("Failed to parse {label} response"))
        }
    }
}
