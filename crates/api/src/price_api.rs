//! HTTP price API client.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lending_chain::{AggregationMode, PriceSource, RawPrice};
use serde::Deserialize;
use tracing::{debug, instrument};

/// Price feed API client implementing [`PriceSource`].
///
/// `GET {base}/v1/data/{pair}?aggregation={median|mean}` where `pair` is the
/// lowercased source id (`eth/usd`).
#[derive(Debug, Clone)]
pub struct HttpPriceSource {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpPriceSource {
    /// Create a client for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
        }
    }

    /// Send an `x-api-key` header with every request.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Build from PRICE_API_URL and the optional PRICE_API_KEY.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("PRICE_API_URL").context("PRICE_API_URL not set")?;
        let client = Self::new(base_url);
        Ok(match std::env::var("PRICE_API_KEY") {
            Ok(key) if !key.is_empty() => client.with_api_key(key),
            _ => client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, source_id: &str) -> String {
        format!("{}/v1/data/{}", self.base_url, source_id.to_lowercase())
    }
}

#[async_trait]
impl PriceSource for HttpPriceSource {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(skip(self))]
    async fn query(&self, source_id: &str, aggregation: AggregationMode) -> Result<RawPrice> {
        let mut request = self
            .client
            .get(self.url(source_id))
            .query(&[("aggregation", aggregation.as_str())]);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Price API error: {} - {}", status, body);
        }

        let data: PriceResponse = response.json().await?;
        let raw = data.into_raw()?;
        debug!(
            source_id,
            price = raw.price,
            decimals = raw.decimals,
            num_sources = raw.num_sources,
            "Fetched raw price"
        );
        Ok(raw)
    }
}

/// Price API response body.
#[derive(Debug, Deserialize)]
struct PriceResponse {
    /// Scaled integer, hex (`0x...`) or decimal string
    price: String,
    decimals: u32,
    /// Milliseconds since the unix epoch
    last_updated_timestamp: u64,
    num_sources_aggregated: u32,
}

impl PriceResponse {
    fn into_raw(self) -> Result<RawPrice> {
        let price = match self.price.strip_prefix("0x") {
            Some(hex) => u128::from_str_radix(hex, 16),
            None => self.price.parse::<u128>(),
        }
        .with_context(|| format!("Invalid price '{}'", self.price))?;

        Ok(RawPrice {
            price,
            decimals: self.decimals,
            last_updated_timestamp: self.last_updated_timestamp / 1_000,
            num_sources: self.num_sources_aggregated,
        })
    }
}
