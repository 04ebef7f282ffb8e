//! Transaction relayer client.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lending_chain::{ExecutionStatus, ExecutorError, SubmitRequest, TransactionExecutor};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, info, instrument};

/// Relayer API client implementing [`TransactionExecutor`].
///
/// - `POST {base}/v1/transactions` submits an operation
/// - `GET {base}/v1/transactions/{tx_id}` reports its status
/// - `GET {base}/v1/pools/{pool_id}/exchange-rate` reads the vault rate
#[derive(Debug, Clone)]
pub struct RelayerClient {
    client: reqwest::Client,
    base_url: String,
}

impl RelayerClient {
    /// Create a client for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Build from RELAYER_URL.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("RELAYER_URL").context("RELAYER_URL not set")?;
        Ok(Self::new(base_url))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Decode a successful response. A 4xx answer is a definitive rejection.
    async fn json<T: for<'de> Deserialize<'de>>(call: &'static str, response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExecutorError::Rejected {
                call,
                reason: format!("{} - {}", status, body),
            }
            .into());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Relayer error: {} - {}", status, body);
        }
        Ok(response.json().await?)
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    tx_id: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeRateResponse {
    exchange_rate: Decimal,
}

#[async_trait]
impl TransactionExecutor for RelayerClient {
    fn name(&self) -> &str {
        "relayer"
    }

    #[instrument(skip(self, request), fields(operation = %request.operation, pool = %request.pool_id))]
    async fn submit(&self, request: &SubmitRequest) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/v1/transactions", self.base_url))
            .json(request)
            .send()
            .await?;
        let data: SubmitResponse = Self::json("submit", response).await?;
        info!(tx_id = %data.tx_id, "Relayer accepted transaction");
        Ok(data.tx_id)
    }

    #[instrument(skip(self))]
    async fn status(&self, tx_id: &str) -> Result<ExecutionStatus> {
        let response = self
            .client
            .get(format!("{}/v1/transactions/{}", self.base_url, tx_id))
            .send()
            .await?;
        let status: ExecutionStatus = Self::json("status", response).await?;
        debug!(tx_id, ?status, "Fetched transaction status");
        Ok(status)
    }

    #[instrument(skip(self))]
    async fn exchange_rate(&self, pool_id: &str) -> Result<Decimal> {
        let response = self
            .client
            .get(format!("{}/v1/pools/{}/exchange-rate", self.base_url, pool_id))
            .send()
            .await?;
        let data: ExchangeRateResponse = Self::json("exchange_rate", response).await?;
        Ok(data.exchange_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lending_chain::OperationType;
    use rust_decimal_macros::dec;

    #[test]
    fn test_deserialize_statuses() {
        let confirmed: ExecutionStatus = serde_json::from_str(r#"{"status": "confirmed"}"#).unwrap();
        assert_eq!(confirmed, ExecutionStatus::Confirmed);

        let failed: ExecutionStatus =
            serde_json::from_str(r#"{"status": "failed", "reason": "execution reverted"}"#).unwrap();
        assert_eq!(
            failed,
            ExecutionStatus::Failed {
                reason: "execution reverted".to_string()
            }
        );
    }

    #[test]
    fn test_deserialize_exchange_rate() {
        let rate: ExchangeRateResponse = serde_json::from_str(r#"{"exchange_rate": "1.0423"}"#).unwrap();
        assert_eq!(rate.exchange_rate, dec!(1.0423));
    }

    #[test]
    fn test_submit_body() {
        let request = SubmitRequest {
            operation: OperationType::Borrow,
            pool_id: "eth-usdc".to_string(),
            asset: "USDC".to_string(),
            amount: dec!(800),
            owner: "0xabc".to_string(),
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["operation"], "borrow");
        assert_eq!(body["pool_id"], "eth-usdc");
    }

    #[tokio::test]
    #[ignore] // Requires RELAYER_URL pointing at a live relayer
    async fn test_live_exchange_rate() {
        let client = RelayerClient::from_env().unwrap();
        let rate = client.exchange_rate("eth-usdc").await.unwrap();
        assert!(rate > Decimal::ZERO);
    }
}
