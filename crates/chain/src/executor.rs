//! Transaction executor seam.
//!
//! The engine treats chain execution as opaque: it submits an operation,
//! receives an external transaction id, and learns the outcome later. The
//! executor side also reports the vault exchange rate used for share
//! accounting.

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Engine operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Supply,
    Borrow,
    Repay,
    Withdraw,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Supply => "supply",
            Self::Borrow => "borrow",
            Self::Repay => "repay",
            Self::Withdraw => "withdraw",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One operation handed to the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub operation: OperationType,
    pub pool_id: String,
    pub asset: String,
    pub amount: Decimal,
    pub owner: String,
}

/// Outcome of a submitted transaction as seen by the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Not final yet
    Pending,
    /// Included and successful
    Confirmed,
    /// Reverted or dropped
    Failed { reason: String },
}

/// External transaction executor.
#[async_trait]
pub trait TransactionExecutor: Send + Sync + Debug {
    /// Human-readable executor name for logs.
    fn name(&self) -> &str;

    /// Submit an operation and return its external transaction id.
    async fn submit(&self, request: &SubmitRequest) -> Result<String>;

    /// Current status of a previously submitted transaction.
    async fn status(&self, tx_id: &str) -> Result<ExecutionStatus>;

    /// Current share -> underlying exchange rate of a pool's vault.
    async fn exchange_rate(&self, pool_id: &str) -> Result<Decimal>;
}

/// Executor call failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    #[error("executor call `{call}` timed out after {timeout_ms}ms")]
    Timeout { call: &'static str, timeout_ms: u64 },

    #[error("executor call `{call}` failed: {reason}")]
    Unavailable { call: &'static str, reason: String },

    /// The executor refused the operation outright; resubmitting will not help
    #[error("executor rejected `{call}`: {reason}")]
    Rejected { call: &'static str, reason: String },

    #[error("executor returned non-positive exchange rate {rate} for pool {pool_id}")]
    InvalidExchangeRate { pool_id: String, rate: Decimal },
}

impl ExecutorError {
    /// Whether retrying later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Unavailable { .. })
    }
}

/// Wraps an executor so every call is bounded by a timeout and failures are typed.
#[derive(Debug, Clone)]
pub struct TimedExecutor {
    inner: Arc<dyn TransactionExecutor>,
    timeout: Duration,
}

impl TimedExecutor {
    pub fn new(inner: Arc<dyn TransactionExecutor>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    async fn bounded<T>(
        &self,
        call: &'static str,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T, ExecutorError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(executor = self.inner.name(), call, error = %e, "Executor call failed");
                // Implementations may raise a typed error through anyhow
                match e.downcast::<ExecutorError>() {
                    Ok(typed) => Err(typed),
                    Err(e) => Err(ExecutorError::Unavailable {
                        call,
                        reason: e.to_string(),
                    }),
                }
            }
            Err(_) => {
                warn!(executor = self.inner.name(), call, "Executor call timed out");
                Err(ExecutorError::Timeout {
                    call,
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Submit an operation.
    pub async fn submit(&self, request: &SubmitRequest) -> Result<String, ExecutorError> {
        let tx_id = self.bounded("submit", self.inner.submit(request)).await?;
        debug!(
            tx_id = %tx_id,
            operation = %request.operation,
            pool = %request.pool_id,
            amount = %request.amount,
            "Transaction submitted"
        );
        Ok(tx_id)
    }

    /// Poll a transaction's status.
    pub async fn status(&self, tx_id: &str) -> Result<ExecutionStatus, ExecutorError> {
        self.bounded("status", self.inner.status(tx_id)).await
    }

    /// Read a pool's exchange rate, rejecting non-positive values.
    pub async fn exchange_rate(&self, pool_id: &str) -> Result<Decimal, ExecutorError> {
        let rate = self
            .bounded("exchange_rate", self.inner.exchange_rate(pool_id))
            .await?;
        if rate <= Decimal::ZERO {
            return Err(ExecutorError::InvalidExchangeRate {
                pool_id: pool_id.to_string(),
                rate,
            });
        }
        Ok(rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[derive(Debug)]
    struct SlowExecutor {
        delay: Duration,
        rate: Decimal,
    }

    #[async_trait]
    impl TransactionExecutor for SlowExecutor {
        fn name(&self) -> &str {
            "slow"
        }

        async fn submit(&self, _request: &SubmitRequest) -> Result<String> {
            tokio::time::sleep(self.delay).await;
            Ok("0xabc".to_string())
        }

        async fn status(&self, tx_id: &str) -> Result<ExecutionStatus> {
            if tx_id == "0xunknown" {
                return Err(ExecutorError::Rejected {
                    call: "status",
                    reason: "unknown transaction".to_string(),
                }
                .into());
            }
            anyhow::bail!("node unreachable")
        }

        async fn exchange_rate(&self, _pool_id: &str) -> Result<Decimal> {
            Ok(self.rate)
        }
    }

    fn request() -> SubmitRequest {
        SubmitRequest {
            operation: OperationType::Supply,
            pool_id: "eth-usdc".to_string(),
            asset: "ETH".to_string(),
            amount: dec!(1),
            owner: "0x1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_submit_timeout() {
        let executor = TimedExecutor::new(
            Arc::new(SlowExecutor { delay: Duration::from_millis(200), rate: dec!(1) }),
            Duration::from_millis(20),
        );
        let err = executor.submit(&request()).await.unwrap_err();
        assert_eq!(err, ExecutorError::Timeout { call: "submit", timeout_ms: 20 });
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_status_failure_is_typed() {
        let executor = TimedExecutor::new(
            Arc::new(SlowExecutor { delay: Duration::ZERO, rate: dec!(1) }),
            Duration::from_secs(1),
        );
        let err = executor.status("0xabc").await.unwrap_err();
        assert!(matches!(err, ExecutorError::Unavailable { call: "status", .. }));
    }

    #[tokio::test]
    async fn test_typed_rejection_passes_through() {
        let executor = TimedExecutor::new(
            Arc::new(SlowExecutor { delay: Duration::ZERO, rate: dec!(1) }),
            Duration::from_secs(1),
        );
        let err = executor.status("0xunknown").await.unwrap_err();
        assert_eq!(
            err,
            ExecutorError::Rejected {
                call: "status",
                reason: "unknown transaction".to_string()
            }
        );
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_rejects_zero_exchange_rate() {
        let executor = TimedExecutor::new(
            Arc::new(SlowExecutor { delay: Duration::ZERO, rate: Decimal::ZERO }),
            Duration::from_secs(1),
        );
        let err = executor.exchange_rate("eth-usdc").await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_status_wire_format() {
        let failed: ExecutionStatus =
            serde_json::from_str(r#"{"status":"failed","reason":"reverted"}"#).unwrap();
        assert_eq!(failed, ExecutionStatus::Failed { reason: "reverted".to_string() });

        let confirmed: ExecutionStatus = serde_json::from_str(r#"{"status":"confirmed"}"#).unwrap();
        assert_eq!(confirmed, ExecutionStatus::Confirmed);
    }
}
