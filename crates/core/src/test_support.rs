//! Deterministic doubles shared by the engine and monitor tests.

use anyhow::Result;
use async_trait::async_trait;
use lending_chain::{
    AggregationMode, Clock, ExecutionStatus, ExecutorError, ManualClock, OracleSettings, PriceOracleAdapter, PriceSource,
    RawPrice, SubmitRequest, TimedExecutor, TransactionExecutor,
};
use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::alerts::{NotificationGateway, Severity};
use crate::config::LendingSettings;
use crate::engine::LendingEngine;
use crate::ledger::InMemoryLedger;
use crate::pool::{Pool, PoolId};
use crate::position::PositionId;

pub const NOW: i64 = 1_700_000_000;
pub const OWNER: &str = "0xabc";
pub const OTHER_OWNER: &str = "0xdef";
pub const PRICE_DECIMALS: u32 = 8;

/// Price feed keyed by source id with per-asset publisher counts.
#[derive(Debug)]
pub struct StaticPriceSource {
    clock: Arc<ManualClock>,
    prices: Mutex<HashMap<String, Decimal>>,
    /// Publishers reported for median answers; mean answers always report plenty
    median_sources: Mutex<HashMap<String, u32>>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl StaticPriceSource {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            prices: Mutex::new(HashMap::new()),
            median_sources: Mutex::new(HashMap::new()),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_price(&self, source_id: &str, price: Decimal) {
        self.prices.lock().insert(source_id.to_string(), price);
    }

    pub fn set_median_sources(&self, source_id: &str, sources: u32) {
        self.median_sources.lock().insert(source_id.to_string(), sources);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceSource for StaticPriceSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn query(&self, source_id: &str, aggregation: AggregationMode) -> Result<RawPrice> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("price feed offline");
        }
        let price = self
            .prices
            .lock()
            .get(source_id)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("no feed for {source_id}"))?;
        let scaled = (price * Decimal::from(10u64.pow(PRICE_DECIMALS)))
            .trunc()
            .to_u128()
            .ok_or_else(|| anyhow::anyhow!("unrepresentable price {price}"))?;
        let num_sources = match aggregation {
            AggregationMode::Median => self.median_sources.lock().get(source_id).copied().unwrap_or(5),
            AggregationMode::Mean => 5,
        };
        Ok(RawPrice {
            price: scaled,
            decimals: PRICE_DECIMALS,
            last_updated_timestamp: self.clock.unix_now(),
            num_sources,
        })
    }
}

/// Executor that records submissions and answers scripted statuses.
#[derive(Debug)]
pub struct RecordingExecutor {
    submitted: Mutex<Vec<SubmitRequest>>,
    statuses: Mutex<HashMap<String, ExecutionStatus>>,
    rate: Mutex<Decimal>,
    reject_submits: AtomicBool,
    submit_delay: Mutex<Duration>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self {
            submitted: Mutex::new(Vec::new()),
            statuses: Mutex::new(HashMap::new()),
            rate: Mutex::new(Decimal::ONE),
            reject_submits: AtomicBool::new(false),
            submit_delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn submitted(&self) -> Vec<SubmitRequest> {
        self.submitted.lock().clone()
    }

    pub fn set_rate(&self, rate: Decimal) {
        *self.rate.lock() = rate;
    }

    pub fn set_status(&self, tx_id: &str, status: ExecutionStatus) {
        self.statuses.lock().insert(tx_id.to_string(), status);
    }

    pub fn set_reject_submits(&self, reject: bool) {
        self.reject_submits.store(reject, Ordering::SeqCst);
    }

    /// Sleep before accepting each submission.
    pub fn set_submit_delay(&self, delay: Duration) {
        *self.submit_delay.lock() = delay;
    }
}

#[async_trait]
impl TransactionExecutor for RecordingExecutor {
    fn name(&self) -> &str {
        "recording"
    }

    async fn submit(&self, request: &SubmitRequest) -> Result<String> {
        let delay = *self.submit_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.reject_submits.load(Ordering::SeqCst) {
            return Err(ExecutorError::Rejected {
                call: "submit",
                reason: "relayer rejected request".to_string(),
            }
            .into());
        }
        let mut submitted = self.submitted.lock();
        submitted.push(request.clone());
        Ok(format!("0xtx{}", submitted.len()))
    }

    async fn status(&self, tx_id: &str) -> Result<ExecutionStatus> {
        Ok(self
            .statuses
            .lock()
            .get(tx_id)
            .cloned()
            .unwrap_or(ExecutionStatus::Pending))
    }

    async fn exchange_rate(&self, _pool_id: &str) -> Result<Decimal> {
        Ok(*self.rate.lock())
    }
}

/// Notifier that keeps every alert.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    alerts: Mutex<Vec<(PositionId, Severity, String)>>,
}

impl RecordingNotifier {
    pub fn alerts(&self) -> Vec<(PositionId, Severity, String)> {
        self.alerts.lock().clone()
    }
}

impl NotificationGateway for RecordingNotifier {
    fn notify(&self, position_id: PositionId, severity: Severity, message: &str) {
        self.alerts.lock().push((position_id, severity, message.to_string()));
    }
}

/// ETH collateral against USDC debt, 80% max LTV, 85% liquidation threshold.
pub fn eth_usdc_pool() -> Pool {
    Pool {
        id: PoolId::from("eth-usdc"),
        collateral_asset: "ETH".to_string(),
        debt_asset: "USDC".to_string(),
        total_supplied: dec!(1000000),
        total_borrowed: Decimal::ZERO,
        total_collateral: Decimal::ZERO,
        max_ltv: dec!(0.80),
        liquidation_threshold: dec!(0.85),
        supply_apy: dec!(0.03),
        borrow_apy: dec!(0.05),
        active: true,
    }
}

/// Fully wired engine over in-memory doubles. ETH = $100, USDC = $1.
#[derive(Debug)]
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub source: Arc<StaticPriceSource>,
    pub executor: Arc<RecordingExecutor>,
    pub ledger: Arc<InMemoryLedger>,
    pub oracle: Arc<PriceOracleAdapter>,
    pub engine: LendingEngine,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(LendingSettings {
            accrue_interest: false,
            ..Default::default()
        })
    }

    pub fn with_settings(settings: LendingSettings) -> Self {
        Self::with_pools(settings, vec![eth_usdc_pool()])
    }

    pub fn with_pools(settings: LendingSettings, pools: Vec<Pool>) -> Self {
        let clock = Arc::new(ManualClock::at_unix(NOW));
        let source = Arc::new(StaticPriceSource::new(clock.clone()));
        source.set_price("ETH/USD", dec!(100));
        source.set_price("USDC/USD", dec!(1));

        let oracle = Arc::new(PriceOracleAdapter::new(
            source.clone(),
            OracleSettings::default(),
            clock.clone(),
        ));
        let executor = Arc::new(RecordingExecutor::new());
        let ledger = Arc::new(InMemoryLedger::with_pools(pools).expect("valid test pools"));

        let engine = LendingEngine::new(
            ledger.clone(),
            oracle.clone(),
            TimedExecutor::new(executor.clone(), Duration::from_secs(1)),
            clock.clone(),
            settings,
        );

        Self {
            clock,
            source,
            executor,
            ledger,
            oracle,
            engine,
        }
    }

    pub fn pool_id(&self) -> PoolId {
        PoolId::from("eth-usdc")
    }

    /// Move the price of an asset and drop cached quotes.
    pub fn set_price(&self, source_id: &str, price: Decimal) {
        self.source.set_price(source_id, price);
        self.oracle.clear_cache();
    }
}
