use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{instrument, trace};

use crate::engine::book::{BookMetrics, MetricWindows, SharedBook};
use crate::engine::types::FeeRates;
use crate::error::CostError;
use crate::models::impact::ImpactModel;
use crate::models::maker_taker::{MakerTakerFeatures, MakerTakerModel};
use crate::models::slippage::{SlippageFeatures, SlippageModel};

/// Fee tiers keyed case-insensitively (stored upper-case).
#[derive(Debug, Clone, PartialEq)]
pub struct FeeSchedule {
    tiers: BTreeMap<String, FeeRates>,
}

impl FeeSchedule {
    pub fn new<I, K>(tiers: I) -> Self
    where
        I: IntoIterator<Item = (K, FeeRates)>,
        K: AsRef<str>,
    {
        let tiers = tiers
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_ascii_uppercase(), v))
            .collect();
        Self { tiers }
    }

    pub fn rates(&self, tier: &str) -> Result<FeeRates, CostError> {
        self.tiers
            .get(&tier.to_ascii_uppercase())
            .copied()
            .ok_or_else(|| CostError::UnknownFeeTier(tier.to_string()))
    }

    pub fn tiers(&self) -> impl Iterator<Item = &str> {
        self.tiers.keys().map(String::as_str)
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self::new(crate::config::default_fee_table())
    }
}

/// A simulated market order: USD notional plus the account's fee tier.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub order_size: f64,
    pub fee_tier: String,
}

impl OrderRequest {
    pub fn new(order_size: f64, fee_tier: impl Into<String>) -> Self {
        Self { order_size, fee_tier: fee_tier.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CostEstimate {
    pub slippage: f64,
    pub fees: f64,
    pub impact: f64,
    pub net_cost: f64,
    pub maker_probability: f64,
    pub book: BookMetrics,
}

/// Combines book metrics, the impact model, both predictors and the fee
/// schedule into one cost breakdown. Owns no state of its own.
#[derive(Debug, Clone)]
pub struct CostEstimator {
    book: SharedBook,
    windows: MetricWindows,
    impact: ImpactModel,
    slippage: Arc<SlippageModel>,
    maker_taker: Arc<MakerTakerModel>,
    fees: FeeSchedule,
}

impl CostEstimator {
    pub fn new(
        book: SharedBook,
        windows: MetricWindows,
        impact: ImpactModel,
        slippage: Arc<SlippageModel>,
        maker_taker: Arc<MakerTakerModel>,
        fees: FeeSchedule,
    ) -> Self {
        Self { book, windows, impact, slippage, maker_taker, fees }
    }

    pub fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    pub fn windows(&self) -> &MetricWindows {
        &self.windows
    }

    /// Estimate against the current book.
    pub fn estimate(&self, order: &OrderRequest) -> Result<CostEstimate, CostError> {
        // Read guard is dropped before the predictors are locked.
        let metrics = self.book.read().metrics(&self.windows);
        self.estimate_with_metrics(&metrics, order)
    }

    #[instrument(level = "trace", skip(self, metrics), fields(size = order.order_size, tier = %order.fee_tier))]
    pub fn estimate_with_metrics(&self, metrics: &BookMetrics, order: &OrderRequest) -> Result<CostEstimate, CostError> {
        if !(order.order_size.is_finite() && order.order_size > 0.0) {
            return Err(CostError::InvalidOrderSize(order.order_size));
        }
        let rates = self.fees.rates(&order.fee_tier)?;

        let slippage = self.slippage.predict(&SlippageFeatures {
            order_size: order.order_size,
            spread: metrics.spread,
            volatility: metrics.volatility,
            imbalance: metrics.imbalance,
        });
        let impact = self
            .impact
            .impact(order.order_size, metrics.market_volume, metrics.volatility, metrics.spread);
        let maker_probability = self.maker_taker.predict(&MakerTakerFeatures {
            order_size: order.order_size,
            spread: metrics.spread,
            imbalance: metrics.imbalance,
        });
        // Market orders pay the taker rate
        let fees = order.order_size * rates.taker;
        let net_cost = slippage + impact + fees;

        trace!(slippage, impact, fees, net_cost, maker_probability, "Cost estimate");
        Ok(CostEstimate { slippage, fees, impact, net_cost, maker_probability, book: *metrics })
    }
}
