//! Wires one book, two predictors, the impact model and the feed router
//! together, and answers poll requests with a [`SimulationReport`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info};

use crate::config::SimulatorConfig;
use crate::engine::book::{OrderBookState, SharedBook};
use crate::error::{CostError, PredictorError, SimulatorError};
use crate::market_data::adapters::websocket::WebSocketConnector;
use crate::market_data::ingestor::{FeedIngestor, IngestorSettings};
use crate::market_data::router::{FeedHealth, FeedRouter};
use crate::models::cost::{CostEstimate, CostEstimator, FeeSchedule, OrderRequest};
use crate::models::impact::ImpactModel;
use crate::models::maker_taker::{MakerTakerFeatures, MakerTakerModel};
use crate::models::slippage::{SlippageFeatures, SlippageModel};

/// A realised fill, fed back to train both predictors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionOutcome {
    pub order_size: f64,
    pub spread: f64,
    pub volatility: f64,
    pub imbalance: f64,
    pub realised_slippage: f64,
    pub was_maker: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationReport {
    pub estimate: CostEstimate,
    pub health: FeedHealth,
    pub mid_prices: Vec<f64>,
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let e = &self.estimate;
        write!(
            f,
            "Slippage: ${:.4} | Fees: ${:.4} | Market Impact: ${:.4} | Net Cost: ${:.4} | Maker: {:.1}% | Status: {}",
            e.slippage,
            e.fees,
            e.impact,
            e.net_cost,
            e.maker_probability * 100.0,
            self.health.state
        )?;
        match self.health.latency.last_us {
            Some(us) => write!(f, " | Processing Latency: {:.4} ms", us / 1000.0)?,
            None => write!(f, " | Processing Latency: 0.0 ms")?,
        }
        if let Some(warning) = self.health.warning {
            write!(f, " | {warning}")?;
        }
        Ok(())
    }
}

pub struct Simulator {
    config: SimulatorConfig,
    book: SharedBook,
    router: Arc<FeedRouter>,
    slippage: Arc<SlippageModel>,
    maker_taker: Arc<MakerTakerModel>,
    estimator: CostEstimator,
}

impl Simulator {
    pub fn new(config: SimulatorConfig) -> Result<Self, SimulatorError> {
        config.validate()?;

        let book = OrderBookState::with_mid_capacity(config.book.mid_capacity).shared();
        let router = Arc::new(FeedRouter::new(book.clone(), config.stale_after())?);
        let slippage = Arc::new(SlippageModel::new(&config.predictor));
        let maker_taker = Arc::new(MakerTakerModel::new(&config.predictor));
        let estimator = CostEstimator::new(
            book.clone(),
            config.book.windows(),
            ImpactModel::from(&config.impact),
            slippage.clone(),
            maker_taker.clone(),
            FeeSchedule::new(config.fees.iter().map(|(tier, rates)| (tier, *rates))),
        );

        info!(
            url = %config.feed.url,
            tiers = ?estimator.fees().tiers().collect::<Vec<_>>(),
            "Simulator initialised"
        );
        Ok(Self { config, book, router, slippage, maker_taker, estimator })
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn book(&self) -> &SharedBook {
        &self.book
    }

    pub fn router(&self) -> Arc<FeedRouter> {
        self.router.clone()
    }

    pub fn slippage_model(&self) -> &Arc<SlippageModel> {
        &self.slippage
    }

    pub fn maker_taker_model(&self) -> &Arc<MakerTakerModel> {
        &self.maker_taker
    }

    pub fn estimator(&self) -> &CostEstimator {
        &self.estimator
    }

    /// Websocket ingestor for the configured feed.
    pub fn ingestor(&self) -> FeedIngestor<WebSocketConnector> {
        FeedIngestor::new(WebSocketConnector::from(&self.config.feed), IngestorSettings::from(&self.config.feed))
    }

    /// Feed a realised execution back into both predictors.
    pub fn record_execution(&self, outcome: &ExecutionOutcome) -> Result<(), PredictorError> {
        self.slippage.update(
            &SlippageFeatures {
                order_size: outcome.order_size,
                spread: outcome.spread,
                volatility: outcome.volatility,
                imbalance: outcome.imbalance,
            },
            outcome.realised_slippage,
        )?;
        self.maker_taker.update(
            &MakerTakerFeatures {
                order_size: outcome.order_size,
                spread: outcome.spread,
                imbalance: outcome.imbalance,
            },
            outcome.was_maker,
        )
    }

    /// One poll: cost estimate, feed health and the mid-price history.
    pub fn report(&self, order: &OrderRequest) -> Result<SimulationReport, CostError> {
        // Metrics and history from the same snapshot
        let (metrics, mid_prices): (_, Vec<f64>) = {
            let book = self.book.read();
            (book.metrics(self.estimator.windows()), book.mid_prices().iter().copied().collect())
        };
        let estimate = self.estimator.estimate_with_metrics(&metrics, order)?;
        Ok(SimulationReport { estimate, health: self.router.health(), mid_prices })
    }

    /// Log a report every `every` until `shutdown` resolves. Returns the
    /// number of polls made.
    pub async fn poll_until<F: Future>(&self, order: &OrderRequest, every: Duration, shutdown: F) -> u64 {
        tokio::pin!(shutdown);
        let mut interval = tokio::time::interval(every);
        let mut polls = 0;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    polls += 1;
                    match self.report(order) {
                        Ok(report) => info!(target: "tradesim::report", "{report}"),
                        Err(e) => error!(error = %e, "Cost estimate failed"),
                    }
                }
                _ = &mut shutdown => {
                    info!(polls, "Shutdown requested");
                    return polls;
                }
            }
        }
    }
}
