// Trade cost simulator
//
// Estimates slippage, market impact, fees and maker/taker likelihood for a
// simulated order against a live L2 order book feed. Never executes orders.

pub mod config;
pub mod engine;
pub mod error;
pub mod market_data;
pub mod models;
pub mod simulator;
pub mod telemetry;

pub use config::SimulatorConfig;
pub use engine::book::{BookMetrics, OrderBookState, SharedBook};
pub use engine::types::{ConnectionState, FeeRates, PriceLevel};
pub use error::{ConfigError, CostError, FeedError, FitError, NormaliseError, PredictorError, SimulatorError};
pub use market_data::ingestor::{FeedConsumer, FeedIngestor, IngestorState, StopHandle};
pub use market_data::router::FeedRouter;
pub use models::cost::{CostEstimate, CostEstimator, FeeSchedule, OrderRequest};
pub use models::impact::ImpactModel;
pub use simulator::{ExecutionOutcome, SimulationReport, Simulator};
