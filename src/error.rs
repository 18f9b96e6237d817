//! Error types for the simulator core.
//!
//! Nothing here is fatal to the feed loop: decode and connection errors are
//! logged and recovered from, fit failures keep the previous model.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },
    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("no message received within {0:?}")]
    ReadTimeout(Duration),
    #[error("connection closed by peer")]
    Closed,
}

#[derive(Debug, Error, PartialEq)]
pub enum NormaliseError {
    #[error("{side} is not a list of levels")]
    NotAList { side: &'static str },
    #[error("{side} level {index} is malformed: {reason}")]
    MalformedLevel {
        side: &'static str,
        index: usize,
        reason: String,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum FitError {
    #[error("no samples to fit")]
    Empty,
    #[error("{rows} feature rows but {labels} labels")]
    ShapeMismatch { rows: usize, labels: usize },
    #[error("training data contains non-finite values")]
    NonFinite,
    #[error("linear system could not be solved: {0}")]
    Singular(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum PredictorError {
    #[error("expected {expected} features, got {actual}")]
    WidthMismatch { expected: usize, actual: usize },
    #[error("sample contains non-finite values")]
    NonFinite,
}

#[derive(Debug, Error, PartialEq)]
pub enum CostError {
    #[error("unknown fee tier '{0}'")]
    UnknownFeeTier(String),
    #[error("order size must be a positive finite amount, got {0}")]
    InvalidOrderSize(f64),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to create latency histogram: {0}")]
    Latency(String),
}
