use parking_lot::RwLock;

use crate::config::PredictorConfig;
use crate::error::PredictorError;
use crate::models::predictor::AdaptivePredictor;
use crate::models::regression::LogisticRegression;

pub const UNTRAINED_MAKER_PROBABILITY: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MakerTakerFeatures {
    pub order_size: f64,
    pub spread: f64,
    pub imbalance: f64,
}

impl MakerTakerFeatures {
    pub const WIDTH: usize = 3;

    fn to_vec(self) -> Vec<f64> {
        vec![self.order_size, self.spread, self.imbalance]
    }
}

/// Online classifier for the probability that an order fills as maker.
#[derive(Debug)]
pub struct MakerTakerModel {
    inner: RwLock<AdaptivePredictor<LogisticRegression>>,
}

impl Default for MakerTakerModel {
    fn default() -> Self {
        Self::new(&PredictorConfig::default())
    }
}

impl MakerTakerModel {
    pub fn new(cfg: &PredictorConfig) -> Self {
        Self { inner: RwLock::new(AdaptivePredictor::new("maker_taker", MakerTakerFeatures::WIDTH, cfg)) }
    }

    pub fn update(&self, features: &MakerTakerFeatures, is_maker: bool) -> Result<(), PredictorError> {
        let label = if is_maker { 1.0 } else { 0.0 };
        self.inner.write().update(features.to_vec(), label)
    }

    /// P(maker); 0.5 until trained.
    pub fn predict(&self, features: &MakerTakerFeatures) -> f64 {
        let vec = features.to_vec();
        self.inner.read().predict(&vec).unwrap_or(UNTRAINED_MAKER_PROBABILITY)
    }

    pub fn is_trained(&self) -> bool {
        self.inner.read().is_trained()
    }

    pub fn samples(&self) -> usize {
        self.inner.read().len()
    }
}
