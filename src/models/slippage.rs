use parking_lot::RwLock;

use crate::config::PredictorConfig;
use crate::error::PredictorError;
use crate::models::predictor::AdaptivePredictor;
use crate::models::regression::LinearRegression;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlippageFeatures {
    pub order_size: f64,
    pub spread: f64,
    pub volatility: f64,
    pub imbalance: f64,
}

impl SlippageFeatures {
    pub const WIDTH: usize = 4;

    fn to_vec(self) -> Vec<f64> {
        vec![self.order_size, self.spread, self.volatility, self.imbalance]
    }
}

/// Online slippage regressor.
///
/// Falls back to half the current spread until trained.
#[derive(Debug)]
pub struct SlippageModel {
    inner: RwLock<AdaptivePredictor<LinearRegression>>,
}

impl Default for SlippageModel {
    fn default() -> Self {
        Self::new(&PredictorConfig::default())
    }
}

impl SlippageModel {
    pub fn new(cfg: &PredictorConfig) -> Self {
        Self { inner: RwLock::new(AdaptivePredictor::new("slippage", SlippageFeatures::WIDTH, cfg)) }
    }

    /// Record a realised slippage and refit once enough samples exist.
    pub fn update(&self, features: &SlippageFeatures, actual_slippage: f64) -> Result<(), PredictorError> {
        self.inner.write().update(features.to_vec(), actual_slippage)
    }

    pub fn predict(&self, features: &SlippageFeatures) -> f64 {
        let vec = features.to_vec();
        self.inner.read().predict(&vec).unwrap_or(features.spread * 0.5)
    }

    pub fn is_trained(&self) -> bool {
        self.inner.read().is_trained()
    }

    pub fn samples(&self) -> usize {
        self.inner.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features() -> SlippageFeatures {
        SlippageFeatures { order_size: 100.0, spread: 1.0, volatility: 0.02, imbalance: 0.3 }
    }

    #[test]
    fn test_default_before_training() {
        let model = SlippageModel::default();
        assert!((model.predict(&features()) - 0.5).abs() < 1e-12);

        let wide = SlippageFeatures { spread: 4.0, order_size: 1e9, ..features() };
        assert_eq!(model.predict(&wide), 2.0);
    }

    #[test]
    fn test_learns_constant_slippage() {
        let model = SlippageModel::default();
        for _ in 0..100 {
            model.update(&features(), 0.6).unwrap();
        }
        assert!(model.is_trained());
        let pred = model.predict(&features());
        assert!(pred > 0.55 && pred < 0.65, "prediction {pred}");
    }

    #[test]
    fn test_trains_at_min_samples() {
        let model = SlippageModel::default();
        for _ in 0..29 {
            model.update(&features(), 0.6).unwrap();
        }
        assert!(!model.is_trained());
        model.update(&features(), 0.6).unwrap();
        assert!(model.is_trained());
        assert_eq!(model.samples(), 30);
    }

    #[test]
    fn test_buffer_is_bounded() {
        let model = SlippageModel::new(&PredictorConfig { capacity: 50, min_samples: 30 });
        for i in 0..120 {
            let f = SlippageFeatures { order_size: i as f64, ..features() };
            model.update(&f, 0.01 * i as f64).unwrap();
        }
        assert_eq!(model.samples(), 50);
        assert!(model.is_trained());
    }
}
