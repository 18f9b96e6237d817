use std::collections::VecDeque;

use nalgebra::{DMatrix, DVector};
use tracing::{debug, info, warn};

use crate::config::PredictorConfig;
use crate::error::{FitError, PredictorError};

/// A model that can be fitted from scratch on a full sample window.
pub trait Fittable: Sized + Send + Sync {
    /// Fit fresh parameters. `features` is one row per sample.
    fn fit(features: &DMatrix<f64>, labels: &DVector<f64>) -> Result<Self, FitError>;

    fn predict(&self, features: &[f64]) -> f64;
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSample {
    pub features: Vec<f64>,
    pub label: f64,
}

/// Bounded window of observed outcomes plus the model last fitted on it.
///
/// Untrained until the window first holds `min_samples` samples; after that
/// every update refits on the whole retained window. The model is only ever
/// replaced wholesale, and a failed refit keeps the previous one.
#[derive(Debug)]
pub struct AdaptivePredictor<M> {
    name: &'static str,
    width: usize,
    capacity: usize,
    min_samples: usize,
    samples: VecDeque<TrainingSample>,
    model: Option<M>,
    refits: u64,
}

impl<M: Fittable> AdaptivePredictor<M> {
    pub fn new(name: &'static str, width: usize, cfg: &PredictorConfig) -> Self {
        Self {
            name,
            width,
            capacity: cfg.capacity.max(1),
            min_samples: cfg.min_samples.max(1),
            samples: VecDeque::with_capacity(cfg.capacity + 1),
            model: None,
            refits: 0,
        }
    }

    pub fn update(&mut self, features: Vec<f64>, label: f64) -> Result<(), PredictorError> {
        if features.len() != self.width {
            return Err(PredictorError::WidthMismatch { expected: self.width, actual: features.len() });
        }
        if !label.is_finite() || features.iter().any(|f| !f.is_finite()) {
            return Err(PredictorError::NonFinite);
        }

        self.samples.push_back(TrainingSample { features, label });
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }

        if self.samples.len() >= self.min_samples {
            self.refit();
        }
        Ok(())
    }

    fn refit(&mut self) {
        let rows = self.samples.len();
        let x = DMatrix::from_fn(rows, self.width, |i, j| self.samples[i].features[j]);
        let y = DVector::from_iterator(rows, self.samples.iter().map(|s| s.label));

        match M::fit(&x, &y) {
            Ok(model) => {
                if self.model.is_none() {
                    info!(predictor = self.name, samples = rows, "Predictor trained");
                }
                self.model = Some(model);
                self.refits += 1;
                metrics::counter!("tradesim_predictor_refits_total", "predictor" => self.name).increment(1);
                debug!(predictor = self.name, samples = rows, refits = self.refits, "Refit complete");
            }
            Err(e) => {
                warn!(predictor = self.name, samples = rows, error = %e, "Refit failed, keeping previous model");
            }
        }
    }

    /// Fitted output, or `None` while untrained.
    pub fn predict(&self, features: &[f64]) -> Option<f64> {
        self.model.as_ref().map(|m| m.predict(features))
    }

    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn refits(&self) -> u64 {
        self.refits
    }

    pub fn samples(&self) -> impl Iterator<Item = &TrainingSample> {
        self.samples.iter()
    }
}
