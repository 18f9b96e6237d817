//! Almgren-Chriss style market impact.

use serde::{Deserialize, Serialize};

use crate::config::ImpactConfig;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ImpactEstimate {
    pub permanent: f64,
    pub temporary: f64,
}

impl ImpactEstimate {
    pub fn total(&self) -> f64 {
        self.permanent + self.temporary
    }
}

/// Closed-form impact with fixed `gamma` (permanent) and `eta` (temporary)
/// coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImpactModel {
    gamma: f64,
    eta: f64,
}

impl Default for ImpactModel {
    fn default() -> Self {
        Self::new(0.1, 0.1)
    }
}

impl From<&ImpactConfig> for ImpactModel {
    fn from(cfg: &ImpactConfig) -> Self {
        Self::new(cfg.gamma, cfg.eta)
    }
}

impl ImpactModel {
    pub fn new(gamma: f64, eta: f64) -> Self {
        Self { gamma, eta }
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn eta(&self) -> f64 {
        self.eta
    }

    /// `permanent = gamma * sigma * sqrt(Q / V)`, `temporary = S + eta * Q / V`.
    ///
    /// No depth means no estimate: zero (or negative) volume yields zero.
    pub fn estimate(&self, order_size: f64, market_volume: f64, volatility: f64, spread: f64) -> ImpactEstimate {
        if market_volume <= 0.0 {
            return ImpactEstimate::default();
        }
        let participation = order_size / market_volume;
        ImpactEstimate {
            permanent: self.gamma * volatility * participation.sqrt(),
            temporary: spread + self.eta * participation,
        }
    }

    pub fn impact(&self, order_size: f64, market_volume: f64, volatility: f64, spread: f64) -> f64 {
        self.estimate(order_size, market_volume, volatility, spread).total()
    }
}
