use std::collections::VecDeque;
use std::sync::Arc;

use ahash::AHashMap;
use ordered_float::OrderedFloat;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, instrument, trace};

use crate::engine::types::PriceLevel;

pub const MID_PRICE_CAPACITY: usize = 200;
pub const DEFAULT_DEPTH_LEVELS: usize = 10;
pub const DEFAULT_IMBALANCE_LEVELS: usize = 5;
pub const DEFAULT_VOLATILITY_WINDOW: usize = 60;

/// Book shared between the feed task (single writer) and pollers (readers).
pub type SharedBook = Arc<RwLock<OrderBookState>>;

/// One side of the observed book: price -> size, unique prices, kept in the
/// order the feed delivered them.
///
/// A repeated price inside one snapshot keeps its first position and takes
/// the last size seen.
#[derive(Debug, Clone, Default)]
pub struct BookSide {
    levels: Vec<PriceLevel>,
    index: AHashMap<OrderedFloat<f64>, usize>,
}

impl BookSide {
    pub fn from_levels<I>(levels: I) -> Self
    where
        I: IntoIterator<Item = PriceLevel>,
    {
        let mut side = BookSide::default();
        for level in levels {
            match side.index.get(&OrderedFloat(level.price)) {
                Some(&pos) => side.levels[pos].size = level.size,
                None => {
                    side.index.insert(OrderedFloat(level.price), side.levels.len());
                    side.levels.push(level);
                }
            }
        }
        side
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn size_at(&self, price: f64) -> Option<f64> {
        self.index.get(&OrderedFloat(price)).map(|&pos| self.levels[pos].size)
    }

    /// Levels in stored (feed) order.
    pub fn iter(&self) -> impl Iterator<Item = &PriceLevel> {
        self.levels.iter()
    }

    pub fn max_price(&self) -> Option<f64> {
        self.levels.iter().map(|l| OrderedFloat(l.price)).max().map(|p| p.0)
    }

    pub fn min_price(&self) -> Option<f64> {
        self.levels.iter().map(|l| OrderedFloat(l.price)).min().map(|p| p.0)
    }

    // Sum of the first `levels` sizes in stored order, NOT sorted by price
    pub fn depth(&self, levels: usize) -> f64 {
        self.levels.iter().take(levels).map(|l| l.size).sum()
    }
}

/// Window sizes used when deriving [`BookMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricWindows {
    pub depth_levels: usize,
    pub imbalance_levels: usize,
    pub volatility_window: usize,
}

impl Default for MetricWindows {
    fn default() -> Self {
        Self {
            depth_levels: DEFAULT_DEPTH_LEVELS,
            imbalance_levels: DEFAULT_IMBALANCE_LEVELS,
            volatility_window: DEFAULT_VOLATILITY_WINDOW,
        }
    }
}

/// Point-in-time view of every derived book metric, read under one lock.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BookMetrics {
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
    pub mid_price: Option<f64>,
    pub spread: f64,
    pub market_volume: f64,
    pub imbalance: f64,
    pub volatility: f64,
    pub updates: u64,
}

/// Canonical in-memory book built from full snapshots.
#[derive(Debug, Clone)]
pub struct OrderBookState {
    bids: BookSide,
    asks: BookSide,
    mid_prices: VecDeque<f64>,
    mid_capacity: usize,
    updates: u64,
}

impl Default for OrderBookState {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderBookState {
    pub fn new() -> Self {
        Self::with_mid_capacity(MID_PRICE_CAPACITY)
    }

    pub fn with_mid_capacity(mid_capacity: usize) -> Self {
        Self {
            bids: BookSide::default(),
            asks: BookSide::default(),
            mid_prices: VecDeque::with_capacity(mid_capacity + 1),
            mid_capacity,
            updates: 0,
        }
    }

    pub fn shared(self) -> SharedBook {
        Arc::new(RwLock::new(self))
    }

    /// Replace both sides with a fresh snapshot.
    ///
    /// A mid-price sample is recorded only when both sides are non-empty
    /// afterwards; the oldest sample is evicted past capacity.
    #[instrument(level = "trace", skip_all, fields(bids = bids.len(), asks = asks.len()))]
    pub fn update(&mut self, bids: &[PriceLevel], asks: &[PriceLevel]) {
        // Both sides are built before either is swapped in.
        let new_bids = BookSide::from_levels(bids.iter().copied());
        let new_asks = BookSide::from_levels(asks.iter().copied());
        self.bids = new_bids;
        self.asks = new_asks;
        self.updates += 1;

        if let (Some(best_bid), Some(best_ask)) = (self.best_bid(), self.best_ask()) {
            let mid = (best_bid + best_ask) / 2.0;
            self.mid_prices.push_back(mid);
            while self.mid_prices.len() > self.mid_capacity {
                self.mid_prices.pop_front();
            }
            trace!(best_bid, best_ask, mid, "Recorded mid price");
        } else {
            debug!(
                bid_levels = self.bids.len(),
                ask_levels = self.asks.len(),
                "One-sided snapshot, no mid price recorded"
            );
        }
    }

    pub fn bids(&self) -> &BookSide {
        &self.bids
    }

    pub fn asks(&self) -> &BookSide {
        &self.asks
    }

    pub fn mid_prices(&self) -> &VecDeque<f64> {
        &self.mid_prices
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }

    pub fn best_bid(&self) -> Option<f64> {
        self.bids.max_price()
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.min_price()
    }

    /// Best ask minus best bid, 0 when either side is empty.
    pub fn spread(&self) -> f64 {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => ask - bid,
            _ => 0.0,
        }
    }

    pub fn market_volume(&self, levels: usize) -> f64 {
        self.bids.depth(levels) + self.asks.depth(levels)
    }

    pub fn book_imbalance(&self, levels: usize) -> f64 {
        let bid_vol = self.bids.depth(levels);
        let ask_vol = self.asks.depth(levels);
        let total = bid_vol + ask_vol;
        if total == 0.0 {
            return 0.0;
        }
        (bid_vol - ask_vol) / total
    }

    /// Population standard deviation of the trailing `window` mid prices.
    ///
    /// Returns 0.0 until at least `window` samples exist.
    pub fn volatility(&self, window: usize) -> f64 {
        if window == 0 || self.mid_prices.len() < window {
            return 0.0;
        }
        let tail = self.mid_prices.iter().skip(self.mid_prices.len() - window);
        let n = window as f64;
        let mean = tail.clone().sum::<f64>() / n;
        let variance = tail.map(|p| (p - mean).powi(2)).sum::<f64>() / n;
        variance.sqrt()
    }

    pub fn metrics(&self, windows: &MetricWindows) -> BookMetrics {
        let best_bid = self.best_bid();
        let best_ask = self.best_ask();
        BookMetrics {
            best_bid,
            best_ask,
            mid_price: self.mid_prices.back().copied(),
            spread: self.spread(),
            market_volume: self.market_volume(windows.depth_levels),
            imbalance: self.book_imbalance(windows.imbalance_levels),
            volatility: self.volatility(windows.volatility_window),
            updates: self.updates,
        }
    }
}
