// Router: the feed consumer. Interprets payloads, applies snapshots to the
// shared book, tracks connection status, staleness and processing latency.

use std::time::{Duration, Instant};

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::engine::book::SharedBook;
use crate::engine::types::{ConnectionState, PriceLevel};
use crate::error::SimulatorError;
use crate::market_data::ingestor::{FeedConsumer, STATUS_CONNECTED, STATUS_DISCONNECTED, STATUS_KEY};
use crate::market_data::normaliser::Normaliser;

pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(5);

pub const WARNING_WAITING_FOR_DATA: &str =
    "WebSocket connected but no orderbook data received. Waiting for data...";
pub const WARNING_NO_DATA: &str =
    "No live data received in the last 5 seconds. Check your VPN and connection.";

/// What the router did with one payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    Status(ConnectionState),
    Snapshot { bids: usize, asks: usize },
    Rejected,
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct LatencyStats {
    pub last_us: Option<f64>,
    pub p50_us: u64,
    pub p99_us: u64,
    pub samples: u64,
}

/// Feed health as seen by a poller at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedHealth {
    pub state: ConnectionState,
    pub stale: bool,
    pub warning: Option<&'static str>,
    pub latency: LatencyStats,
    pub snapshots: u64,
    pub rejected: u64,
}

struct RouterStatus {
    state: ConnectionState,
    socket_up: bool,
    last_data: Instant,
    last_latency: Option<Duration>,
    latency_us: Histogram<u64>,
    snapshots: u64,
    rejected: u64,
}

pub struct FeedRouter {
    book: SharedBook,
    stale_after: Duration,
    status: Mutex<RouterStatus>,
}

impl FeedRouter {
    pub fn new(book: SharedBook, stale_after: Duration) -> Result<Self, SimulatorError> {
        let latency_us = Histogram::<u64>::new(3).map_err(|e| SimulatorError::Latency(format!("{e:?}")))?;
        Ok(Self {
            book,
            stale_after,
            status: Mutex::new(RouterStatus {
                state: ConnectionState::Disconnected,
                socket_up: false,
                // Fresh start counts as fresh data: no warning for the first window
                last_data: Instant::now(),
                last_latency: None,
                latency_us,
                snapshots: 0,
                rejected: 0,
            }),
        })
    }

    pub fn book(&self) -> &SharedBook {
        &self.book
    }

    /// Apply one decoded payload.
    pub fn route(&self, payload: &Value) -> Routed {
        if let Some(status) = payload.get(STATUS_KEY) {
            return self.apply_status(status);
        }

        match (payload.get("bids"), payload.get("asks")) {
            (Some(bids), Some(asks)) => self.apply_snapshot(bids, asks),
            _ => {
                let keys: Vec<&str> = payload
                    .as_object()
                    .map(|m| m.keys().map(String::as_str).collect())
                    .unwrap_or_default();
                warn!(?keys, "Payload missing 'bids' or 'asks'");
                Routed::Ignored
            }
        }
    }

    fn apply_status(&self, status: &Value) -> Routed {
        let mut st = self.status.lock();
        match status.as_str() {
            Some(STATUS_CONNECTED) => {
                st.state = ConnectionState::Connected;
                st.socket_up = true;
                info!("Feed connection established");
                Routed::Status(ConnectionState::Connected)
            }
            Some(STATUS_DISCONNECTED) => {
                st.state = ConnectionState::Disconnected;
                st.socket_up = false;
                info!("Feed disconnected");
                Routed::Status(ConnectionState::Disconnected)
            }
            _ => {
                warn!(%status, "Unknown connection status");
                Routed::Ignored
            }
        }
    }

    fn apply_snapshot(&self, raw_bids: &Value, raw_asks: &Value) -> Routed {
        let start = Instant::now();

        // Decode both sides before touching the book.
        let decoded: Result<(Vec<PriceLevel>, Vec<PriceLevel>), _> = Normaliser::parse_side("bids", raw_bids)
            .and_then(|bids| Normaliser::parse_side("asks", raw_asks).map(|asks| (bids, asks)));
        let (bids, asks) = match decoded {
            Ok(sides) => sides,
            Err(e) => {
                warn!(error = %e, "Rejecting malformed snapshot");
                self.status.lock().rejected += 1;
                return Routed::Rejected;
            }
        };

        self.book.write().update(&bids, &asks);
        let elapsed = start.elapsed();

        let mut st = self.status.lock();
        st.last_data = Instant::now();
        st.last_latency = Some(elapsed);
        st.latency_us.saturating_record(u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX));
        st.snapshots += 1;
        st.state = ConnectionState::Connected;
        metrics::counter!("tradesim_book_updates_total").increment(1);
        debug!(
            bids = bids.len(),
            asks = asks.len(),
            latency_us = elapsed.as_secs_f64() * 1e6,
            "Order book updated"
        );
        Routed::Snapshot { bids: bids.len(), asks: asks.len() }
    }

    pub fn health(&self) -> FeedHealth {
        self.health_at(Instant::now())
    }

    /// Connection state with the staleness rule applied: no snapshot for
    /// longer than `stale_after` downgrades to waiting/disconnected depending
    /// on whether the socket is up.
    pub fn health_at(&self, now: Instant) -> FeedHealth {
        let st = self.status.lock();
        let stale = now.saturating_duration_since(st.last_data) > self.stale_after;
        let (state, warning) = match (stale, st.socket_up) {
            (true, true) => (ConnectionState::ConnectedWaitingForData, Some(WARNING_WAITING_FOR_DATA)),
            (true, false) => (ConnectionState::Disconnected, Some(WARNING_NO_DATA)),
            (false, _) => (st.state, None),
        };
        let latency = LatencyStats {
            last_us: st.last_latency.map(|d| d.as_secs_f64() * 1e6),
            p50_us: st.latency_us.value_at_quantile(0.5),
            p99_us: st.latency_us.value_at_quantile(0.99),
            samples: st.latency_us.len(),
        };
        FeedHealth { state, stale, warning, latency, snapshots: st.snapshots, rejected: st.rejected }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.health().state
    }
}

#[async_trait::async_trait]
impl FeedConsumer for FeedRouter {
    async fn on_message(&self, payload: Value) {
        self.route(&payload);
    }
}
