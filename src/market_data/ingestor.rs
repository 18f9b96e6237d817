//! Long-running feed loop: connect, forward decoded payloads, reconnect after
//! a fixed delay on any failure, until stopped.
//!
//! ```text
//! Connecting --ok--> Connected --error/close--> (backoff) --> Connecting
//!      \                                                        |
//!       +-------------------- stop() -------------> Stopped <---+
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument, warn};

use crate::config::FeedConfig;
use crate::error::FeedError;
use crate::market_data::adapters::{FeedConnector, FeedStream};

/// Reserved key marking connection status payloads.
pub const STATUS_KEY: &str = "connection_status";
pub const STATUS_CONNECTED: &str = "connected";
pub const STATUS_DISCONNECTED: &str = "disconnected";

pub fn status_payload(status: &str) -> Value {
    json!({ STATUS_KEY: status })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestorState {
    Connecting,
    Connected,
    Stopped,
}

/// Receives every decoded payload, plus `connected`/`disconnected` status
/// payloads once per connection.
#[async_trait::async_trait]
pub trait FeedConsumer: Send + Sync {
    async fn on_message(&self, payload: Value);
}

#[async_trait::async_trait]
impl FeedConsumer for mpsc::Sender<Value> {
    async fn on_message(&self, payload: Value) {
        if self.send(payload).await.is_err() {
            debug!("Consumer channel closed, dropping payload");
        }
    }
}

#[async_trait::async_trait]
impl<C: FeedConsumer + ?Sized> FeedConsumer for Arc<C> {
    async fn on_message(&self, payload: Value) {
        (**self).on_message(payload).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestorSettings {
    pub reconnect_delay: Duration,
    /// Longest silence tolerated on a live connection before it is dropped.
    pub read_timeout: Duration,
}

impl Default for IngestorSettings {
    fn default() -> Self {
        (&FeedConfig::default()).into()
    }
}

impl From<&FeedConfig> for IngestorSettings {
    fn from(cfg: &FeedConfig) -> Self {
        Self { reconnect_delay: cfg.reconnect_delay(), read_timeout: cfg.read_timeout() }
    }
}

/// Cloneable handle that asks a running ingestor to stop.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    /// Takes effect at the next loop check; an in-flight read is not
    /// interrupted, a backoff sleep is.
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }
}

pub struct FeedIngestor<C> {
    connector: C,
    settings: IngestorSettings,
    state: Mutex<IngestorState>,
    stop: StopHandle,
    connect_attempts: AtomicU64,
}

impl<C: FeedConnector> FeedIngestor<C> {
    pub fn new(connector: C, settings: IngestorSettings) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            connector,
            settings,
            state: Mutex::new(IngestorState::Connecting),
            stop: StopHandle { tx: Arc::new(tx) },
            connect_attempts: AtomicU64::new(0),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn state(&self) -> IngestorState {
        *self.state.lock()
    }

    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts.load(Ordering::Relaxed)
    }

    fn set_state(&self, state: IngestorState) {
        *self.state.lock() = state;
    }

    /// Run until stopped. Never returns early on errors.
    #[instrument(skip_all, fields(endpoint = %self.connector.endpoint()))]
    pub async fn run<K>(&self, consumer: &K)
    where
        K: FeedConsumer + ?Sized,
    {
        let mut stop_rx = self.stop.tx.subscribe();

        while !self.stop.is_stopped() {
            self.set_state(IngestorState::Connecting);
            let attempt = self.connect_attempts.fetch_add(1, Ordering::Relaxed) + 1;

            match self.connector.connect().await {
                Ok(stream) => {
                    self.set_state(IngestorState::Connected);
                    metrics::gauge!("tradesim_feed_connected").set(1.0);
                    info!(attempt, "Feed connected");
                    consumer.on_message(status_payload(STATUS_CONNECTED)).await;

                    match self.pump(stream, consumer).await {
                        Ok(()) => info!("Feed stopped while connected"),
                        Err(e) => warn!(error = %e, "Feed connection lost"),
                    }
                    metrics::gauge!("tradesim_feed_connected").set(0.0);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Feed connect failed");
                }
            }
            consumer.on_message(status_payload(STATUS_DISCONNECTED)).await;

            if self.stop.is_stopped() {
                break;
            }
            metrics::counter!("tradesim_feed_reconnects_total").increment(1);
            info!(delay_ms = self.settings.reconnect_delay.as_millis() as u64, "Reconnecting after backoff");
            tokio::select! {
                _ = tokio::time::sleep(self.settings.reconnect_delay) => {}
                _ = stop_rx.wait_for(|stopped| *stopped) => {}
            }
        }

        self.set_state(IngestorState::Stopped);
        info!(attempts = self.connect_attempts(), "Feed ingestor stopped");
    }

    // Ok(()) only when stopped; every other exit is a connection failure.
    async fn pump<K>(&self, mut stream: FeedStream, consumer: &K) -> Result<(), FeedError>
    where
        K: FeedConsumer + ?Sized,
    {
        loop {
            let next = tokio::time::timeout(self.settings.read_timeout, stream.next())
                .await
                .map_err(|_| FeedError::ReadTimeout(self.settings.read_timeout))?;

            match next {
                None => return Err(FeedError::Closed),
                Some(Err(e)) => return Err(e),
                Some(Ok(text)) => {
                    metrics::counter!("tradesim_feed_messages_total").increment(1);
                    match serde_json::from_str::<Value>(&text) {
                        Ok(payload) => consumer.on_message(payload).await,
                        Err(e) => {
                            metrics::counter!("tradesim_feed_decode_errors_total").increment(1);
                            warn!(error = %e, bytes = text.len(), "Dropping undecodable feed message");
                        }
                    }
                }
            }

            if self.stop.is_stopped() {
                return Ok(());
            }
        }
    }
}
