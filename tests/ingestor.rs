use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{stream, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Error as WsError;

use tradesim_rs::market_data::adapters::{FeedConnector, FeedStream};
use tradesim_rs::market_data::ingestor::{
    status_payload, FeedIngestor, IngestorSettings, IngestorState, STATUS_CONNECTED, STATUS_DISCONNECTED,
};
use tradesim_rs::FeedError;

type Script = Result<Vec<Result<String, FeedError>>, FeedError>;

/// Plays one script per connect call; once exhausted every connection
/// succeeds and then stays silent.
struct ScriptedConnector {
    scripts: Mutex<VecDeque<Script>>,
    connects: AtomicUsize,
}

impl ScriptedConnector {
    fn new(scripts: Vec<Script>) -> Self {
        Self { scripts: Mutex::new(scripts.into()), connects: AtomicUsize::new(0) }
    }
}

#[async_trait::async_trait]
impl FeedConnector for ScriptedConnector {
    async fn connect(&self) -> Result<FeedStream, FeedError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let script = self.scripts.lock().pop_front();
        match script {
            Some(Ok(items)) => Ok(stream::iter(items).boxed()),
            Some(Err(e)) => Err(e),
            None => Ok(stream::pending().boxed()),
        }
    }

    fn endpoint(&self) -> &str {
        "scripted://feed"
    }
}

fn settings() -> IngestorSettings {
    IngestorSettings { reconnect_delay: Duration::from_secs(2), read_timeout: Duration::from_secs(30) }
}

fn snapshot() -> Value {
    json!({"bids": [["100.0", "1.0"]], "asks": [["100.1", "0.5"]]})
}

async fn next(rx: &mut mpsc::Receiver<Value>) -> Value {
    rx.recv().await.expect("ingestor dropped the channel")
}

#[tokio::test(start_paused = true)]
async fn reconnects_after_failure_mid_stream() {
    let connector = ScriptedConnector::new(vec![Ok(vec![
        Ok(snapshot().to_string()),
        Err(FeedError::Transport(WsError::ConnectionClosed)),
    ])]);
    let ingestor = Arc::new(FeedIngestor::new(connector, settings()));
    let (tx, mut rx) = mpsc::channel(16);

    let task = tokio::spawn({
        let ingestor = Arc::clone(&ingestor);
        async move { ingestor.run(&tx).await }
    });

    assert_eq!(next(&mut rx).await, status_payload(STATUS_CONNECTED));
    assert_eq!(next(&mut rx).await, snapshot());
    assert_eq!(next(&mut rx).await, status_payload(STATUS_DISCONNECTED));
    let dropped_at = Instant::now();

    // Second attempt only after the fixed backoff
    assert_eq!(next(&mut rx).await, status_payload(STATUS_CONNECTED));
    assert!(dropped_at.elapsed() >= Duration::from_secs(2));
    assert_eq!(ingestor.connect_attempts(), 2);
    assert_eq!(ingestor.state(), IngestorState::Connected);

    // Stop is graceful: the silent connection ends at the read timeout.
    ingestor.stop();
    assert_eq!(next(&mut rx).await, status_payload(STATUS_DISCONNECTED));
    task.await.unwrap();
    assert_eq!(ingestor.state(), IngestorState::Stopped);
    assert_eq!(ingestor.connect_attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn malformed_message_does_not_drop_stream() {
    let connector = ScriptedConnector::new(vec![Ok(vec![
        Ok("{not json".to_string()),
        Ok(snapshot().to_string()),
        Ok("[]".to_string()),
    ])]);
    let ingestor = Arc::new(FeedIngestor::new(connector, settings()));
    let (tx, mut rx) = mpsc::channel(16);

    let task = tokio::spawn({
        let ingestor = Arc::clone(&ingestor);
        async move { ingestor.run(&tx).await }
    });

    assert_eq!(next(&mut rx).await, status_payload(STATUS_CONNECTED));
    // The bad frame is skipped; everything decodable is forwarded as is.
    assert_eq!(next(&mut rx).await, snapshot());
    assert_eq!(next(&mut rx).await, json!([]));
    assert_eq!(next(&mut rx).await, status_payload(STATUS_DISCONNECTED));

    ingestor.stop();
    task.await.unwrap();
    assert_eq!(ingestor.connect_attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn connect_failures_retry_without_limit() {
    let scripts = (0..5)
        .map(|_| Err(FeedError::Connect { url: "scripted://feed".into(), source: WsError::ConnectionClosed }))
        .collect();
    let ingestor = Arc::new(FeedIngestor::new(ScriptedConnector::new(scripts), settings()));
    let (tx, mut rx) = mpsc::channel(16);

    let started = Instant::now();
    let task = tokio::spawn({
        let ingestor = Arc::clone(&ingestor);
        async move { ingestor.run(&tx).await }
    });

    for _ in 0..5 {
        assert_eq!(next(&mut rx).await, status_payload(STATUS_DISCONNECTED));
    }
    assert_eq!(next(&mut rx).await, status_payload(STATUS_CONNECTED));
    // Five fixed delays, no growth
    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(10) && waited < Duration::from_secs(11));
    assert_eq!(ingestor.connect_attempts(), 6);

    ingestor.stop();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stop_interrupts_backoff() {
    let connector = ScriptedConnector::new(vec![Err(FeedError::Closed)]);
    let ingestor = Arc::new(FeedIngestor::new(
        connector,
        IngestorSettings { reconnect_delay: Duration::from_secs(3600), read_timeout: Duration::from_secs(30) },
    ));
    let (tx, mut rx) = mpsc::channel(16);

    let task = tokio::spawn({
        let ingestor = Arc::clone(&ingestor);
        async move { ingestor.run(&tx).await }
    });

    assert_eq!(next(&mut rx).await, status_payload(STATUS_DISCONNECTED));
    let stopped_at = Instant::now();
    ingestor.stop_handle().stop();
    task.await.unwrap();

    assert!(stopped_at.elapsed() < Duration::from_secs(3600));
    assert_eq!(ingestor.state(), IngestorState::Stopped);
    assert_eq!(ingestor.connect_attempts(), 1);
}

#[tokio::test]
async fn stopped_before_run_never_connects() {
    let ingestor = FeedIngestor::new(ScriptedConnector::new(vec![]), settings());
    ingestor.stop();
    let (tx, _rx) = mpsc::channel(1);
    ingestor.run(&tx).await;
    assert_eq!(ingestor.connect_attempts(), 0);
    assert_eq!(ingestor.state(), IngestorState::Stopped);
}
