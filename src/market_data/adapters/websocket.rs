// Websocket connector for L2 order book feeds

use futures::{future, SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::{FeedConnector, FeedStream};
use crate::config::FeedConfig;
use crate::error::FeedError;

pub struct WebSocketConnector {
    pub url: String,             // e.g. "wss://ws.gomarket-cpp.goquant.io/ws/l2-orderbook/okx/BTC-USDT-SWAP"
    pub subscribe: Option<String>, // JSON text sent right after the handshake
}

impl WebSocketConnector {
    pub fn new(url: &str) -> Self {
        Self { url: url.to_string(), subscribe: None }
    }

    pub fn with_subscription(mut self, message: impl Into<String>) -> Self {
        self.subscribe = Some(message.into());
        self
    }
}

impl From<&FeedConfig> for WebSocketConnector {
    fn from(cfg: &FeedConfig) -> Self {
        Self { url: cfg.url.clone(), subscribe: cfg.subscribe.clone() }
    }
}

// Text frames pass through, as do binary frames holding valid UTF-8.
// Control frames are handled by tungstenite.
fn frame_to_text(msg: Result<Message, tokio_tungstenite::tungstenite::Error>) -> Option<Result<String, FeedError>> {
    match msg {
        Ok(Message::Text(text)) => Some(Ok(text)),
        Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
            Ok(text) => Some(Ok(text)),
            Err(e) => {
                metrics::counter!("tradesim_feed_decode_errors_total").increment(1);
                warn!(error = %e, "Dropping binary frame that is not UTF-8");
                None
            }
        },
        Ok(Message::Close(frame)) => {
            debug!(?frame, "Close frame received");
            None
        }
        Ok(_) => None,
        Err(e) => Some(Err(FeedError::Transport(e))),
    }
}

#[async_trait::async_trait]
impl FeedConnector for WebSocketConnector {
    async fn connect(&self) -> Result<FeedStream, FeedError> {
        let (mut ws_stream, response) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|source| FeedError::Connect { url: self.url.clone(), source })?;
        info!(url = %self.url, status = %response.status(), "Websocket handshake complete");

        if let Some(subscribe_msg) = &self.subscribe {
            ws_stream.send(Message::Text(subscribe_msg.clone())).await?;
            debug!(message = %subscribe_msg, "Subscription sent");
        }

        Ok(ws_stream.filter_map(|msg| future::ready(frame_to_text(msg))).boxed())
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::tungstenite::Error as WsError;

    #[test]
    fn test_frame_mapping() {
        assert_eq!(frame_to_text(Ok(Message::Text("{}".into()))).unwrap().unwrap(), "{}");
        assert_eq!(frame_to_text(Ok(Message::Binary(b"[1]".to_vec()))).unwrap().unwrap(), "[1]");
        assert!(frame_to_text(Ok(Message::Ping(vec![1]))).is_none());
        // Invalid UTF-8 is dropped, not repaired
        assert!(frame_to_text(Ok(Message::Binary(b"{\"bids\":\xff}".to_vec()))).is_none());
        assert!(frame_to_text(Ok(Message::Close(None))).is_none());
        assert!(matches!(
            frame_to_text(Err(WsError::ConnectionClosed)),
            Some(Err(FeedError::Transport(WsError::ConnectionClosed)))
        ));
    }

    #[test]
    fn test_from_config() {
        let cfg = FeedConfig { subscribe: Some("{\"op\":\"subscribe\"}".into()), ..FeedConfig::default() };
        let connector = WebSocketConnector::from(&cfg);
        assert_eq!(connector.endpoint(), cfg.url);
        assert!(connector.subscribe.is_some());
        assert!(WebSocketConnector::new("wss://x").with_subscription("{}").subscribe.is_some());
    }
}
