// Shared trait + stream type for feed connectors

use futures::stream::BoxStream;

use crate::error::FeedError;

/// Raw text frames from one live connection. Ends (or yields an error) when
/// the connection is gone.
pub type FeedStream = BoxStream<'static, Result<String, FeedError>>;

#[async_trait::async_trait]
pub trait FeedConnector: Send + Sync {
    /// Open a fresh connection. Called again after every failure.
    async fn connect(&self) -> Result<FeedStream, FeedError>;

    fn endpoint(&self) -> &str;
}

pub mod websocket;
