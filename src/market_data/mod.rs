// Market data module entrypoint
pub mod adapters;       // feed connectors (websocket)
pub mod normaliser;     // converts wire levels -> PriceLevels
pub mod ingestor;       // reconnecting feed loop
pub mod router;         // applies payloads to the shared book, tracks feed health
