use thiserror::Error;

/// Order type strings the engine does not recognize.
#[derive(Debug, Error)]
#[error("unknown order type `{0}` (must be limit, market, ioc or fok)")]
pub struct UnknownOrderType(pub String);

/// Side strings the engine does not recognize.
#[derive(Debug, Error)]
#[error("unknown side `{0}` (must be buy or sell)")]
pub struct UnknownSide(pub String);

/// Failures raised while matching. The book is never left half-mutated:
/// fills applied before the failure stand, and the BBO cache stays in sync
/// with the level queues.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("order book lock poisoned for symbol `{0}`")]
    BookLockPoisoned(String),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("websocket connect failed: {0}")]
    Connect(String),
    #[error("websocket send failed: {0}")]
    Send(String),
}
