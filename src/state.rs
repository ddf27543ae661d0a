use std::sync::Arc;

use tokio::sync::broadcast;

use crate::{engine::MatchingEngine, trade::Trade};

/// Shared handle for the REST and WebSocket layers.
///
/// The engine's callbacks fan out into the two broadcast channels:
/// `trade_tx` carries every trade, `book_tx` the symbol of any book that
/// changed. `broadcast::Sender::send` never blocks, which is what makes it
/// safe to call from inside the engine while a book lock is held.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<MatchingEngine>,
    pub trade_tx: broadcast::Sender<Trade>,
    pub book_tx: broadcast::Sender<String>,
}

impl AppState {
    pub fn new() -> Self {
        let engine = Arc::new(MatchingEngine::new());
        let (trade_tx, _) = broadcast::channel(1024);
        let (book_tx, _) = broadcast::channel(1024);

        let tx = trade_tx.clone();
        engine.set_on_trade(move |trade: &Trade| {
            // nobody listening is fine
            let _ = tx.send(trade.clone());
        });
        let tx = book_tx.clone();
        engine.set_on_book_change(move |symbol: &str| {
            let _ = tx.send(symbol.to_string());
        });

        Self {
            engine,
            trade_tx,
            book_tx,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        AppState::new()
    }
}
