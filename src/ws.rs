use std::collections::HashSet;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use crate::{
    api::{OrderRequest, OrderResponse},
    orderbook::MarketDepth,
    state::AppState,
    trade::Trade,
};

/// Price levels per side pushed to depth subscribers.
const DEPTH_LEVELS: usize = 10;

/// A message from a connected client.
///
/// Serialized as an internally-tagged object:
/// ```json
/// {"type": "subscribe", "symbol": "BTC-USDT"}
/// {"type": "order", "symbol": "BTC-USDT", "order_type": "limit", ...}
/// ```
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    Order(OrderRequest),
    Subscribe { symbol: String },
    Unsubscribe { symbol: String },
}

/// A message pushed to a connected client: depth updates and trades for
/// subscribed symbols, plus acks and errors for frames the client sent.
///
/// Serialized as a tagged envelope:
/// ```json
/// {"type": "Depth", "data": { /* depth fields */ }}
/// {"type": "Trade", "data": { /* trade fields */ }}
/// ```
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WsFrame {
    Depth(MarketDepth),
    Trade(Trade),
    Ack(OrderResponse),
    Error { message: String },
}

/// `GET /`
/// Upgrades the connection and drives the market-data feed for it.
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send_frame(socket: &mut WebSocket, frame: &WsFrame) -> bool {
    match serde_json::to_string(frame) {
        Ok(text) => {
            if let Err(e) = socket.send(Message::Text(text.into())).await {
                error!(error = %e, "websocket send failed");
                return false;
            }
            true
        }
        Err(e) => {
            error!(error = %e, "failed to serialize websocket frame");
            true
        }
    }
}

fn depth_for(state: &AppState, symbol: &str) -> MarketDepth {
    match state.engine.book(symbol) {
        Some(handle) => match handle.lock() {
            Ok(book) => book.market_depth(DEPTH_LEVELS),
            Err(_) => {
                warn!(symbol, "book lock poisoned while building depth frame");
                MarketDepth::empty(symbol)
            }
        },
        None => MarketDepth::empty(symbol),
    }
}

/// Handles one client frame, mutating the connection's subscription set.
/// Returns the direct reply, if any; depth and trade pushes for subscribed
/// symbols flow through the broadcast channels instead.
fn handle_client_frame(
    state: &AppState,
    subscriptions: &mut HashSet<String>,
    text: &str,
) -> Option<WsFrame> {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "invalid websocket frame");
            return Some(WsFrame::Error {
                message: format!("invalid message: {e}"),
            });
        }
    };

    match frame {
        ClientFrame::Subscribe { symbol } => {
            info!(%symbol, "client subscribed");
            subscriptions.insert(symbol.clone());
            // seed the subscriber with the current depth right away
            Some(WsFrame::Depth(depth_for(state, &symbol)))
        }
        ClientFrame::Unsubscribe { symbol } => {
            info!(%symbol, "client unsubscribed");
            subscriptions.remove(&symbol);
            None
        }
        ClientFrame::Order(request) => {
            let mut order = match request.into_order() {
                Ok(order) => order,
                Err(reason) => {
                    warn!(%reason, "websocket order rejected");
                    return Some(WsFrame::Error { message: reason });
                }
            };
            match state.engine.process_order(&mut order) {
                Ok(executions) => Some(WsFrame::Ack(OrderResponse::accepted(
                    order.order_id,
                    executions,
                ))),
                Err(e) => {
                    error!(error = %e, order_id = %order.order_id, "matching failed");
                    Some(WsFrame::Error {
                        message: "internal server error".to_string(),
                    })
                }
            }
        }
    }
}

/// Per-connection loop: reacts to client frames and forwards trade and
/// depth broadcasts for the symbols this connection subscribed to.
pub async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let mut subscriptions: HashSet<String> = HashSet::new();
    let mut trade_rx = state.trade_tx.subscribe();
    let mut book_rx = state.book_tx.subscribe();

    info!("new websocket connection established");
    loop {
        tokio::select! {
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_client_frame(&state, &mut subscriptions, &text) {
                            if !send_frame(&mut socket, &reply).await {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // ignore binary and ping/pong frames
                    Some(Err(e)) => {
                        error!(error = %e, "websocket receive failed");
                        break;
                    }
                }
            }
            trade = trade_rx.recv() => {
                match trade {
                    Ok(trade) if subscriptions.contains(&trade.symbol) => {
                        if !send_frame(&mut socket, &WsFrame::Trade(trade)).await {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "trade feed lagged; frames dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            changed = book_rx.recv() => {
                match changed {
                    Ok(symbol) if subscriptions.contains(&symbol) => {
                        let depth = depth_for(&state, &symbol);
                        if !send_frame(&mut socket, &WsFrame::Depth(depth)).await {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "book feed lagged; frames dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }
    info!("websocket connection closed");
}

/// Constructs the market-data feed `Router`, served on its own listener.
pub fn router(state: AppState) -> Router {
    Router::new().route("/", get(ws_handler)).with_state(state)
}
