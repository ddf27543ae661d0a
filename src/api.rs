use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{FromRequest, Path, Query, Request, State},
    http::StatusCode,
    routing::{get, post},
};

use crate::{
    orderbook::{BookSnapshot, MarketDepth},
    orders::{Order, OrderType, Side},
    state::AppState,
    trade::Trade,
    utils::current_timestamp,
};

type ApiErr = (StatusCode, Json<serde_json::Value>);
fn err(status: StatusCode, msg: &str) -> ApiErr {
    (status, Json(json!({ "error": msg })))
}

fn log_rejected(payload: &OrderRequest, reason: &str) {
    warn!(
        reason,
        symbol = %payload.symbol,
        order_type = %payload.order_type,
        side = %payload.side,
        "order rejected"
    );
}

/// JSON extractor that logs rejected payloads before answering 400.
pub struct LoggedJson<T>(pub T);

impl<S, T> FromRequest<S> for LoggedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiErr;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        //capture request details for logging
        let method = req.method().clone();
        let uri = req.uri().clone();
        // read full body
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| err(StatusCode::BAD_REQUEST, &e.to_string()))?;

        match serde_json::from_slice::<T>(&bytes) {
            Ok(val) => Ok(LoggedJson(val)),
            Err(e) => {
                //cap body preview to avoid giant logs; truncating the raw
                //bytes keeps a split multi-byte char from panicking the slice
                let preview = String::from_utf8_lossy(&bytes[..bytes.len().min(4096)]);
                warn!(
                    error = %e,
                    %method,
                    uri = %uri,
                    body_preview = %preview,
                    "order rejected: JSON deserialization failed"
                );
                Err(err(StatusCode::BAD_REQUEST, &e.to_string()))
            }
        }
    }
}

/// A quantity or price that arrives either as a JSON number or as a
/// numeric string (both are accepted on the wire).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Numeric {
    Number(f64),
    Text(String),
}

impl Numeric {
    fn value(&self) -> Option<f64> {
        match self {
            Numeric::Number(v) => Some(*v),
            Numeric::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Request payload for `POST /orders` (and the websocket order frame).
///
/// - `order_type`: one of `limit`, `market`, `ioc`, `fok` (any case)
/// - `side`: `buy` or `sell` (any case)
/// - `quantity`: must parse to a strictly positive number
/// - `price`: required for every type except `market`; must be ≥ 0
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub order_type: String,
    pub side: String,
    pub quantity: Numeric,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Numeric>,
}

impl OrderRequest {
    /// Validates the payload and mints an [`Order`] with a server-generated
    /// id and timestamp. The error string is the wire-facing rejection
    /// reason.
    pub fn into_order(self) -> Result<Order, String> {
        let order_type = self
            .order_type
            .parse::<OrderType>()
            .map_err(|e| e.to_string())?;
        let side = self.side.parse::<Side>().map_err(|e| e.to_string())?;

        let quantity = self
            .quantity
            .value()
            .ok_or_else(|| "invalid 'quantity' value".to_string())?;
        if quantity <= 0.0 {
            return Err("'quantity' must be positive".to_string());
        }

        let price = match self.price {
            Some(raw) => {
                let price = raw
                    .value()
                    .ok_or_else(|| "invalid 'price' value".to_string())?;
                if price < 0.0 {
                    return Err("'price' must be non-negative".to_string());
                }
                price
            }
            None if order_type == OrderType::Market => 0.0,
            None => {
                return Err("'price' is required for limit, ioc and fok orders".to_string());
            }
        };

        Ok(Order::new(
            Uuid::new_v4().to_string(),
            self.symbol,
            order_type,
            side,
            quantity,
            price,
            current_timestamp(),
        ))
    }
}

/// Response for `POST /orders`.
///
/// - `order_id`: the server-generated order ID
/// - `executions`: the trades the order produced, in execution order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    pub order_id: String,
    pub status: String,
    pub message: String,
    pub executions: Vec<Trade>,
}

impl OrderResponse {
    pub fn accepted(order_id: String, executions: Vec<Trade>) -> Self {
        Self {
            order_id,
            status: "success".to_string(),
            message: "Order submitted successfully".to_string(),
            executions,
        }
    }
}

fn default_levels() -> usize {
    10
}

#[derive(Deserialize)]
pub struct DepthQuery {
    #[serde(default = "default_levels")]
    levels: usize,
}

/// `POST /orders`
///
/// Validates the payload, runs it through the matching engine and returns
/// the executions.
///
/// *Success:* 200, JSON [`OrderResponse`]
/// *Bad Request:* 400, JSON `{ "error": reason }`
/// *Failure:* 500, JSON `{ "error": "internal server error" }`
pub async fn create_order(
    State(state): State<AppState>,
    LoggedJson(payload): LoggedJson<OrderRequest>,
) -> Result<Json<OrderResponse>, ApiErr> {
    let mut order = payload.clone().into_order().map_err(|reason| {
        log_rejected(&payload, &reason);
        err(StatusCode::BAD_REQUEST, &reason)
    })?;

    info!(
        order_id = %order.order_id,
        symbol = %order.symbol,
        order_type = ?order.order_type,
        side = %order.side,
        quantity = order.quantity,
        price = order.price,
        "order received"
    );

    let executions = state.engine.process_order(&mut order).map_err(|e| {
        error!(error = %e, order_id = %order.order_id, "matching failed");
        err(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
    })?;

    Ok(Json(OrderResponse::accepted(order.order_id, executions)))
}

/// `GET /book/{symbol}`
///
/// Returns the full aggregated book for the symbol. Symbols without order
/// flow yield an empty snapshot; the query never creates a book.
pub async fn get_book(
    Path(symbol): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<BookSnapshot>, ApiErr> {
    let snapshot = match state.engine.book(&symbol) {
        Some(handle) => handle
            .lock()
            .map_err(|_| err(StatusCode::INTERNAL_SERVER_ERROR, "internal server error"))?
            .snapshot(),
        None => BookSnapshot::empty(symbol),
    };
    Ok(Json(snapshot))
}

/// `GET /depth/{symbol}?levels=N`
///
/// Returns the aggregated top-N levels per side (default 10) with a
/// server-generated timestamp.
pub async fn get_depth(
    Path(symbol): Path<String>,
    State(state): State<AppState>,
    Query(q): Query<DepthQuery>,
) -> Result<Json<MarketDepth>, ApiErr> {
    let depth = match state.engine.book(&symbol) {
        Some(handle) => handle
            .lock()
            .map_err(|_| err(StatusCode::INTERNAL_SERVER_ERROR, "internal server error"))?
            .market_depth(q.levels),
        None => MarketDepth::empty(symbol),
    };
    Ok(Json(depth))
}

/// Constructs the REST `Router`: order ingress plus the market-data reads.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/orders", post(create_order))
        .route("/book/{symbol}", get(get_book))
        .route("/depth/{symbol}", get(get_depth))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(
                    DefaultMakeSpan::new()
                        .include_headers(false)
                        .level(tracing::Level::TRACE),
                )
                .on_response(DefaultOnResponse::new().level(tracing::Level::TRACE)),
        )
        .with_state(state)
}
