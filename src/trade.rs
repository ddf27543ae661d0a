use serde::{Deserialize, Serialize};

use crate::orders::Side;

/// A trade records one fill between two orders.
///
/// - `price` always comes from the maker (the resting order).
/// - `aggressor_side` is the incoming order's side.
/// - `timestamp` is copied from the aggressor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: String,
    pub timestamp: String,
    pub symbol: String,
    pub price: f64,
    pub quantity: f64,
    pub aggressor_side: Side,
    pub maker_order_id: String,
    pub taker_order_id: String,
}
