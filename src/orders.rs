use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{UnknownOrderType, UnknownSide};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,  //bid
    Sell, //ask
}

impl FromStr for Side {
    type Err = UnknownSide;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buy" => Ok(Side::Buy),
            "sell" => Ok(Side::Sell),
            _ => Err(UnknownSide(s.to_string())),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
    Ioc,
    Fok,
}

impl FromStr for OrderType {
    type Err = UnknownOrderType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "market" => Ok(OrderType::Market),
            "limit" => Ok(OrderType::Limit),
            "ioc" => Ok(OrderType::Ioc),
            "fok" => Ok(OrderType::Fok),
            _ => Err(UnknownOrderType(s.to_string())),
        }
    }
}

/// Lifecycle of an order. `Filled` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Cancelled,
}

/// An order handed to the engine once and, for limit residuals, owned by the
/// book afterwards.
///
/// `quantity` is the remaining open quantity: the engine rewrites it after a
/// matching pass, and mutates it in place on resting makers as they fill.
/// `price` is ignored for market orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub symbol: String,
    pub order_type: OrderType,
    pub side: Side,
    pub quantity: f64,
    pub price: f64,
    pub timestamp: String,
    pub status: OrderStatus,
}

impl Order {
    pub fn new(
        order_id: impl Into<String>,
        symbol: impl Into<String>,
        order_type: OrderType,
        side: Side,
        quantity: f64,
        price: f64,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            symbol: symbol.into(),
            order_type,
            side,
            quantity,
            price,
            timestamp: timestamp.into(),
            status: OrderStatus::New,
        }
    }
}
