use std::collections::{BTreeMap, VecDeque};

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    orders::{Order, Side},
    utils::current_timestamp,
};

/// FIFO queue of resting orders at one price.
pub type Level = VecDeque<Order>;

/// Notification sink fired on any book mutation. Invoked while the book's
/// lock is held, so it must not block or re-enter the same book.
pub type ChangeSink = Box<dyn Fn() + Send>;

/// One symbol's resting liquidity, stored in two [`BTreeMap`]s:
/// - `bids` (buy orders), matched from the highest price down
/// - `asks` (sell orders), matched from the lowest price up
///
/// Each price level holds a FIFO [`VecDeque`] of orders, which together with
/// the price-ordered keys yields price-time priority: the head of the best
/// level's queue is the next maker to match.
///
/// The book caches its best bid and ask; `0.0` denotes an empty side. The
/// cache is maintained incrementally by [`OrderBook::add`] and recomputed by
/// [`OrderBook::remove`] and after matching sweeps.
///
/// The struct carries no lock of its own; the engine wraps every book in a
/// mutex that serializes all reads and writes for that symbol.
pub struct OrderBook {
    symbol: String,

    /// Buy side, keyed by price in ascending order; iterated **in reverse**
    /// so the highest bid is seen first.
    pub bids: BTreeMap<OrderedFloat<f64>, Level>,

    /// Sell side, keyed by price in ascending order; iterated **forwards**
    /// so the lowest ask is seen first.
    pub asks: BTreeMap<OrderedFloat<f64>, Level>,

    best_bid: f64,
    best_ask: f64,
    on_change: Option<ChangeSink>,
}

/// Aggregated top-of-book document: up to N price levels per side as
/// `[price, quantity]` pairs, bids descending and asks ascending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDepth {
    pub timestamp: String,
    pub symbol: String,
    pub bids: Vec<(f64, f64)>,
    pub asks: Vec<(f64, f64)>,
}

impl MarketDepth {
    pub fn empty(symbol: impl Into<String>) -> Self {
        Self {
            timestamp: current_timestamp(),
            symbol: symbol.into(),
            bids: Vec::new(),
            asks: Vec::new(),
        }
    }
}

/// Full-book document: every price level per side, aggregated like
/// [`MarketDepth`] but without a timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub symbol: String,
    pub bids: Vec<(f64, f64)>,
    pub asks: Vec<(f64, f64)>,
}

impl BookSnapshot {
    pub fn empty(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            bids: Vec::new(),
            asks: Vec::new(),
        }
    }
}

impl OrderBook {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            best_bid: 0.0,
            best_ask: 0.0,
            on_change: None,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Appends a resting order to its side's queue at `order.price`,
    /// updating the cached best bid/ask if the price improves it (or the
    /// side was empty). Fires the change sink.
    pub fn add(&mut self, order: Order) {
        let price = order.price;
        match order.side {
            Side::Buy => {
                self.bids.entry(OrderedFloat(price)).or_default().push_back(order);
                if self.best_bid == 0.0 || price > self.best_bid {
                    self.best_bid = price;
                }
            }
            Side::Sell => {
                self.asks.entry(OrderedFloat(price)).or_default().push_back(order);
                if self.best_ask == 0.0 || price < self.best_ask {
                    self.best_ask = price;
                }
            }
        }
        self.notify_change();
    }

    /// Removes any order with `order_id` from the level at `price` on the
    /// given side, pruning the level if it empties. A no-op for unknown
    /// ids, levels or sides; the BBO cache is recomputed either way.
    pub fn remove(&mut self, order_id: &str, side: Side, price: f64) {
        let book_side = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        if let Some(queue) = book_side.get_mut(&OrderedFloat(price)) {
            queue.retain(|o| o.order_id != order_id);
            if queue.is_empty() {
                book_side.remove(&OrderedFloat(price));
                debug!(symbol = %self.symbol, price, "removed empty price level");
            }
        }
        self.update_bbo();
        self.notify_change();
    }

    /// `(best_bid, best_ask)`; `0.0` means that side is empty.
    pub fn bbo(&self) -> (f64, f64) {
        (self.best_bid, self.best_ask)
    }

    /// Up to `levels` aggregated `(price, quantity)` pairs for one side, in
    /// book order: bids descending, asks ascending.
    pub fn depth(&self, side: Side, levels: usize) -> Vec<(f64, f64)> {
        match side {
            Side::Buy => self
                .bids
                .iter()
                .rev()
                .take(levels)
                .map(|(p, q)| (p.into_inner(), level_quantity(q)))
                .collect(),
            Side::Sell => self
                .asks
                .iter()
                .take(levels)
                .map(|(p, q)| (p.into_inner(), level_quantity(q)))
                .collect(),
        }
    }

    /// Aggregated top-N document with a server-generated timestamp.
    pub fn market_depth(&self, levels: usize) -> MarketDepth {
        MarketDepth {
            timestamp: current_timestamp(),
            symbol: self.symbol.clone(),
            bids: self.depth(Side::Buy, levels),
            asks: self.depth(Side::Sell, levels),
        }
    }

    /// Full-book document, both sides in their entirety.
    pub fn snapshot(&self) -> BookSnapshot {
        BookSnapshot {
            symbol: self.symbol.clone(),
            bids: self.depth(Side::Buy, usize::MAX),
            asks: self.depth(Side::Sell, usize::MAX),
        }
    }

    /// Replaces the change notification sink.
    pub fn set_on_change<F>(&mut self, sink: F)
    where
        F: Fn() + Send + 'static,
    {
        self.on_change = Some(Box::new(sink));
    }

    /// Recomputes the cached best bid/ask from the level maps.
    pub(crate) fn update_bbo(&mut self) {
        self.best_bid = self
            .bids
            .keys()
            .next_back()
            .map(|p| p.into_inner())
            .unwrap_or(0.0);
        self.best_ask = self
            .asks
            .keys()
            .next()
            .map(|p| p.into_inner())
            .unwrap_or(0.0);
    }

    pub(crate) fn notify_change(&self) {
        if let Some(cb) = &self.on_change {
            cb();
        }
    }
}

fn level_quantity(queue: &Level) -> f64 {
    queue.iter().map(|o| o.quantity).sum()
}
