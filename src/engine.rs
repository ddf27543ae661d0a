use std::sync::{
    Arc, Mutex, RwLock,
    atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;
use ordered_float::OrderedFloat;
use tracing::debug;

use crate::{
    errors::EngineError,
    orderbook::{Level, OrderBook},
    orders::{Order, OrderStatus, OrderType, Side},
    trade::Trade,
};

/// Callback invoked for every trade, in emission order, while the matched
/// book's lock is held. Must not block or re-enter the engine for the same
/// symbol.
pub type TradeSink = Box<dyn Fn(&Trade) + Send + Sync>;

/// Callback invoked with the symbol of any book that mutated. Same
/// discipline as [`TradeSink`]: it runs under the book lock.
pub type BookChangeSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Internal enum to unify forward (`IterMut`) and reverse (`Rev<IterMut>`)
/// iteration over one side's price levels.
///
/// - [`SideIter::Asc`] walks asks from the lowest price up.
/// - [`SideIter::Desc`] walks bids from the highest price down.
enum SideIter<'a> {
    Asc(std::collections::btree_map::IterMut<'a, OrderedFloat<f64>, Level>),
    Desc(std::iter::Rev<std::collections::btree_map::IterMut<'a, OrderedFloat<f64>, Level>>),
}

impl<'a> Iterator for SideIter<'a> {
    type Item = (&'a OrderedFloat<f64>, &'a mut Level);

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            SideIter::Asc(iter) => iter.next(),
            SideIter::Desc(iter) => iter.next(),
        }
    }
}

/// Opposite-side quantity resting at prices that satisfy the limit guard,
/// summed only until it reaches `needed`. Non-destructive; used for the
/// fill-or-kill feasibility check before any mutation.
fn available_within_limit(book: &OrderBook, side: Side, limit: f64, needed: f64) -> f64 {
    let mut available = 0.0;
    match side {
        Side::Buy => {
            for (price, queue) in book.asks.iter() {
                if price.into_inner() > limit {
                    break;
                }
                for order in queue {
                    available += order.quantity;
                    if available >= needed {
                        return available;
                    }
                }
            }
        }
        Side::Sell => {
            for (price, queue) in book.bids.iter().rev() {
                if price.into_inner() < limit {
                    break;
                }
                for order in queue {
                    available += order.quantity;
                    if available >= needed {
                        return available;
                    }
                }
            }
        }
    }
    available
}

/// The multi-symbol matching core.
///
/// Holds one [`OrderBook`] per symbol, created lazily on the first order for
/// that symbol. Books live behind `Arc<Mutex<_>>`: the mutex is the per-book
/// lock that serializes matching and market-data reads for one symbol, while
/// the [`DashMap`] lets producers for different symbols proceed in parallel
/// (and makes the lookup-or-create step atomic).
pub struct MatchingEngine {
    books: DashMap<String, Arc<Mutex<OrderBook>>>,
    on_trade: RwLock<Option<TradeSink>>,
    on_book_change: Arc<RwLock<Option<BookChangeSink>>>,
    trade_seq: AtomicU64,
}

impl MatchingEngine {
    pub fn new() -> Self {
        Self {
            books: DashMap::new(),
            on_trade: RwLock::new(None),
            on_book_change: Arc::new(RwLock::new(None)),
            trade_seq: AtomicU64::new(1),
        }
    }

    /// Read accessor for market-data consumers. Never creates a book: only
    /// order flow materializes one.
    pub fn book(&self, symbol: &str) -> Option<Arc<Mutex<OrderBook>>> {
        self.books.get(symbol).map(|entry| entry.value().clone())
    }

    /// Registers the trade callback. It fires synchronously during
    /// [`MatchingEngine::process_order`], once per trade, in emission order.
    pub fn set_on_trade<F>(&self, sink: F)
    where
        F: Fn(&Trade) + Send + Sync + 'static,
    {
        *self.on_trade.write().unwrap_or_else(|e| e.into_inner()) = Some(Box::new(sink));
    }

    /// Registers the book-change callback, shared by every book the engine
    /// owns, existing and future.
    pub fn set_on_book_change<F>(&self, sink: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *self.on_book_change.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(sink));
    }

    /// Matches `order` against the book for its symbol and returns the
    /// resulting trades in execution order.
    ///
    /// The order is rewritten in place: `status` follows the state machine
    /// for its type, and `quantity` becomes the remaining open quantity
    /// (zero when filled). A limit residual is cloned into the book; market,
    /// IOC and FOK residuals never rest.
    pub fn process_order(&self, order: &mut Order) -> Result<Vec<Trade>, EngineError> {
        debug!(
            order_id = %order.order_id,
            symbol = %order.symbol,
            order_type = ?order.order_type,
            side = %order.side,
            quantity = order.quantity,
            price = order.price,
            "processing order"
        );
        let handle = self.book_or_create(&order.symbol);
        let mut book = handle
            .lock()
            .map_err(|_| EngineError::BookLockPoisoned(order.symbol.clone()))?;

        let trades = match order.order_type {
            OrderType::Market => self.match_market(order, &mut book),
            OrderType::Limit => self.match_limit(order, &mut book),
            OrderType::Ioc => self.match_ioc(order, &mut book),
            OrderType::Fok => self.match_fok(order, &mut book),
        };

        // callbacks see trades in emission order, still under the book lock
        for trade in &trades {
            self.notify_trade(trade);
        }
        Ok(trades)
    }

    fn book_or_create(&self, symbol: &str) -> Arc<Mutex<OrderBook>> {
        self.books
            .entry(symbol.to_string())
            .or_insert_with(|| {
                debug!(symbol, "creating order book");
                let mut book = OrderBook::new(symbol);
                let sink = Arc::clone(&self.on_book_change);
                let sym = symbol.to_string();
                book.set_on_change(move || {
                    if let Ok(slot) = sink.read() {
                        if let Some(cb) = slot.as_ref() {
                            cb(&sym);
                        }
                    }
                });
                Arc::new(Mutex::new(book))
            })
            .clone()
    }

    fn notify_trade(&self, trade: &Trade) {
        if let Ok(slot) = self.on_trade.read() {
            if let Some(cb) = slot.as_ref() {
                cb(trade);
            }
        }
    }

    fn next_trade_id(&self) -> String {
        self.trade_seq.fetch_add(1, Ordering::Relaxed).to_string()
    }

    /// Consumes liquidity from the side opposite `incoming`, best price
    /// first and FIFO within a level, emitting one trade per fill at the
    /// maker's price.
    ///
    /// `price_limit` is the crossing guard: a buy stops at the first ask
    /// above it, a sell at the first bid below it; `None` walks the whole
    /// side (market orders). Fully consumed makers are popped and marked
    /// FILLED, partially consumed ones marked PARTIALLY_FILLED in place,
    /// and drained levels are pruned. When anything traded, the BBO cache
    /// is recomputed and the change sink fired.
    fn sweep(
        &self,
        incoming: &Order,
        remaining: &mut f64,
        book: &mut OrderBook,
        price_limit: Option<f64>,
    ) -> Vec<Trade> {
        let mut trades = Vec::new();
        let mut drained = Vec::new();

        let iter = match incoming.side {
            Side::Buy => SideIter::Asc(book.asks.iter_mut()),
            Side::Sell => SideIter::Desc(book.bids.iter_mut().rev()),
        };

        'levels: for (&price, queue) in iter {
            if let Some(limit) = price_limit {
                let crosses = match incoming.side {
                    Side::Buy => price.into_inner() <= limit,
                    Side::Sell => price.into_inner() >= limit,
                };
                if !crosses {
                    break 'levels;
                }
            }
            while *remaining > 0.0 {
                let Some(maker) = queue.front_mut() else {
                    break;
                };
                let fill = remaining.min(maker.quantity);
                trades.push(Trade {
                    trade_id: self.next_trade_id(),
                    timestamp: incoming.timestamp.clone(),
                    symbol: incoming.symbol.clone(),
                    price: maker.price,
                    quantity: fill,
                    aggressor_side: incoming.side,
                    maker_order_id: maker.order_id.clone(),
                    taker_order_id: incoming.order_id.clone(),
                });
                *remaining -= fill;
                maker.quantity -= fill;
                if maker.quantity == 0.0 {
                    maker.status = OrderStatus::Filled;
                    queue.pop_front();
                } else {
                    maker.status = OrderStatus::PartiallyFilled;
                }
            }
            if queue.is_empty() {
                drained.push(price);
            }
            if *remaining == 0.0 {
                break 'levels;
            }
        }

        let side = match incoming.side {
            Side::Buy => &mut book.asks,
            Side::Sell => &mut book.bids,
        };
        for price in drained {
            side.remove(&price);
        }

        if !trades.is_empty() {
            book.update_bbo();
            book.notify_change();
        }
        trades
    }

    /// Market orders ignore price and drain the opposite side until filled
    /// or the side is empty. A residual is never booked: untouched orders
    /// stay NEW, partially filled ones PARTIALLY_FILLED.
    fn match_market(&self, order: &mut Order, book: &mut OrderBook) -> Vec<Trade> {
        let mut remaining = order.quantity;
        let trades = self.sweep(order, &mut remaining, book, None);
        if remaining == 0.0 {
            order.status = OrderStatus::Filled;
        } else if remaining < order.quantity {
            order.status = OrderStatus::PartiallyFilled;
        }
        order.quantity = remaining;
        trades
    }

    /// Limit orders match up to their limit price, then rest any remainder
    /// on their own side at that price.
    fn match_limit(&self, order: &mut Order, book: &mut OrderBook) -> Vec<Trade> {
        let mut remaining = order.quantity;
        let trades = self.sweep(order, &mut remaining, book, Some(order.price));
        if remaining > 0.0 {
            order.status = if trades.is_empty() {
                OrderStatus::New
            } else {
                OrderStatus::PartiallyFilled
            };
            order.quantity = remaining;
            debug!(order_id = %order.order_id, remaining, "resting limit residual");
            book.add(order.clone());
        } else {
            order.status = OrderStatus::Filled;
            order.quantity = 0.0;
        }
        trades
    }

    /// Immediate-or-cancel: same crossing guard as a limit order, but the
    /// residual is cancelled instead of rested.
    fn match_ioc(&self, order: &mut Order, book: &mut OrderBook) -> Vec<Trade> {
        let mut remaining = order.quantity;
        let trades = self.sweep(order, &mut remaining, book, Some(order.price));
        if remaining == 0.0 {
            order.status = OrderStatus::Filled;
        } else if remaining < order.quantity {
            order.status = OrderStatus::PartiallyFilled;
        } else {
            order.status = OrderStatus::Cancelled;
        }
        order.quantity = remaining;
        trades
    }

    /// Fill-or-kill: a feasibility pass sums crossable liquidity before any
    /// mutation; short books cancel the order with zero trades, otherwise
    /// it executes in full like a limit order that never rests.
    fn match_fok(&self, order: &mut Order, book: &mut OrderBook) -> Vec<Trade> {
        let available = available_within_limit(book, order.side, order.price, order.quantity);
        if available < order.quantity {
            debug!(
                order_id = %order.order_id,
                available,
                wanted = order.quantity,
                "cancelling infeasible fill-or-kill order"
            );
            order.status = OrderStatus::Cancelled;
            return Vec::new();
        }
        let mut remaining = order.quantity;
        let trades = self.sweep(order, &mut remaining, book, Some(order.price));
        order.status = OrderStatus::Filled;
        order.quantity = remaining;
        trades
    }
}

impl Default for MatchingEngine {
    fn default() -> Self {
        Self::new()
    }
}
