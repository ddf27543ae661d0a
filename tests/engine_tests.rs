use std::sync::{Arc, Mutex};

use matching_engine::{
    engine::MatchingEngine,
    orders::{Order, OrderStatus, OrderType, Side},
    trade::Trade,
};

const SYMBOL: &str = "BTC-USDT";

fn order(id: &str, order_type: OrderType, side: Side, quantity: f64, price: f64) -> Order {
    Order::new(
        id,
        SYMBOL,
        order_type,
        side,
        quantity,
        price,
        "2025-06-14T10:00:00.000000Z",
    )
}

fn bbo(engine: &MatchingEngine, symbol: &str) -> (f64, f64) {
    engine.book(symbol).unwrap().lock().unwrap().bbo()
}

// --- LIMIT ORDER MATCHING ---

#[test]
fn limit_order_partial_fill_rests_remainder() {
    let engine = MatchingEngine::new();
    let mut sell = order("s1", OrderType::Limit, Side::Sell, 1.0, 50000.0);
    engine.process_order(&mut sell).unwrap();

    let mut buy = order("b1", OrderType::Limit, Side::Buy, 2.0, 50000.0);
    let trades = engine.process_order(&mut buy).unwrap();

    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].quantity, 1.0);
    assert_eq!(trades[0].price, 50000.0);
    assert_eq!(trades[0].aggressor_side, Side::Buy);
    assert_eq!(trades[0].maker_order_id, "s1");
    assert_eq!(trades[0].taker_order_id, "b1");
    assert_eq!(trades[0].timestamp, buy.timestamp);
    assert_eq!(trades[0].symbol, SYMBOL);

    assert_eq!(buy.status, OrderStatus::PartiallyFilled);
    assert_eq!(buy.quantity, 1.0);

    // the residual rests at the limit; the swept ask side is empty
    let book = engine.book(SYMBOL).unwrap();
    let book = book.lock().unwrap();
    assert_eq!(book.bbo(), (50000.0, 0.0));
    assert_eq!(book.depth(Side::Buy, 10), vec![(50000.0, 1.0)]);
    assert!(book.depth(Side::Sell, 10).is_empty());
}

#[test]
fn limit_order_without_cross_rests_untouched() {
    let engine = MatchingEngine::new();
    let mut sell = order("s1", OrderType::Limit, Side::Sell, 1.0, 50100.0);
    engine.process_order(&mut sell).unwrap();

    let mut buy = order("b1", OrderType::Limit, Side::Buy, 8.0, 50000.0);
    let trades = engine.process_order(&mut buy).unwrap();

    assert!(trades.is_empty());
    assert_eq!(buy.status, OrderStatus::New);
    assert_eq!(buy.quantity, 8.0);
    assert_eq!(bbo(&engine, SYMBOL), (50000.0, 50100.0));
}

// --- MARKET ORDER MATCHING ---

#[test]
fn market_order_walks_price_levels() {
    let engine = MatchingEngine::new();
    engine
        .process_order(&mut order("b1", OrderType::Limit, Side::Buy, 1.0, 50000.0))
        .unwrap();
    engine
        .process_order(&mut order("b2", OrderType::Limit, Side::Buy, 2.0, 49900.0))
        .unwrap();

    let mut sell = order("s1", OrderType::Market, Side::Sell, 2.5, 0.0);
    let trades = engine.process_order(&mut sell).unwrap();

    assert_eq!(trades.len(), 2);
    assert_eq!((trades[0].price, trades[0].quantity), (50000.0, 1.0));
    assert_eq!(trades[0].maker_order_id, "b1");
    assert_eq!((trades[1].price, trades[1].quantity), (49900.0, 1.5));
    assert_eq!(trades[1].maker_order_id, "b2");

    assert_eq!(sell.status, OrderStatus::Filled);
    assert_eq!(sell.quantity, 0.0);

    let book = engine.book(SYMBOL).unwrap();
    let book = book.lock().unwrap();
    assert_eq!(book.bbo().0, 49900.0);
    // the surviving maker is partially filled in place
    assert_eq!(book.depth(Side::Buy, 10), vec![(49900.0, 0.5)]);
}

#[test]
fn market_order_on_empty_book_stays_new() {
    let engine = MatchingEngine::new();
    let mut buy = order("b1", OrderType::Market, Side::Buy, 1.0, 0.0);
    let trades = engine.process_order(&mut buy).unwrap();

    assert!(trades.is_empty());
    assert_eq!(buy.status, OrderStatus::New);
    assert_eq!(buy.quantity, 1.0);
    assert_eq!(bbo(&engine, SYMBOL), (0.0, 0.0));
}

#[test]
fn market_order_partial_fill_reports_residual() {
    let engine = MatchingEngine::new();
    engine
        .process_order(&mut order("s1", OrderType::Limit, Side::Sell, 4.0, 50000.0))
        .unwrap();

    let mut buy = order("b1", OrderType::Market, Side::Buy, 10.0, 0.0);
    let trades = engine.process_order(&mut buy).unwrap();

    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].quantity, 4.0);
    assert_eq!(buy.status, OrderStatus::PartiallyFilled);
    assert_eq!(buy.quantity, 6.0);
    // market residuals never rest
    assert_eq!(bbo(&engine, SYMBOL), (0.0, 0.0));
}

// --- IOC ORDER MATCHING ---

#[test]
fn ioc_order_partial_fill_cancels_residual() {
    let engine = MatchingEngine::new();
    engine
        .process_order(&mut order("s1", OrderType::Limit, Side::Sell, 1.0, 50000.0))
        .unwrap();

    let mut buy = order("b1", OrderType::Ioc, Side::Buy, 2.0, 50000.0);
    let trades = engine.process_order(&mut buy).unwrap();

    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].quantity, 1.0);
    assert_eq!(buy.status, OrderStatus::PartiallyFilled);
    assert_eq!(buy.quantity, 1.0);

    // the residual is not on the book
    let book = engine.book(SYMBOL).unwrap();
    let book = book.lock().unwrap();
    assert!(book.depth(Side::Buy, 10).is_empty());
    assert_eq!(book.bbo(), (0.0, 0.0));
}

#[test]
fn ioc_order_with_no_fill_is_cancelled() {
    let engine = MatchingEngine::new();
    let mut buy = order("b1", OrderType::Ioc, Side::Buy, 2.0, 50000.0);
    let trades = engine.process_order(&mut buy).unwrap();

    assert!(trades.is_empty());
    assert_eq!(buy.status, OrderStatus::Cancelled);
    assert_eq!(buy.quantity, 2.0);
}

#[test]
fn ioc_order_respects_price_guard() {
    let engine = MatchingEngine::new();
    engine
        .process_order(&mut order("s1", OrderType::Limit, Side::Sell, 1.0, 50100.0))
        .unwrap();

    let mut buy = order("b1", OrderType::Ioc, Side::Buy, 1.0, 50000.0);
    let trades = engine.process_order(&mut buy).unwrap();

    assert!(trades.is_empty());
    assert_eq!(buy.status, OrderStatus::Cancelled);
    // the non-crossing ask is untouched
    assert_eq!(bbo(&engine, SYMBOL), (0.0, 50100.0));
}

// --- FOK ORDER MATCHING ---

#[test]
fn fok_order_infeasible_then_feasible() {
    let engine = MatchingEngine::new();
    engine
        .process_order(&mut order("s1", OrderType::Limit, Side::Sell, 1.0, 50000.0))
        .unwrap();

    // not enough liquidity at the limit: no trades, nothing consumed
    let mut buy = order("b1", OrderType::Fok, Side::Buy, 2.0, 50000.0);
    let trades = engine.process_order(&mut buy).unwrap();
    assert!(trades.is_empty());
    assert_eq!(buy.status, OrderStatus::Cancelled);
    assert_eq!(bbo(&engine, SYMBOL), (0.0, 50000.0));

    // exactly enough: fills in full
    let mut buy2 = order("b2", OrderType::Fok, Side::Buy, 1.0, 50000.0);
    let trades2 = engine.process_order(&mut buy2).unwrap();
    assert_eq!(trades2.len(), 1);
    assert_eq!(trades2[0].quantity, 1.0);
    assert_eq!(buy2.status, OrderStatus::Filled);
    assert_eq!(buy2.quantity, 0.0);
    assert_eq!(bbo(&engine, SYMBOL), (0.0, 0.0));
}

#[test]
fn fok_order_ignores_liquidity_beyond_its_limit() {
    let engine = MatchingEngine::new();
    engine
        .process_order(&mut order("s1", OrderType::Limit, Side::Sell, 1.0, 50000.0))
        .unwrap();
    engine
        .process_order(&mut order("s2", OrderType::Limit, Side::Sell, 5.0, 50100.0))
        .unwrap();

    // 6.0 rests in total, but only 1.0 is crossable at 50000
    let mut buy = order("b1", OrderType::Fok, Side::Buy, 2.0, 50000.0);
    let trades = engine.process_order(&mut buy).unwrap();
    assert!(trades.is_empty());
    assert_eq!(buy.status, OrderStatus::Cancelled);
    assert_eq!(bbo(&engine, SYMBOL), (0.0, 50000.0));
}

// --- PRICE-TIME PRIORITY ---

#[test]
fn makers_at_one_level_fill_in_fifo_order() {
    let engine = MatchingEngine::new();
    engine
        .process_order(&mut order("s1", OrderType::Limit, Side::Sell, 1.0, 50000.0))
        .unwrap();
    engine
        .process_order(&mut order("s2", OrderType::Limit, Side::Sell, 1.0, 50000.0))
        .unwrap();

    let mut buy = order("b1", OrderType::Limit, Side::Buy, 2.0, 50000.0);
    let trades = engine.process_order(&mut buy).unwrap();

    assert_eq!(trades.len(), 2);
    assert_eq!(trades[0].maker_order_id, "s1");
    assert_eq!(trades[1].maker_order_id, "s2");
    assert_eq!(buy.status, OrderStatus::Filled);
}

#[test]
fn better_priced_makers_fill_first() {
    let engine = MatchingEngine::new();
    engine
        .process_order(&mut order("s1", OrderType::Limit, Side::Sell, 1.0, 49900.0))
        .unwrap();
    engine
        .process_order(&mut order("s2", OrderType::Limit, Side::Sell, 1.0, 50000.0))
        .unwrap();

    // no trade-through: the buy executes at the better ask
    let mut buy = order("b1", OrderType::Limit, Side::Buy, 1.0, 50000.0);
    let trades = engine.process_order(&mut buy).unwrap();

    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].price, 49900.0);
    assert_eq!(trades[0].maker_order_id, "s1");
    assert_eq!(bbo(&engine, SYMBOL).1, 50000.0);
}

// --- INVARIANTS ---

#[test]
fn quantity_is_conserved_across_a_match() {
    let engine = MatchingEngine::new();
    engine
        .process_order(&mut order("s1", OrderType::Limit, Side::Sell, 1.0, 50000.0))
        .unwrap();
    engine
        .process_order(&mut order("s2", OrderType::Limit, Side::Sell, 2.0, 50100.0))
        .unwrap();

    let mut buy = order("b1", OrderType::Limit, Side::Buy, 2.5, 50100.0);
    let trades = engine.process_order(&mut buy).unwrap();

    let filled: f64 = trades.iter().map(|t| t.quantity).sum();
    assert_eq!(filled + buy.quantity, 2.5);
    assert_eq!(buy.status, OrderStatus::Filled);
}

#[test]
fn book_is_never_crossed_after_processing() {
    let engine = MatchingEngine::new();
    engine
        .process_order(&mut order("b1", OrderType::Limit, Side::Buy, 3.0, 49950.0))
        .unwrap();
    engine
        .process_order(&mut order("s1", OrderType::Limit, Side::Sell, 1.0, 50000.0))
        .unwrap();

    // a sell crossing through the bid leaves a one-sided residual, never a cross
    let mut sell = order("s2", OrderType::Limit, Side::Sell, 5.0, 49900.0);
    engine.process_order(&mut sell).unwrap();

    let (best_bid, best_ask) = bbo(&engine, SYMBOL);
    if best_bid != 0.0 && best_ask != 0.0 {
        assert!(best_bid < best_ask);
    }
    assert_eq!((best_bid, best_ask), (0.0, 49900.0));
}

#[test]
fn symbols_are_matched_independently() {
    let engine = MatchingEngine::new();
    let mut btc_sell = Order::new(
        "s1",
        "BTC-USDT",
        OrderType::Limit,
        Side::Sell,
        1.0,
        50000.0,
        "t0",
    );
    engine.process_order(&mut btc_sell).unwrap();

    let mut eth_buy = Order::new(
        "b1",
        "ETH-USDT",
        OrderType::Limit,
        Side::Buy,
        1.0,
        60000.0,
        "t1",
    );
    let trades = engine.process_order(&mut eth_buy).unwrap();

    assert!(trades.is_empty());
    assert_eq!(eth_buy.status, OrderStatus::New);
    assert_eq!(bbo(&engine, "BTC-USDT"), (0.0, 50000.0));
    assert_eq!(bbo(&engine, "ETH-USDT"), (60000.0, 0.0));
}

// --- CALLBACKS ---

#[test]
fn trade_callback_sees_trades_in_emission_order() {
    let engine = MatchingEngine::new();
    let seen: Arc<Mutex<Vec<Trade>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    engine.set_on_trade(move |trade: &Trade| {
        sink.lock().unwrap().push(trade.clone());
    });

    engine
        .process_order(&mut order("s1", OrderType::Limit, Side::Sell, 1.0, 49900.0))
        .unwrap();
    engine
        .process_order(&mut order("s2", OrderType::Limit, Side::Sell, 1.0, 50000.0))
        .unwrap();

    let mut buy = order("b1", OrderType::Market, Side::Buy, 2.0, 0.0);
    let trades = engine.process_order(&mut buy).unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(trades, *seen);
    assert_eq!(seen[0].price, 49900.0);
    assert_eq!(seen[1].price, 50000.0);
}

#[test]
fn book_change_callback_fires_for_mutating_symbol() {
    let engine = MatchingEngine::new();
    let changed: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = changed.clone();
    engine.set_on_book_change(move |symbol: &str| {
        sink.lock().unwrap().push(symbol.to_string());
    });

    engine
        .process_order(&mut order("b1", OrderType::Limit, Side::Buy, 1.0, 50000.0))
        .unwrap();
    let mut eth = Order::new(
        "b2",
        "ETH-USDT",
        OrderType::Limit,
        Side::Buy,
        1.0,
        3000.0,
        "t0",
    );
    engine.process_order(&mut eth).unwrap();

    let changed = changed.lock().unwrap();
    assert_eq!(*changed, vec!["BTC-USDT".to_string(), "ETH-USDT".to_string()]);
}
