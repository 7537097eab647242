use order_book_engine::engine::Engine;
use order_book_engine::errors::EngineError;
use order_book_engine::instrument::Symbol;
use order_book_engine::orders::{OrderKind, OrderStatus, Side};
use order_book_engine::risk::RiskLimits;

fn engine() -> Engine {
    Engine::new(Symbol::default(), 0.01, RiskLimits::default())
}

#[test]
fn scenario_1_empty_book_limit_rests() {
    let mut e = engine();
    let (order1, fills) = e
        .submit("alice".into(), Side::Buy, OrderKind::Limit, Some(100.00), 10)
        .unwrap();
    assert!(fills.is_empty());
    assert_eq!(e.snapshot(1).best_bid, Some(100.00));
    let o1 = e.order(order1).unwrap();
    assert_eq!(o1.status, OrderStatus::Active);
    assert_eq!(o1.remaining_size, 10);
}

#[test]
fn scenario_2_cross_a_limit() {
    let mut e = engine();
    let (buyer_id, _) = e
        .submit("buyer".into(), Side::Buy, OrderKind::Limit, Some(100.00), 10)
        .unwrap();
    let (seller_id, fills) = e
        .submit("seller".into(), Side::Sell, OrderKind::Limit, Some(99.95), 3)
        .unwrap();

    assert_eq!(fills.len(), 2);
    assert!(fills.iter().all(|f| f.size == 3));
    let seller = e.order(seller_id).unwrap();
    assert_eq!(seller.status, OrderStatus::Filled);
    let buyer = e.order(buyer_id).unwrap();
    assert_eq!(buyer.status, OrderStatus::PartiallyFilled);
    assert_eq!(buyer.remaining_size, 7);
    assert_eq!(e.snapshot(1).best_bid, Some(100.00));
}

#[test]
fn scenario_3_market_sweep_with_residual() {
    let mut e = engine();
    e.submit("mm".into(), Side::Sell, OrderKind::Limit, Some(100.01), 5)
        .unwrap();
    e.submit("mm".into(), Side::Sell, OrderKind::Limit, Some(100.02), 4)
        .unwrap();

    let (taker_id, fills) = e
        .submit("taker".into(), Side::Buy, OrderKind::Market, None, 12)
        .unwrap();

    assert_eq!(fills.len(), 4);
    let taker = e.order(taker_id).unwrap();
    assert_eq!(taker.status, OrderStatus::PartiallyFilled);
    assert_eq!(taker.remaining_size, 3);
    assert_eq!(e.snapshot(1).best_ask, None);
    assert_eq!(e.book.last_trade_price, Some(e.book.quantize(100.02)));
}

#[test]
fn scenario_4_market_into_empty_opposite() {
    let mut e = engine();
    let (taker_id, fills) = e
        .submit("taker".into(), Side::Buy, OrderKind::Market, None, 5)
        .unwrap();
    assert!(fills.is_empty());
    assert_eq!(e.order(taker_id).unwrap().status, OrderStatus::Rejected);
    assert_eq!(e.snapshot(1).best_bid, None);
    assert_eq!(e.snapshot(1).best_ask, None);
}

#[test]
fn scenario_5_price_time_priority() {
    let mut e = engine();
    let (o1, _) = e
        .submit("o1".into(), Side::Buy, OrderKind::Limit, Some(100.00), 5)
        .unwrap();
    let (o2, _) = e
        .submit("o2".into(), Side::Buy, OrderKind::Limit, Some(100.00), 5)
        .unwrap();

    let (_, fills) = e
        .submit("taker".into(), Side::Sell, OrderKind::Market, None, 7)
        .unwrap();

    assert_eq!(fills.len(), 4);
    assert_eq!(e.order(o1).unwrap().status, OrderStatus::Filled);
    let order2 = e.order(o2).unwrap();
    assert_eq!(order2.status, OrderStatus::PartiallyFilled);
    assert_eq!(order2.remaining_size, 3);
}

#[test]
fn scenario_6_risk_rejection_precedes_book() {
    let mut e = Engine::new(
        Symbol::default(),
        0.01,
        RiskLimits {
            max_position: 10,
            ..RiskLimits::default()
        },
    );
    // Build the client's position up to 8 via fills against a resting seller,
    // without ever resting an order of our own on the book.
    e.submit("mm".into(), Side::Sell, OrderKind::Limit, Some(100.00), 8)
        .unwrap();
    e.submit("alice".into(), Side::Buy, OrderKind::Market, None, 8)
        .unwrap();

    let before = e.snapshot(5);
    let err = e
        .submit("alice".into(), Side::Buy, OrderKind::Limit, Some(100.00), 5)
        .unwrap_err();
    assert!(matches!(err, EngineError::PositionLimit(_)));

    let after = e.snapshot(5);
    assert_eq!(before.bids, after.bids);
    assert_eq!(before.asks, after.asks);
}
