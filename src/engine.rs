//! Single-writer engine (spec component D's core): owns the book, the risk
//! gate, the fill log, and the id/sequence counters behind one
//! `tokio::sync::Mutex`. Every `submit`/`cancel` call runs to completion
//! with no `.await` inside the critical section — generalizes the teacher's
//! `AppState` (which held only an `OrderBook` and a flat `Vec<Trade>` behind
//! a plain `Mutex`, with no risk gate or per-client bookkeeping).
use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use tokio::sync::{Mutex, broadcast, mpsc};

use crate::errors::EngineError;
use crate::fill::Fill;
use crate::instrument::Symbol;
use crate::matching;
use crate::orderbook::{BookSnapshot, OrderBook};
use crate::orders::{Order, OrderKind, OrderStatus, Side};
use crate::risk::{ClientRiskState, RiskGate, RiskLimits};
use crate::utils::Clock;

/// Reserved client id used by the in-process market-data producer
/// (`marketdata::run`) so its synthetic orders are distinguishable in the
/// fill log. Orders under this id go straight to the book through
/// [`Engine::submit_direct`], skipping the risk gate entirely.
pub const MARKET_CLIENT_ID: &str = "MARKET";

/// Depth of the per-client fill channel. A slow or vanished subscriber is
/// dropped from, not allowed to block, the writer.
const FILL_CHANNEL_CAPACITY: usize = 256;

/// Number of historical fills replayed to a fill subscriber on connect.
const FILL_REPLAY_COUNT: usize = 10;

/// Everything the single writer owns. Lives behind a `Mutex<Engine>`; no
/// field here is independently lockable, which is what makes `submit`
/// atomic with respect to every other call.
pub struct Engine {
    pub symbol: Symbol,
    pub book: OrderBook,
    risk: RiskGate,
    fills: Vec<Fill>,
    clock: Clock,
    next_arrival_seq: u64,
    fill_subscribers: HashMap<String, mpsc::Sender<Fill>>,
}

impl Engine {
    pub fn new(symbol: Symbol, tick_size: f64, risk_limits: RiskLimits) -> Self {
        Self {
            symbol,
            book: OrderBook::new(tick_size),
            risk: RiskGate::new(risk_limits),
            fills: Vec::new(),
            clock: Clock::new(),
            next_arrival_seq: 0,
            fill_subscribers: HashMap::new(),
        }
    }

    fn mint_order_id() -> u64 {
        rand::rng().random::<u64>()
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.next_arrival_seq;
        self.next_arrival_seq += 1;
        seq
    }

    fn now_second(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    /// Rejects a request whose `kind` and `price` disagree before anything
    /// is minted: a limit order with no price, or a market order carrying
    /// one, can only be a malformed request and never a matching-engine bug.
    fn validate_kind_and_price(kind: OrderKind, price: Option<f64>) -> Result<(), EngineError> {
        match (kind, price) {
            (OrderKind::Limit, None) => Err(EngineError::BadRequest(
                "limit order requires a price".into(),
            )),
            (OrderKind::Market, Some(_)) => Err(EngineError::BadRequest(
                "market order must not carry a price".into(),
            )),
            _ => Ok(()),
        }
    }

    fn build_order(
        &mut self,
        client_id: String,
        side: Side,
        kind: OrderKind,
        limit_price_ticks: Option<u64>,
        size: u64,
    ) -> Order {
        Order {
            order_id: Self::mint_order_id(),
            client_id,
            side,
            kind,
            limit_price: limit_price_ticks,
            original_size: size,
            remaining_size: size,
            arrival_seq: self.next_seq(),
            timestamp: self.clock.now(),
            status: OrderStatus::Pending,
        }
    }

    fn run_matching(&mut self, order: Order) -> (u64, Vec<Fill>) {
        let order_id = order.order_id;
        let fills = matching::submit(&mut self.book, order, &mut self.clock);

        for fill in &fills {
            self.risk.on_fill(&fill.client_id, fill.side, fill.size);
            self.publish_fill(fill);
        }
        self.fills.extend(fills.iter().cloned());

        (order_id, fills)
    }

    /// Validates the request, runs the risk gate, then the matching engine,
    /// recording and publishing any resulting fills. Returns the admitted
    /// order's id and the fills it produced. Rejections never touch the book.
    pub fn submit(
        &mut self,
        client_id: String,
        side: Side,
        kind: OrderKind,
        limit_price_dollars: Option<f64>,
        size: u64,
    ) -> Result<(u64, Vec<Fill>), EngineError> {
        Self::validate_kind_and_price(kind, limit_price_dollars)?;
        let limit_price_ticks = limit_price_dollars.map(|p| self.book.quantize(p));
        let mid = self.book.mid();

        self.risk.check(
            &client_id,
            side,
            size,
            limit_price_dollars,
            mid,
            self.now_second(),
        )?;

        let order = self.build_order(client_id, side, kind, limit_price_ticks, size);
        Ok(self.run_matching(order))
    }

    /// Admits an order for the reserved market-data client straight into
    /// matching, skipping the risk gate entirely. The market-data producer
    /// is the only caller; a real client's order always goes through
    /// [`Engine::submit`].
    pub fn submit_direct(
        &mut self,
        client_id: String,
        side: Side,
        kind: OrderKind,
        limit_price_dollars: Option<f64>,
        size: u64,
    ) -> Result<(u64, Vec<Fill>), EngineError> {
        Self::validate_kind_and_price(kind, limit_price_dollars)?;
        let limit_price_ticks = limit_price_dollars.map(|p| self.book.quantize(p));

        let order = self.build_order(client_id, side, kind, limit_price_ticks, size);
        Ok(self.run_matching(order))
    }

    pub fn cancel(&mut self, order_id: u64) -> Result<(), EngineError> {
        matching_cancel(&mut self.book, order_id)
    }

    pub fn order(&self, order_id: u64) -> Option<Order> {
        self.book.orders.get(&order_id).cloned()
    }

    pub fn fills_for(&self, client_id: &str) -> Vec<Fill> {
        self.fills
            .iter()
            .filter(|f| f.client_id == client_id)
            .cloned()
            .collect()
    }

    pub fn risk_state(&self, client_id: &str) -> ClientRiskState {
        self.risk.state_of(client_id)
    }

    pub fn snapshot(&self, n_levels: usize) -> BookSnapshot {
        self.book.snapshot(n_levels)
    }

    /// Registers a bounded per-client fill channel, replacing any prior one
    /// for the same client, and seeds it with the last [`FILL_REPLAY_COUNT`]
    /// fills already generated for that client so a subscriber that connects
    /// late still sees recent history before new fills arrive. The writer
    /// never blocks on a full channel: the fill is dropped for that
    /// subscriber rather than stalling `submit`.
    pub fn subscribe_fills(&mut self, client_id: String) -> mpsc::Receiver<Fill> {
        let (tx, rx) = mpsc::channel(FILL_CHANNEL_CAPACITY);
        let history = self.fills_for(&client_id);
        let replay_start = history.len().saturating_sub(FILL_REPLAY_COUNT);
        for fill in &history[replay_start..] {
            let _ = tx.try_send(fill.clone());
        }
        self.fill_subscribers.insert(client_id, tx);
        rx
    }

    fn publish_fill(&mut self, fill: &Fill) {
        if let Some(tx) = self.fill_subscribers.get(&fill.client_id) {
            if tx.try_send(fill.clone()).is_err() {
                self.fill_subscribers.remove(&fill.client_id);
            }
        }
    }
}

/// `Order::remaining_size`/`status` plus the book's FIFO must be kept in
/// lockstep; cancellation lives next to `submit` rather than on `OrderBook`
/// itself since only the engine knows the order's current side/price.
fn matching_cancel(book: &mut OrderBook, order_id: u64) -> Result<(), EngineError> {
    let Some(existing) = book.orders.get(&order_id) else {
        return Err(EngineError::NotFound(format!(
            "order {order_id} not found"
        )));
    };
    if existing.status.is_terminal() {
        return Err(EngineError::NotCancelable(format!(
            "order {order_id} is already {:?}",
            existing.status
        )));
    }
    let side = existing.side;
    let price = existing
        .limit_price
        .expect("resting order must carry a limit price");
    let removed = book.remove_resting(order_id, side, price);
    if !removed {
        panic!("order {order_id} is active in the index but missing from its book side");
    }
    book.orders.get_mut(&order_id).unwrap().status = OrderStatus::Canceled;
    Ok(())
}

/// Shared, lockable handle to the engine plus the market-data broadcast
/// channel every WS snapshot subscriber taps into.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Mutex<Engine>>,
    pub snapshot_tx: broadcast::Sender<BookSnapshot>,
}

impl AppState {
    pub fn new(symbol: Symbol, tick_size: f64, risk_limits: RiskLimits) -> Self {
        let (snapshot_tx, _) = broadcast::channel(64);
        Self {
            engine: Arc::new(Mutex::new(Engine::new(symbol, tick_size, risk_limits))),
            snapshot_tx,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_rejects_oversized_order_before_touching_the_book() {
        let mut engine = Engine::new(
            Symbol::default(),
            1.0,
            RiskLimits {
                max_order_size: 5,
                ..RiskLimits::default()
            },
        );
        let err = engine
            .submit("alice".into(), Side::Buy, OrderKind::Limit, Some(100.0), 10)
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::SizeLimit("order size 10 exceeds limit 5".into())
        );
        assert!(engine.book.orders.is_empty());
    }

    #[test]
    fn submit_rejects_limit_order_with_no_price() {
        let mut engine = Engine::new(Symbol::default(), 1.0, RiskLimits::default());
        let err = engine
            .submit("alice".into(), Side::Buy, OrderKind::Limit, None, 1)
            .unwrap_err();
        assert!(matches!(err, EngineError::BadRequest(_)));
        assert!(engine.book.orders.is_empty());
    }

    #[test]
    fn submit_rejects_market_order_with_a_price() {
        let mut engine = Engine::new(Symbol::default(), 1.0, RiskLimits::default());
        let err = engine
            .submit("alice".into(), Side::Buy, OrderKind::Market, Some(100.0), 1)
            .unwrap_err();
        assert!(matches!(err, EngineError::BadRequest(_)));
        assert!(engine.book.orders.is_empty());
    }

    #[test]
    fn submit_direct_bypasses_the_risk_gate() {
        let mut engine = Engine::new(
            Symbol::default(),
            1.0,
            RiskLimits {
                max_order_size: 1,
                ..RiskLimits::default()
            },
        );
        // would be rejected by submit() for exceeding max_order_size
        let (order_id, fills) = engine
            .submit_direct(MARKET_CLIENT_ID.into(), Side::Buy, OrderKind::Limit, Some(100.0), 50)
            .unwrap();
        assert!(fills.is_empty());
        assert_eq!(engine.order(order_id).unwrap().remaining_size, 50);
    }

    #[test]
    fn submit_direct_still_validates_kind_and_price() {
        let mut engine = Engine::new(Symbol::default(), 1.0, RiskLimits::default());
        let err = engine
            .submit_direct(MARKET_CLIENT_ID.into(), Side::Buy, OrderKind::Limit, None, 1)
            .unwrap_err();
        assert!(matches!(err, EngineError::BadRequest(_)));
    }

    #[test]
    fn submit_mints_distinct_ids_and_increasing_arrival_seq() {
        let mut engine = Engine::new(Symbol::default(), 1.0, RiskLimits::default());
        let (id1, _) = engine
            .submit("alice".into(), Side::Buy, OrderKind::Limit, Some(100.0), 1)
            .unwrap();
        let (id2, _) = engine
            .submit("alice".into(), Side::Buy, OrderKind::Limit, Some(100.0), 1)
            .unwrap();
        assert_ne!(id1, id2);
        let o1 = engine.order(id1).unwrap();
        let o2 = engine.order(id2).unwrap();
        assert!(o2.arrival_seq > o1.arrival_seq);
    }

    #[test]
    fn cancel_unknown_order_is_not_found() {
        let mut engine = Engine::new(Symbol::default(), 1.0, RiskLimits::default());
        assert_eq!(
            engine.cancel(42).unwrap_err(),
            EngineError::NotFound("order 42 not found".into())
        );
    }

    #[test]
    fn cancel_after_fill_is_not_cancelable() {
        let mut engine = Engine::new(Symbol::default(), 1.0, RiskLimits::default());
        let (maker_id, _) = engine
            .submit("maker".into(), Side::Buy, OrderKind::Limit, Some(100.0), 5)
            .unwrap();
        engine
            .submit("taker".into(), Side::Sell, OrderKind::Limit, Some(100.0), 5)
            .unwrap();
        assert!(engine.order(maker_id).unwrap().status == OrderStatus::Filled);
        assert!(matches!(
            engine.cancel(maker_id).unwrap_err(),
            EngineError::NotCancelable(_)
        ));
    }

    #[test]
    fn fills_for_filters_by_client() {
        let mut engine = Engine::new(Symbol::default(), 1.0, RiskLimits::default());
        engine
            .submit("maker".into(), Side::Buy, OrderKind::Limit, Some(100.0), 5)
            .unwrap();
        engine
            .submit("taker".into(), Side::Sell, OrderKind::Limit, Some(100.0), 5)
            .unwrap();
        assert_eq!(engine.fills_for("maker").len(), 1);
        assert_eq!(engine.fills_for("taker").len(), 1);
        assert!(engine.fills_for("nobody").is_empty());
    }

    #[test]
    fn subscribe_fills_replays_recent_history_before_new_fills() {
        let mut engine = Engine::new(Symbol::default(), 1.0, RiskLimits::default());
        engine
            .submit("maker".into(), Side::Sell, OrderKind::Limit, Some(100.0), 1)
            .unwrap();
        // generate 3 historical fills for "taker" before it ever subscribes
        for _ in 0..3 {
            engine
                .submit("maker".into(), Side::Sell, OrderKind::Limit, Some(100.0), 1)
                .unwrap();
            engine
                .submit("taker".into(), Side::Buy, OrderKind::Market, None, 1)
                .unwrap();
        }

        let mut rx = engine.subscribe_fills("taker".into());
        for _ in 0..3 {
            let replayed = rx.try_recv().expect("replayed fill");
            assert_eq!(replayed.client_id, "taker");
        }
        assert!(rx.try_recv().is_err(), "only history should be queued so far");

        engine
            .submit("maker".into(), Side::Sell, OrderKind::Limit, Some(100.0), 1)
            .unwrap();
        engine
            .submit("taker".into(), Side::Buy, OrderKind::Market, None, 1)
            .unwrap();
        let fresh = rx.try_recv().expect("new fill delivered after subscribing");
        assert_eq!(fresh.client_id, "taker");
    }
}
