//! Book state (spec component A): ordered price levels per side, a per-level
//! FIFO of resting orders, an order index, and the last-trade cache.
use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    time::SystemTime,
};

use serde::{Deserialize, Serialize};

use crate::orders::{Order, Side};

/// A queue entry: a stable order id plus its cached residual size.
///
/// Kept separate from the full [`Order`] record so the FIFO can be walked
/// and mutated without touching the order index on every step; `matching`
/// keeps the two in lockstep.
#[derive(Debug, Clone, Copy)]
pub struct RestingEntry {
    pub order_id: u64,
    pub remaining_size: u64,
}

/// `(price_ticks, total_size)` for one aggregated depth level.
pub type DepthLevel = (u64, u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub bids: Vec<(f64, u64)>,
    pub asks: Vec<(f64, u64)>,
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
    pub mid: Option<f64>,
    pub spread: Option<f64>,
    pub timestamp: SystemTime,
}

/// Two price-indexed FIFOs (bids/asks), the order index, tick quantization,
/// and the last-trade cache.
pub struct OrderBook {
    pub tick_size: f64,
    /// Buy orders, keyed by price-in-ticks ascending; best bid is the last key.
    pub bids: BTreeMap<u64, VecDeque<RestingEntry>>,
    /// Sell orders, keyed by price-in-ticks ascending; best ask is the first key.
    pub asks: BTreeMap<u64, VecDeque<RestingEntry>>,
    /// Full order records, keyed by `order_id` — the canonical order index.
    pub orders: HashMap<u64, Order>,
    pub last_trade_price: Option<u64>,
    pub last_trade_size: u64,
}

impl OrderBook {
    pub fn new(tick_size: f64) -> Self {
        Self {
            tick_size,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            orders: HashMap::new(),
            last_trade_price: None,
            last_trade_size: 0,
        }
    }

    /// Half-up rounding to the nearest tick. Callers never see an
    /// unquantized price once an order is admitted.
    pub fn quantize(&self, price: f64) -> u64 {
        (price / self.tick_size).round() as u64
    }

    pub fn to_price(&self, ticks: u64) -> f64 {
        ticks as f64 * self.tick_size
    }

    fn side_book(&self, side: Side) -> &BTreeMap<u64, VecDeque<RestingEntry>> {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    fn side_book_mut(&mut self, side: Side) -> &mut BTreeMap<u64, VecDeque<RestingEntry>> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    pub fn best_bid(&self) -> Option<u64> {
        self.bids.keys().next_back().copied()
    }

    pub fn best_ask(&self) -> Option<u64> {
        self.asks.keys().next().copied()
    }

    /// Average of the bests; falls back to the last trade price; else `None`.
    pub fn mid(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bb), Some(ba)) => Some((self.to_price(bb) + self.to_price(ba)) / 2.0),
            _ => self.last_trade_price.map(|p| self.to_price(p)),
        }
    }

    pub fn spread(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bb), Some(ba)) => Some(self.to_price(ba) - self.to_price(bb)),
            _ => None,
        }
    }

    /// Aggregated `(price, total_size)` in priority order, best level first.
    pub fn depth(&self, side: Side, n_levels: usize) -> Vec<DepthLevel> {
        let book = self.side_book(side);
        let levels: Box<dyn Iterator<Item = (&u64, &VecDeque<RestingEntry>)>> = match side {
            Side::Buy => Box::new(book.iter().rev()),
            Side::Sell => Box::new(book.iter()),
        };
        levels
            .take(n_levels)
            .map(|(price, queue)| (*price, queue.iter().map(|e| e.remaining_size).sum()))
            .collect()
    }

    pub fn snapshot(&self, n_levels: usize) -> BookSnapshot {
        let to_dollars = |(ticks, size): DepthLevel| (self.to_price(ticks), size);
        BookSnapshot {
            bids: self
                .depth(Side::Buy, n_levels)
                .into_iter()
                .map(to_dollars)
                .collect(),
            asks: self
                .depth(Side::Sell, n_levels)
                .into_iter()
                .map(to_dollars)
                .collect(),
            best_bid: self.best_bid().map(|p| self.to_price(p)),
            best_ask: self.best_ask().map(|p| self.to_price(p)),
            mid: self.mid(),
            spread: self.spread(),
            timestamp: SystemTime::now(),
        }
    }

    /// Appends a resting order to the tail of its own-side FIFO at its limit
    /// price. Caller (matching) must have already run any crossing fills.
    pub fn rest(&mut self, order_id: u64, side: Side, price_ticks: u64, remaining_size: u64) {
        self.side_book_mut(side)
            .entry(price_ticks)
            .or_default()
            .push_back(RestingEntry {
                order_id,
                remaining_size,
            });
    }

    /// Removes an empty level if one exists at `price_ticks`. Matching calls
    /// this whenever it pops the last entry out of a level's FIFO, upholding
    /// book invariant 1 (no price level exists with an empty FIFO).
    pub fn prune_if_empty(&mut self, side: Side, price_ticks: u64) {
        let book = self.side_book_mut(side);
        if book.get(&price_ticks).is_some_and(|q| q.is_empty()) {
            book.remove(&price_ticks);
        }
    }

    /// Removes a still-resting order from its queue and the index, returning
    /// whether it was found. Used by `cancel`; linear in the level's depth
    /// since cancellation by id is not a bests-only operation.
    pub fn remove_resting(&mut self, order_id: u64, side: Side, price_ticks: u64) -> bool {
        let book = self.side_book_mut(side);
        let Some(queue) = book.get_mut(&price_ticks) else {
            return false;
        };
        let Some(pos) = queue.iter().position(|e| e.order_id == order_id) else {
            return false;
        };
        queue.remove(pos);
        self.prune_if_empty(side, price_ticks);
        true
    }

    pub fn record_trade(&mut self, price_ticks: u64, size: u64) {
        self.last_trade_price = Some(price_ticks);
        self.last_trade_size = size;
    }
}
