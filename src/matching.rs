//! Matching engine: `submit` walks the opposite side in strict price-time
//! priority, emits taker-then-maker fill pairs, and rests any limit-order
//! residual.
use std::collections::{BTreeMap, HashMap, VecDeque};

use uuid::Uuid;

use crate::{
    fill::Fill,
    orderbook::{OrderBook, RestingEntry},
    orders::{Order, OrderKind, OrderStatus, Side},
    utils::Clock,
};

/// Walks one side of the book against `taker`, matching head-of-FIFO first
/// at each level, stopping when `taker` is exhausted, the level stops
/// crossing, or the side runs out of levels. Returns fills as taker-then-maker
/// pairs, always even in length.
///
/// Returns the fills (with `price` already converted to dollars via
/// `tick_size`) plus the last `(price_ticks, size)` matched, if any, for the
/// caller to update the book's tick-denominated last-trade cache.
fn walk_and_match(
    taker: &mut Order,
    book_side: &mut BTreeMap<u64, VecDeque<RestingEntry>>,
    orders: &mut HashMap<u64, Order>,
    reversed: bool,
    crosses: impl Fn(u64) -> bool,
    tick_size: f64,
    clock: &mut Clock,
) -> (Vec<Fill>, Option<(u64, u64)>) {
    let mut fills = Vec::new();
    let mut last_trade = None;
    let prices: Vec<u64> = if reversed {
        book_side.keys().rev().copied().collect()
    } else {
        book_side.keys().copied().collect()
    };

    for price in prices {
        if taker.remaining_size == 0 {
            break;
        }
        if !crosses(price) {
            // Levels are visited in priority order, so once the best
            // remaining level fails to cross, no worse level will either.
            break;
        }
        loop {
            if taker.remaining_size == 0 {
                break;
            }
            let Some(queue) = book_side.get_mut(&price) else {
                break;
            };
            let Some(head) = queue.front().copied() else {
                break;
            };
            let maker = orders
                .get_mut(&head.order_id)
                .expect("resting order id missing from the order index");

            let fill_size = taker.remaining_size.min(maker.remaining_size);
            let timestamp = clock.now();
            let price_dollars = price as f64 * tick_size;

            fills.push(Fill {
                fill_id: Uuid::new_v4(),
                order_id: taker.order_id,
                client_id: taker.client_id.clone(),
                side: taker.side,
                price: price_dollars,
                size: fill_size,
                timestamp,
            });
            fills.push(Fill {
                fill_id: Uuid::new_v4(),
                order_id: maker.order_id,
                client_id: maker.client_id.clone(),
                side: maker.side,
                price: price_dollars,
                size: fill_size,
                timestamp,
            });
            last_trade = Some((price, fill_size));

            taker.remaining_size -= fill_size;
            maker.remaining_size -= fill_size;

            if maker.remaining_size == 0 {
                maker.status = OrderStatus::Filled;
                queue.pop_front();
            } else {
                maker.status = OrderStatus::PartiallyFilled;
                queue
                    .front_mut()
                    .expect("head just matched, queue cannot be empty")
                    .remaining_size = maker.remaining_size;
            }
        }
        if book_side.get(&price).is_some_and(|q| q.is_empty()) {
            book_side.remove(&price);
        }
    }

    (fills, last_trade)
}

/// Matches `incoming` against the book and, for a limit order with residual
/// size, rests it at the tail of its own-side FIFO. Mutates `book` in place
/// and returns the ordered list of fills generated by this submission.
///
/// `incoming.order_id` and `incoming.arrival_seq` must already be assigned;
/// `incoming.limit_price` must already be quantized to the book's tick size,
/// and a `Limit` order must already carry one — callers validate kind/price
/// consistency before an order reaches this function.
pub fn submit(book: &mut OrderBook, mut incoming: Order, clock: &mut Clock) -> Vec<Fill> {
    let opposite_side = incoming.side.opposite();
    let reversed = opposite_side == Side::Buy;
    let tick_size = book.tick_size;

    let (fills, last_trade) = match incoming.kind {
        OrderKind::Market => {
            let book_side = match opposite_side {
                Side::Buy => &mut book.bids,
                Side::Sell => &mut book.asks,
            };
            if book_side.is_empty() {
                incoming.status = OrderStatus::Rejected;
                book.orders.insert(incoming.order_id, incoming);
                return Vec::new();
            }
            let (fills, last_trade) = walk_and_match(
                &mut incoming,
                book_side,
                &mut book.orders,
                reversed,
                |_| true,
                tick_size,
                clock,
            );
            incoming.status = if incoming.remaining_size == 0 {
                OrderStatus::Filled
            } else {
                OrderStatus::PartiallyFilled
            };
            (fills, last_trade)
        }
        OrderKind::Limit => {
            let price = incoming
                .limit_price
                .expect("limit order admitted without a limit_price");
            let crosses: Box<dyn Fn(u64) -> bool> = match incoming.side {
                Side::Buy => Box::new(move |maker_price: u64| price >= maker_price),
                Side::Sell => Box::new(move |maker_price: u64| price <= maker_price),
            };
            let book_side = match opposite_side {
                Side::Buy => &mut book.bids,
                Side::Sell => &mut book.asks,
            };
            let (fills, last_trade) = if book_side.is_empty() {
                (Vec::new(), None)
            } else {
                walk_and_match(
                    &mut incoming,
                    book_side,
                    &mut book.orders,
                    reversed,
                    crosses,
                    tick_size,
                    clock,
                )
            };

            if incoming.remaining_size > 0 {
                book.rest(incoming.order_id, incoming.side, price, incoming.remaining_size);
                incoming.status = if fills.is_empty() {
                    OrderStatus::Active
                } else {
                    OrderStatus::PartiallyFilled
                };
            } else {
                incoming.status = OrderStatus::Filled;
            }
            (fills, last_trade)
        }
    };

    if let Some((price_ticks, size)) = last_trade {
        book.record_trade(price_ticks, size);
    }
    book.orders.insert(incoming.order_id, incoming);
    fills
}
