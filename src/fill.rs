use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::orders::Side;

/// One counterparty's half of a match.
///
/// Every match produces exactly two `Fill`s — one per counterparty — sharing
/// `price`, `size`, and `timestamp`; the matching engine always emits them as
/// an ordered pair, taker first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub fill_id: Uuid,
    pub order_id: u64,
    pub client_id: String,
    pub side: Side,
    /// Execution price in dollars (already converted from the book's
    /// tick-quantized integer representation — never a raw tick count).
    pub price: f64,
    pub size: u64,
    pub timestamp: SystemTime,
}
