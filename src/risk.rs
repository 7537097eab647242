//! Pre-trade risk gate (spec component C): six ordered, short-circuiting
//! checks run before an order is allowed to reach the book, plus post-fill
//! position/PnL bookkeeping. Grounded on the original `RiskManager`'s
//! `validate_order` check order, generalized to return a typed `EngineError`
//! instead of an `(bool, Option<String>)` pair.
use std::collections::HashMap;

use crate::errors::EngineError;
use crate::orders::Side;

#[derive(Debug, Clone, Copy)]
pub struct RiskLimits {
    pub max_position: i64,
    pub max_daily_loss: f64,
    pub max_order_rate: u32,
    pub max_order_size: u64,
    pub price_deviation_pct: f64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_position: 100,
            max_daily_loss: 1000.0,
            max_order_rate: 100,
            max_order_size: 50,
            price_deviation_pct: 0.05,
        }
    }
}

/// Per-client risk state. `order_count_this_second`/`current_second` implement
/// a fixed-window rate limit: the counter resets whenever the wall-clock
/// second advances, mirroring the "reset if >= 1.0s since last order" rule
/// of the source rate check.
#[derive(Debug, Clone, Default)]
pub struct ClientRiskState {
    pub position: i64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub order_count_this_second: u32,
    pub current_second: u64,
    pub blocked: bool,
}

impl ClientRiskState {
    pub fn total_pnl(&self) -> f64 {
        self.realized_pnl + self.unrealized_pnl
    }
}

pub struct RiskGate {
    pub limits: RiskLimits,
    clients: HashMap<String, ClientRiskState>,
}

impl RiskGate {
    pub fn new(limits: RiskLimits) -> Self {
        Self {
            limits,
            clients: HashMap::new(),
        }
    }

    pub fn state_of(&self, client_id: &str) -> ClientRiskState {
        self.clients.get(client_id).cloned().unwrap_or_default()
    }

    fn state_mut(&mut self, client_id: &str) -> &mut ClientRiskState {
        self.clients.entry(client_id.to_string()).or_default()
    }

    /// Runs the six checks in spec order, short-circuiting on the first
    /// failure: blocked, rate, size, position, price_bounds, daily_loss.
    /// `now_second` is the caller's wall-clock second, passed in so the gate
    /// never reads system time itself (kept deterministic and testable).
    pub fn check(
        &mut self,
        client_id: &str,
        side: Side,
        size: u64,
        limit_price: Option<f64>,
        mid_price: Option<f64>,
        now_second: u64,
    ) -> Result<(), EngineError> {
        {
            let state = self.state_mut(client_id);
            if state.blocked {
                return Err(EngineError::Blocked);
            }
        }

        {
            let state = self.state_mut(client_id);
            if state.current_second != now_second {
                state.current_second = now_second;
                state.order_count_this_second = 0;
            }
            if state.order_count_this_second >= self.limits.max_order_rate {
                return Err(EngineError::RateLimit);
            }
            state.order_count_this_second += 1;
        }

        if size == 0 {
            return Err(EngineError::SizeLimit("order size must be positive".into()));
        }
        if size > self.limits.max_order_size {
            return Err(EngineError::SizeLimit(format!(
                "order size {size} exceeds limit {}",
                self.limits.max_order_size
            )));
        }

        {
            let state = self.state_of(client_id);
            let delta = match side {
                Side::Buy => size as i64,
                Side::Sell => -(size as i64),
            };
            let new_position = state.position + delta;
            if new_position.abs() > self.limits.max_position {
                return Err(EngineError::PositionLimit(format!(
                    "position limit exceeded: {new_position} > {}",
                    self.limits.max_position
                )));
            }
        }

        if let (Some(price), Some(mid)) = (limit_price, mid_price) {
            if mid != 0.0 {
                let deviation = (price - mid).abs() / mid;
                if deviation > self.limits.price_deviation_pct {
                    return Err(EngineError::PriceBounds(format!(
                        "price deviation {:.2}% exceeds limit {:.2}%",
                        deviation * 100.0,
                        self.limits.price_deviation_pct * 100.0
                    )));
                }
            }
        }

        {
            let state = self.state_mut(client_id);
            if state.total_pnl() < -self.limits.max_daily_loss {
                state.blocked = true;
                return Err(EngineError::DailyLoss(format!(
                    "daily loss limit exceeded: {:.2}",
                    state.total_pnl()
                )));
            }
        }

        Ok(())
    }

    /// Applies a fill's effect on the client's net position. PnL is updated
    /// separately via [`RiskGate::update_pnl`] once the caller has priced
    /// the remaining open position against the current mark.
    pub fn on_fill(&mut self, client_id: &str, side: Side, size: u64) {
        let state = self.state_mut(client_id);
        let delta = match side {
            Side::Buy => size as i64,
            Side::Sell => -(size as i64),
        };
        state.position += delta;
    }

    pub fn update_pnl(&mut self, client_id: &str, realized_delta: f64, unrealized_pnl: f64) {
        let state = self.state_mut(client_id);
        state.realized_pnl += realized_delta;
        state.unrealized_pnl = unrealized_pnl;
    }
}
