//! Market-data producer: a background task that pushes book snapshots to
//! subscribers at a fixed cadence and, in synthetic mode, seeds the book
//! with random-walk quotes. Its synthetic orders go in under the reserved
//! [`MARKET_CLIENT_ID`] via `Engine::submit_direct`, which shares the
//! matching path with a real client's order but skips the risk gate —
//! quoting should never stall because the synthetic book "position" hits a
//! limit.
//!
//! Grounded on the original `_market_data_generator` (synthetic random-walk
//! mid, occasional synthetic limit orders, 10Hz snapshot push) and
//! `RealMarketDataFeed` (external quotes reflected as two-sided maker
//! orders around the quote's mid). Unlike the teacher's `market_maker.rs`/
//! `simulate.rs`, which drive the book from a separate process over HTTP,
//! this producer runs in-process.
use std::time::Duration;

use rand::Rng;
use rand_distr::{Distribution, Normal};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::{AppState, MARKET_CLIENT_ID};
use crate::orders::{OrderKind, Side};

/// Synthetic-mode push cadence: 10/s.
const SYNTHETIC_TICK_INTERVAL: Duration = Duration::from_millis(100);
/// External-mode push cadence: 1/s.
const EXTERNAL_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// One externally-sourced quote, fed in over a channel rather than fetched
/// by this crate directly — reaching out to a live vendor is out of scope;
/// the adapter that produces these is someone else's collaborator.
#[derive(Debug, Clone, Copy)]
pub struct ExternalQuote {
    pub mid: f64,
}

pub enum Mode {
    /// Random-walk synthetic quotes, seeded around `base_price`.
    Synthetic { base_price: f64 },
    /// Quotes arrive over `rx`; the generator never calls out to a network
    /// itself.
    External {
        rx: tokio::sync::mpsc::Receiver<ExternalQuote>,
    },
}

/// Runs until `shutdown` is cancelled. Broadcasts a snapshot every tick and,
/// in synthetic mode, has a 30% chance per tick of resting a new synthetic
/// limit order just off the random-walked mid — mirroring the source
/// generator's cadence and probability.
pub async fn run(state: AppState, mode: Mode, shutdown: CancellationToken) {
    let mut mode = mode;
    let tick_interval = match &mode {
        Mode::Synthetic { .. } => SYNTHETIC_TICK_INTERVAL,
        Mode::External { .. } => EXTERNAL_TICK_INTERVAL,
    };
    let mut interval = tokio::time::interval(tick_interval);
    let mut rng = rand::rng();
    let normal = Normal::new(0.0, 0.05).expect("fixed normal params are always valid");

    let mut walking_mid = match &mode {
        Mode::Synthetic { base_price } => *base_price,
        Mode::External { .. } => 0.0,
    };

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("market data producer shutting down");
                break;
            }
            _ = interval.tick() => {}
        }

        let mut engine = state.engine.lock().await;
        let current_mid = engine.snapshot(1).mid.unwrap_or(walking_mid);

        match &mut mode {
            Mode::Synthetic { .. } => {
                walking_mid = current_mid + normal.sample(&mut rng);
                if rng.random::<f64>() < 0.3 {
                    let side = if rng.random::<f64>() < 0.5 {
                        Side::Buy
                    } else {
                        Side::Sell
                    };
                    let offset = rng.random_range(0.01..0.10);
                    let price = if side == Side::Buy {
                        walking_mid - offset
                    } else {
                        walking_mid + offset
                    };
                    let size = rng.random_range(1..=10);
                    if let Err(e) = engine.submit_direct(
                        MARKET_CLIENT_ID.into(),
                        side,
                        OrderKind::Limit,
                        Some(price),
                        size,
                    ) {
                        warn!(error = %e, "synthetic market-data order rejected");
                    }
                }
            }
            Mode::External { rx } => {
                if let Ok(quote) = rx.try_recv() {
                    walking_mid = quote.mid;
                    for i in 1..=3u64 {
                        let offset = 0.01 * i as f64;
                        let _ = engine.submit_direct(
                            MARKET_CLIENT_ID.into(),
                            Side::Buy,
                            OrderKind::Limit,
                            Some(quote.mid - offset),
                            10,
                        );
                        let _ = engine.submit_direct(
                            MARKET_CLIENT_ID.into(),
                            Side::Sell,
                            OrderKind::Limit,
                            Some(quote.mid + offset),
                            10,
                        );
                    }
                }
            }
        }

        let snapshot = engine.snapshot(10);
        drop(engine);
        let _ = state.snapshot_tx.send(snapshot);
    }
}
