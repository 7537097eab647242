//! Utilities shared across the engine, risk gate, and ingress layer.
use std::time::SystemTime;

use tokio::signal;
use tokio_util::sync::CancellationToken;

pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let tc = token.clone();
    //spawn once to listen for ctrl-c
    tokio::spawn(async move {
        signal::ctrl_c()
            .await
            .expect("failed to install ctrl+C handler");
        tc.cancel();
    });
    token
}

/// A monotonic wall-clock source shared by the writer, so fill timestamps
/// never regress even under rapid back-to-back calls. `Engine::submit`
/// calls [`Clock::now`] exactly once per call and reuses the result for
/// every `Fill` and snapshot it produces that turn.
#[derive(Debug, Default)]
pub struct Clock {
    last: Option<SystemTime>,
}

impl Clock {
    pub fn new() -> Self {
        Self { last: None }
    }

    /// Returns a timestamp that is never earlier than the previous call's.
    pub fn now(&mut self) -> SystemTime {
        let candidate = SystemTime::now();
        let stamp = match self.last {
            Some(prev) if candidate <= prev => prev
                .checked_add(std::time::Duration::from_nanos(1))
                .unwrap_or(prev),
            _ => candidate,
        };
        self.last = Some(stamp);
        stamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_monotonic_even_under_rapid_calls() {
        let mut clock = Clock::new();
        let mut prev = clock.now();
        for _ in 0..1000 {
            let next = clock.now();
            assert!(next > prev);
            prev = next;
        }
    }
}
