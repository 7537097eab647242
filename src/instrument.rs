use serde::{Deserialize, Serialize};

/// The single symbol this process's book is configured for.
///
/// This crate hosts one `OrderBook` per process; a `Symbol` is carried only
/// so `POST /order` can reject a request whose `symbol` field disagrees with
/// what the process was started with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol(pub String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Symbol(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for Symbol {
    fn default() -> Self {
        Symbol::new("BTC-USD")
    }
}
