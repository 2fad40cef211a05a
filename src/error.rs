//! Core error taxonomy for fallible trading-engine operations.
//!
//! Mirrors the ancestor's `orderbook::orders::OrderError`: a plain enum with
//! a hand-written `Display` and `std::error::Error` impl, no `thiserror`.
//! The dispatcher (`commands.rs`) converts these into the outbound
//! ack/reject messages `§6`/`§7` specify rather than propagating them to the
//! wire.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CoreError {
    /// Placing the full order size would push the trader's absolute
    /// position past the market's `posLimit`.
    PosLimit,
}

impl CoreError {
    /// The wire-level `reason` string carried in `order_reject`.
    pub fn reason(&self) -> &'static str {
        match self {
            CoreError::PosLimit => "pos_limit",
        }
    }
}

impl std::fmt::Display for CoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreError::PosLimit => write!(f, "position limit would be breached"),
        }
    }
}

impl std::error::Error for CoreError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pos_limit_reason_matches_wire_contract() {
        assert_eq!(CoreError::PosLimit.reason(), "pos_limit");
    }
}
