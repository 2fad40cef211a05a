//! Order & book primitives: the Order record, per-price FIFO queues, and the
//! two price -> level mappings that make up one symbol's book.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

/// Floor under `tick` so snapping never divides by (near) zero.
const MIN_TICK: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Snap a price to the nearest multiple of `tick`.
pub fn snap(price: f64, tick: f64) -> f64 {
    let tick = tick.max(MIN_TICK);
    (price / tick).round() * tick
}

/// Integer tick count used as the book's ordered-map key. Floats make
/// unreliable map keys even after snapping, so the book indexes on this
/// instead; two prices that snap to the same tick always produce the same
/// key.
pub fn price_ticks(price: f64, tick: f64) -> i64 {
    let tick = tick.max(MIN_TICK);
    (price / tick).round() as i64
}

pub fn ticks_to_price(ticks: i64, tick: f64) -> f64 {
    ticks as f64 * tick
}

#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: u64,
    pub user_id: String,
    pub side: Side,
    pub price: f64,
    pub qty: u64,
    pub leaves: u64,
    pub ts: i64,
}

#[derive(Debug, Default)]
pub struct PriceLevel {
    pub orders: VecDeque<Order>,
}

impl PriceLevel {
    pub fn total_leaves(&self) -> u64 {
        self.orders.iter().map(|o| o.leaves).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

/// Top-of-book view of one price level, as handed to a viewer's book
/// snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct LevelView {
    pub price: f64,
    pub size: u64,
    pub my: u64,
}

#[derive(Debug, Default)]
pub struct Book {
    pub bids: BTreeMap<i64, PriceLevel>,
    pub asks: BTreeMap<i64, PriceLevel>,
    next_order_id: u64,
}

impl Book {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> u64 {
        self.next_order_id += 1;
        self.next_order_id
    }

    fn side_map(&self, side: Side) -> &BTreeMap<i64, PriceLevel> {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    fn side_map_mut(&mut self, side: Side) -> &mut BTreeMap<i64, PriceLevel> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// Best price ticks on `side`: max for bids, min for asks.
    pub fn best_ticks(&self, side: Side) -> Option<i64> {
        match side {
            Side::Buy => self.bids.keys().next_back().copied(),
            Side::Sell => self.asks.keys().next().copied(),
        }
    }

    pub fn best_price(&self, side: Side, tick: f64) -> Option<f64> {
        self.best_ticks(side).map(|t| ticks_to_price(t, tick))
    }

    pub fn mid(&self, tick: f64) -> Option<f64> {
        match (self.best_price(Side::Buy, tick), self.best_price(Side::Sell, tick)) {
            (Some(bid), Some(ask)) => Some((bid + ask) / 2.0),
            (Some(bid), None) => Some(bid),
            (None, Some(ask)) => Some(ask),
            (None, None) => None,
        }
    }

    pub fn level(&self, side: Side, ticks: i64) -> Option<&PriceLevel> {
        self.side_map(side).get(&ticks)
    }

    pub fn level_mut(&mut self, side: Side, ticks: i64) -> Option<&mut PriceLevel> {
        self.side_map_mut(side).get_mut(&ticks)
    }

    pub fn push_at(&mut self, side: Side, ticks: i64, order: Order) {
        self.side_map_mut(side).entry(ticks).or_default().orders.push_back(order);
    }

    pub fn remove_empty_level(&mut self, side: Side, ticks: i64) {
        let map = self.side_map_mut(side);
        if map.get(&ticks).map(|l| l.is_empty()).unwrap_or(false) {
            map.remove(&ticks);
        }
    }

    /// Remove every resting order belonging to `user_id` at the snapped
    /// (side, price). Returns the count removed.
    pub fn cancel_at_price(&mut self, user_id: &str, side: Side, price: f64, tick: f64) -> u64 {
        let ticks = price_ticks(snap(price, tick), tick);
        let map = self.side_map_mut(side);
        let Some(level) = map.get_mut(&ticks) else { return 0 };
        let before = level.orders.len();
        level.orders.retain(|o| o.user_id != user_id);
        let removed = (before - level.orders.len()) as u64;
        if level.is_empty() {
            map.remove(&ticks);
        }
        removed
    }

    /// Top `depth` levels on `side`, sorted best-first, personalized for
    /// `viewer`.
    pub fn level_views(&self, side: Side, tick: f64, viewer: &str, depth: usize) -> Vec<LevelView> {
        let map = self.side_map(side);
        let entries: Vec<(&i64, &PriceLevel)> = match side {
            Side::Buy => map.iter().rev().collect(),
            Side::Sell => map.iter().collect(),
        };
        entries
            .into_iter()
            .take(depth)
            .map(|(ticks, level)| LevelView {
                price: ticks_to_price(*ticks, tick),
                size: level.total_leaves(),
                my: level
                    .orders
                    .iter()
                    .filter(|o| o.user_id == viewer)
                    .map(|o| o.leaves)
                    .sum(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snap_rounds_to_nearest_tick() {
        assert_eq!(snap(10.04, 0.1), 10.0);
        assert_eq!(snap(10.06, 0.1), 10.1);
    }

    #[test]
    fn push_and_remove_level_lifecycle() {
        let mut book = Book::new();
        let ticks = price_ticks(10.0, 0.1);
        let id = book.next_id();
        book.push_at(
            Side::Buy,
            ticks,
            Order { id, user_id: "u1".into(), side: Side::Buy, price: 10.0, qty: 5, leaves: 5, ts: 0 },
        );
        assert_eq!(book.best_price(Side::Buy, 0.1), Some(10.0));

        let removed = book.cancel_at_price("u1", Side::Buy, 10.0, 0.1);
        assert_eq!(removed, 1);
        assert_eq!(book.best_price(Side::Buy, 0.1), None);
        assert!(book.level(Side::Buy, ticks).is_none());
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut book = Book::new();
        let ticks = price_ticks(9.9, 0.1);
        for _ in 0..2 {
            let id = book.next_id();
            book.push_at(
                Side::Buy,
                ticks,
                Order { id, user_id: "u1".into(), side: Side::Buy, price: 9.9, qty: 3, leaves: 3, ts: 0 },
            );
        }
        assert_eq!(book.cancel_at_price("u1", Side::Buy, 9.9, 0.1), 2);
        assert_eq!(book.cancel_at_price("u1", Side::Buy, 9.9, 0.1), 0);
    }
}
