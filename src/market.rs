//! Market container: one book plus lifecycle metadata, a bounded trade
//! tape, and per-user running stats.

use std::collections::{HashMap, VecDeque};

use serde::Serialize;

use crate::error::CoreError;
use crate::ledger::{Ledger, Position};
use crate::orderbook::book::{snap, Book, Side};
use crate::orderbook::matching::{self, Placed, Trade};

const TAPE_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub buy_vol: u64,
    pub buy_notional: f64,
    pub sell_vol: u64,
    pub sell_notional: f64,
}

impl UserStats {
    pub fn avg_buy(&self) -> f64 {
        if self.buy_vol == 0 {
            0.0
        } else {
            self.buy_notional / self.buy_vol as f64
        }
    }

    pub fn avg_sell(&self) -> f64 {
        if self.sell_vol == 0 {
            0.0
        } else {
            self.sell_notional / self.sell_vol as f64
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketMeta {
    pub symbol: String,
    pub open: bool,
    pub settlement: Option<f64>,
    pub pos_limit: i64,
    pub click_size: u64,
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
    pub tick_size: f64,
}

pub struct Market {
    pub symbol: String,
    pub tick_size: f64,
    pub pos_limit: i64,
    pub open: bool,
    pub settlement: Option<f64>,
    pub click_size_default: u64,
    pub book: Book,
    pub ledger: Ledger,
    pub tape: VecDeque<Trade>,
    pub user_stats: HashMap<String, UserStats>,
}

impl Market {
    pub fn new(symbol: String, tick_size: f64, pos_limit: i64) -> Self {
        Self {
            symbol,
            tick_size,
            pos_limit,
            open: true,
            settlement: None,
            click_size_default: 1,
            book: Book::new(),
            ledger: Ledger::new(),
            tape: VecDeque::new(),
            user_stats: HashMap::new(),
        }
    }

    fn record_trade(&mut self, trade: &Trade) {
        if self.tape.len() == TAPE_CAPACITY {
            self.tape.pop_front();
        }
        self.tape.push_back(trade.clone());

        let buyer = self.user_stats.entry(trade.buyer.clone()).or_default();
        buyer.buy_vol += trade.qty;
        buyer.buy_notional += trade.qty as f64 * trade.price;

        let seller = self.user_stats.entry(trade.seller.clone()).or_default();
        seller.sell_vol += trade.qty;
        seller.sell_notional += trade.qty as f64 * trade.price;
    }

    fn record_trades(&mut self, trades: Vec<Trade>) -> Vec<Trade> {
        for trade in &trades {
            self.record_trade(trade);
        }
        trades
    }

    pub fn place_limit(&mut self, user_id: &str, side: Side, price: f64, qty: u64, now_ms: i64) -> Result<Placed, CoreError> {
        let placed = matching::place_limit(
            &mut self.book,
            &mut self.ledger,
            &self.symbol,
            self.tick_size,
            self.pos_limit,
            user_id,
            side,
            price,
            qty,
            now_ms,
        )?;
        Ok(Placed { order_id: placed.order_id, trades: self.record_trades(placed.trades) })
    }

    pub fn take_at_price(&mut self, user_id: &str, side: Side, price: f64, max_qty: u64, now_ms: i64) -> (u64, Vec<Trade>) {
        let (filled, trades) = matching::take_at_price(
            &mut self.book,
            &mut self.ledger,
            &self.symbol,
            self.tick_size,
            self.pos_limit,
            user_id,
            side,
            price,
            max_qty,
            now_ms,
        );
        (filled, self.record_trades(trades))
    }

    pub fn cancel_at_price(&mut self, user_id: &str, side: Side, price: f64) -> u64 {
        self.book.cancel_at_price(user_id, side, price, self.tick_size)
    }

    pub fn position(&self, user_id: &str) -> Position {
        self.ledger.get(user_id)
    }

    pub fn best_bid(&self) -> Option<f64> {
        self.book.best_price(Side::Buy, self.tick_size)
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.book.best_price(Side::Sell, self.tick_size)
    }

    pub fn mid(&self) -> Option<f64> {
        self.book.mid(self.tick_size)
    }

    /// Settlement if set, else mid, else 0 — the "mark" used for implied PnL.
    pub fn implied_price(&self) -> f64 {
        self.settlement.or_else(|| self.mid()).unwrap_or(0.0)
    }

    /// Settlement pins the market closed; toggling open is a no-op once
    /// settled.
    pub fn set_open(&mut self, open: bool) {
        if self.settlement.is_none() {
            self.open = open;
        }
    }

    pub fn settle(&mut self, price: f64) {
        self.settlement = Some(snap(price, self.tick_size));
        self.open = false;
    }

    pub fn meta(&self) -> MarketMeta {
        MarketMeta {
            symbol: self.symbol.clone(),
            open: self.open,
            settlement: self.settlement,
            pos_limit: self.pos_limit,
            click_size: self.click_size_default,
            best_bid: self.best_bid(),
            best_ask: self.best_ask(),
            tick_size: self.tick_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settlement_forces_closed_and_blocks_reopen() {
        let mut market = Market::new("A".into(), 0.1, 100);
        market.settle(10.0);
        assert!(!market.open);
        assert_eq!(market.settlement, Some(10.0));

        market.set_open(true);
        assert!(!market.open, "settled market must stay closed");
    }

    #[test]
    fn tape_is_capped_and_drops_oldest() {
        let mut market = Market::new("A".into(), 0.1, 1_000_000);
        for i in 0..(TAPE_CAPACITY + 5) {
            market.place_limit("maker", Side::Sell, 10.0, 1, i as i64).unwrap();
            market.place_limit("taker", Side::Buy, 10.0, 1, i as i64).unwrap();
        }
        assert_eq!(market.tape.len(), TAPE_CAPACITY);
    }

    #[test]
    fn user_stats_track_average_prices() {
        let mut market = Market::new("A".into(), 0.1, 1_000_000);
        market.place_limit("seller", Side::Sell, 10.0, 5, 1).unwrap();
        market.place_limit("buyer", Side::Buy, 10.0, 5, 2).unwrap();
        market.place_limit("seller", Side::Sell, 20.0, 5, 3).unwrap();
        market.place_limit("buyer", Side::Buy, 20.0, 5, 4).unwrap();

        let buyer_stats = market.user_stats.get("buyer").unwrap();
        assert_eq!(buyer_stats.avg_buy(), 15.0);
    }
}
