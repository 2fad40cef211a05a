//! Per-viewer bundle construction: every state-changing command ends with a
//! fresh, personalized snapshot sent to each connection in the room.

use serde::Serialize;

use crate::ledger::Position;
use crate::market::{Market, UserStats};
use crate::orderbook::book::{LevelView, Side};
use crate::session::{Role, Session, SessionEvent};

const BOOK_DEPTH: usize = 200;
const EVENTS_IN_BUNDLE: usize = 200;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerPosition {
    pub qty: i64,
    pub cash: f64,
    pub mark: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSnapshot {
    pub bids: Vec<LevelView>,
    pub asks: Vec<LevelView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub avg_buy: f64,
    pub avg_sell: f64,
    pub buy_vol: u64,
    pub sell_vol: u64,
}

impl From<UserStats> for UserSummary {
    fn from(stats: UserStats) -> Self {
        Self { avg_buy: stats.avg_buy(), avg_sell: stats.avg_sell(), buy_vol: stats.buy_vol, sell_vol: stats.sell_vol }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketBundle {
    pub symbol: String,
    pub open: bool,
    pub settlement: Option<f64>,
    pub tick_size: f64,
    pub pos_limit: i64,
    pub click_size: u64,
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
    pub book: BookSnapshot,
    pub position: ViewerPosition,
    pub user_summary: UserSummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub code: String,
    pub viewer_role: Option<Role>,
    pub markets: Vec<MarketBundle>,
    pub events: Vec<SessionEvent>,
    pub pnl_implied: f64,
}

fn viewer_position(market: &Market, viewer: &str) -> ViewerPosition {
    let Position { qty, cash } = market.position(viewer);
    ViewerPosition { qty, cash, mark: market.implied_price() }
}

fn market_bundle(market: &Market, viewer: &str) -> MarketBundle {
    MarketBundle {
        symbol: market.symbol.clone(),
        open: market.open,
        settlement: market.settlement,
        tick_size: market.tick_size,
        pos_limit: market.pos_limit,
        click_size: market.click_size_default,
        best_bid: market.best_bid(),
        best_ask: market.best_ask(),
        book: BookSnapshot {
            bids: market.book.level_views(Side::Buy, market.tick_size, viewer, BOOK_DEPTH),
            asks: market.book.level_views(Side::Sell, market.tick_size, viewer, BOOK_DEPTH),
        },
        position: viewer_position(market, viewer),
        user_summary: market.user_stats.get(viewer).copied().unwrap_or_default().into(),
    }
}

/// Build the personalized snapshot sent to exactly one connection: every
/// market's book (with that viewer's own resting size called out), their
/// position, implied PnL, and the session's recent events.
pub fn build_bundle(session: &Session, viewer: &str) -> Bundle {
    let mut markets: Vec<MarketBundle> = session.markets.values().map(|m| market_bundle(m, viewer)).collect();
    markets.sort_by(|a, b| a.symbol.cmp(&b.symbol));

    let pnl_implied = markets.iter().map(|m| m.position.cash + m.position.qty as f64 * m.position.mark).sum();

    let events = session
        .events
        .iter()
        .rev()
        .take(EVENTS_IN_BUNDLE)
        .rev()
        .cloned()
        .collect();

    Bundle {
        code: session.code.clone(),
        viewer_role: session.roles.get(viewer).copied(),
        markets,
        events,
        pnl_implied,
    }
}
