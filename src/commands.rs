//! Command dispatcher: parse inbound commands, validate, route to the
//! matching engine / market / session registry, and produce the outbox of
//! (connection id, outbound message) pairs ready to send.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::fanout::{self, Bundle};
use crate::market::{Market, MarketMeta};
use crate::orderbook::book::Side;
use crate::session::{is_valid_code, sanitize_name, sanitize_symbol, Registry, Role, Session, MAX_MARKETS_PER_SESSION};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketDef {
    pub symbol: String,
    #[serde(default)]
    pub pos_limit: Option<i64>,
    #[serde(default)]
    pub tick_size: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Command {
    AdminCreateGame { code: String, admin_password: String, markets: Vec<MarketDef> },
    PlayerJoin { code: String, name: String },
    AdminToggleMarket { symbol: String, open: bool },
    AdminToggleAll { open: bool },
    AdminSettle { symbol: String, price: f64 },
    AdminSettleAll { price_map: HashMap<String, f64> },
    AdminAddEvent { text: String },
    PlaceOrder { symbol: String, side: Side, price: f64, qty: u64 },
    CancelAtPrice { symbol: String, side: Side, price: f64 },
    ClickTrade { symbol: String, side: Side, price: f64, max_qty: f64 },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Outbound {
    AdminAck { ok: bool, error: Option<String>, code: String, markets: Option<Vec<MarketMeta>> },
    JoinAck { ok: bool, error: Option<String>, code: String, name: String, markets: Option<Vec<MarketMeta>> },
    OrderReject { symbol: String, reason: String },
    MarketsMeta { markets: Vec<MarketMeta> },
    Trade { ts: i64, symbol: String, price: f64, qty: u64 },
    Event { ts: i64, text: String },
    Bundle(Bundle),
}

/// What a session-scoped command produced, before expansion into concrete
/// (recipient, message) pairs.
#[derive(Default)]
struct Effect {
    to_caller: Option<Outbound>,
    to_room: Vec<Outbound>,
    fan_out: bool,
}

/// Entry point consumed by the transport adapter: validate and execute one
/// inbound command, returning every outbound message it produced along with
/// its destination connection id.
pub fn dispatch(
    registry: &Registry,
    admin_password: &str,
    conn_id: &str,
    current_code: Option<&str>,
    cmd: Command,
    now_ms: i64,
) -> Vec<(String, Outbound)> {
    match cmd {
        Command::AdminCreateGame { code, admin_password: given, markets } => {
            admin_create_game(registry, admin_password, conn_id, code, given, markets)
        }
        Command::PlayerJoin { code, name } => player_join(registry, conn_id, code, name),
        other => {
            let Some(code) = current_code else { return Vec::new() };
            let Some(session_lock) = registry.get(code) else { return Vec::new() };
            let mut session = session_lock.lock().unwrap();
            let effect = match other {
                Command::AdminToggleMarket { symbol, open } => admin_toggle_market(&mut session, conn_id, symbol, open),
                Command::AdminToggleAll { open } => admin_toggle_all(&mut session, conn_id, open),
                Command::AdminSettle { symbol, price } => admin_settle(&mut session, conn_id, symbol, price),
                Command::AdminSettleAll { price_map } => admin_settle_all(&mut session, conn_id, price_map),
                Command::AdminAddEvent { text } => admin_add_event(&mut session, conn_id, text, now_ms),
                Command::PlaceOrder { symbol, side, price, qty } => {
                    place_order(&mut session, conn_id, symbol, side, price, qty, now_ms)
                }
                Command::CancelAtPrice { symbol, side, price } => cancel_at_price(&mut session, conn_id, symbol, side, price),
                Command::ClickTrade { symbol, side, price, max_qty } => {
                    click_trade(&mut session, conn_id, symbol, side, price, max_qty, now_ms)
                }
                Command::AdminCreateGame { .. } | Command::PlayerJoin { .. } => unreachable!(),
            };
            finalize(&session, conn_id, effect)
        }
    }
}

/// Expand an `Effect` into concrete (recipient, message) pairs: the ack to
/// the caller, then, for every connection in the room, the room-wide
/// messages plus (if the command changed state) a freshly built
/// personalized bundle.
fn finalize(session: &Session, caller: &str, effect: Effect) -> Vec<(String, Outbound)> {
    let mut out = Vec::new();
    if let Some(msg) = effect.to_caller {
        out.push((caller.to_string(), msg));
    }
    if effect.to_room.is_empty() && !effect.fan_out {
        return out;
    }
    for conn_id in session.roles.keys() {
        for msg in &effect.to_room {
            out.push((conn_id.clone(), msg.clone()));
        }
        if effect.fan_out {
            out.push((conn_id.clone(), Outbound::Bundle(fanout::build_bundle(session, conn_id))));
        }
    }
    out
}

fn admin_create_game(
    registry: &Registry,
    admin_password: &str,
    conn_id: &str,
    code: String,
    given_password: String,
    market_defs: Vec<MarketDef>,
) -> Vec<(String, Outbound)> {
    if given_password != admin_password {
        return vec![(
            conn_id.to_string(),
            Outbound::AdminAck { ok: false, error: Some("Bad password".into()), code, markets: None },
        )];
    }
    if !is_valid_code(&code) {
        return vec![(
            conn_id.to_string(),
            Outbound::AdminAck { ok: false, error: Some("Code must be 4 digits".into()), code, markets: None },
        )];
    }

    let session_lock = registry.get_or_create(&code, || {
        let mut session = Session::new(code.clone());
        for def in market_defs.iter().take(MAX_MARKETS_PER_SESSION) {
            let symbol = sanitize_symbol(&def.symbol);
            let tick_size = def.tick_size.unwrap_or(0.1);
            let pos_limit = def.pos_limit.unwrap_or(100);
            session
                .markets
                .entry(symbol.clone())
                .or_insert_with(|| Market::new(symbol, tick_size, pos_limit));
        }
        session
    });

    let mut session = session_lock.lock().unwrap();
    session.roles.insert(conn_id.to_string(), Role::Admin);
    let markets: Vec<MarketMeta> = session.markets.values().map(Market::meta).collect();
    let ack = Outbound::AdminAck { ok: true, error: None, code: session.code.clone(), markets: Some(markets) };

    finalize(&session, conn_id, Effect { to_caller: Some(ack), fan_out: true, ..Default::default() })
}

fn player_join(registry: &Registry, conn_id: &str, code: String, name: String) -> Vec<(String, Outbound)> {
    let Some(session_lock) = registry.get(&code) else {
        return vec![(
            conn_id.to_string(),
            Outbound::JoinAck { ok: false, error: Some("Game not found".into()), code, name, markets: None },
        )];
    };

    let mut session = session_lock.lock().unwrap();
    let display_name = sanitize_name(&name, conn_id);
    session.usernames.insert(conn_id.to_string(), display_name.clone());
    session.roles.insert(conn_id.to_string(), Role::Player);
    let markets: Vec<MarketMeta> = session.markets.values().map(Market::meta).collect();
    let ack = Outbound::JoinAck {
        ok: true,
        error: None,
        code: session.code.clone(),
        name: display_name,
        markets: Some(markets),
    };

    finalize(&session, conn_id, Effect { to_caller: Some(ack), fan_out: true, ..Default::default() })
}

fn admin_toggle_market(session: &mut Session, conn_id: &str, symbol: String, open: bool) -> Effect {
    if !session.is_admin(conn_id) {
        return Effect::default();
    }
    let Some(market) = session.markets.get_mut(&symbol) else { return Effect::default() };
    market.set_open(open);
    let markets: Vec<MarketMeta> = session.markets.values().map(Market::meta).collect();
    Effect { to_room: vec![Outbound::MarketsMeta { markets }], fan_out: true, ..Default::default() }
}

fn admin_toggle_all(session: &mut Session, conn_id: &str, open: bool) -> Effect {
    if !session.is_admin(conn_id) {
        return Effect::default();
    }
    for market in session.markets.values_mut() {
        market.set_open(open);
    }
    let markets: Vec<MarketMeta> = session.markets.values().map(Market::meta).collect();
    Effect { to_room: vec![Outbound::MarketsMeta { markets }], fan_out: true, ..Default::default() }
}

fn admin_settle(session: &mut Session, conn_id: &str, symbol: String, price: f64) -> Effect {
    if !session.is_admin(conn_id) {
        return Effect::default();
    }
    let Some(market) = session.markets.get_mut(&symbol) else { return Effect::default() };
    market.settle(price);
    let markets: Vec<MarketMeta> = session.markets.values().map(Market::meta).collect();
    Effect { to_room: vec![Outbound::MarketsMeta { markets }], fan_out: true, ..Default::default() }
}

fn admin_settle_all(session: &mut Session, conn_id: &str, price_map: HashMap<String, f64>) -> Effect {
    if !session.is_admin(conn_id) {
        return Effect::default();
    }
    for (symbol, price) in price_map {
        if let Some(market) = session.markets.get_mut(&symbol) {
            market.settle(price);
        }
    }
    let markets: Vec<MarketMeta> = session.markets.values().map(Market::meta).collect();
    Effect { to_room: vec![Outbound::MarketsMeta { markets }], fan_out: true, ..Default::default() }
}

fn admin_add_event(session: &mut Session, conn_id: &str, text: String, now_ms: i64) -> Effect {
    if !session.is_admin(conn_id) {
        return Effect::default();
    }
    let truncated: String = text.chars().take(500).collect();
    session.add_event(now_ms, truncated.clone());
    Effect { to_room: vec![Outbound::Event { ts: now_ms, text: truncated }], fan_out: true, ..Default::default() }
}

#[allow(clippy::too_many_arguments)]
fn place_order(session: &mut Session, conn_id: &str, symbol: String, side: Side, price: f64, qty: u64, now_ms: i64) -> Effect {
    if price <= 0.0 || qty == 0 {
        return Effect::default();
    }
    let Some(market) = session.markets.get_mut(&symbol) else { return Effect::default() };
    if !market.open {
        return Effect::default();
    }

    match market.place_limit(conn_id, side, price, qty, now_ms) {
        Err(err) => {
            Effect { to_caller: Some(Outbound::OrderReject { symbol, reason: err.reason().to_string() }), ..Default::default() }
        }
        Ok(placed) => {
            let to_room = placed
                .trades
                .into_iter()
                .map(|t| Outbound::Trade { ts: t.ts, symbol: t.symbol, price: t.price, qty: t.qty })
                .collect();
            Effect { to_room, fan_out: true, ..Default::default() }
        }
    }
}

fn cancel_at_price(session: &mut Session, conn_id: &str, symbol: String, side: Side, price: f64) -> Effect {
    let Some(market) = session.markets.get_mut(&symbol) else { return Effect::default() };
    market.cancel_at_price(conn_id, side, price);
    Effect { fan_out: true, ..Default::default() }
}

#[allow(clippy::too_many_arguments)]
fn click_trade(session: &mut Session, conn_id: &str, symbol: String, side: Side, price: f64, max_qty: f64, now_ms: i64) -> Effect {
    let Some(market) = session.markets.get_mut(&symbol) else { return Effect::default() };
    if !market.open {
        return Effect::default();
    }
    // max_qty is a raw click-to-trade input: coerce to a positive integer quantity.
    let max_qty = (max_qty.floor().max(1.0)) as u64;
    let (_, trades) = market.take_at_price(conn_id, side, price, max_qty, now_ms);
    let to_room = trades
        .into_iter()
        .map(|t| Outbound::Trade { ts: t.ts, symbol: t.symbol, price: t.price, qty: t.qty })
        .collect();
    Effect { to_room, fan_out: true, ..Default::default() }
}
