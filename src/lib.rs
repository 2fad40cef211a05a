//! Classroom exchange: a multi-market limit order book engine with
//! per-viewer realtime fan-out over websockets.

pub mod commands;
pub mod config;
pub mod error;
pub mod fanout;
pub mod health;
pub mod ledger;
pub mod market;
pub mod orderbook;
pub mod session;
pub mod ws;

use std::time::Instant;

use session::Registry;
use ws::ConnectionRegistry;

/// Process-wide shared state: the session registry plus the live websocket
/// connection table, behind one `Arc` handed to every handler.
pub struct AppState {
    pub registry: Registry,
    pub connections: ConnectionRegistry,
    pub admin_password: String,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(admin_password: String) -> Self {
        Self {
            registry: Registry::new(),
            connections: ConnectionRegistry::new(),
            admin_password,
            started_at: Instant::now(),
        }
    }
}
