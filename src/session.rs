//! Session/game registry: session code -> { markets, roles, display names,
//! event log }, plus the process-wide code -> session map.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;

use crate::market::Market;

pub const MAX_MARKETS_PER_SESSION: usize = 5;
pub const MAX_EVENTS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Player,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionEvent {
    pub ts: i64,
    pub text: String,
}

pub struct Session {
    pub code: String,
    pub markets: HashMap<String, Market>,
    pub usernames: HashMap<String, String>,
    pub roles: HashMap<String, Role>,
    pub events: VecDeque<SessionEvent>,
}

impl Session {
    pub fn new(code: String) -> Self {
        Self {
            code,
            markets: HashMap::new(),
            usernames: HashMap::new(),
            roles: HashMap::new(),
            events: VecDeque::new(),
        }
    }

    pub fn add_event(&mut self, ts: i64, text: String) {
        if self.events.len() == MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(SessionEvent { ts, text });
    }

    pub fn is_admin(&self, conn_id: &str) -> bool {
        matches!(self.roles.get(conn_id), Some(Role::Admin))
    }

    pub fn display_name(&self, conn_id: &str) -> String {
        self.usernames
            .get(conn_id)
            .cloned()
            .unwrap_or_else(|| format!("Player-{}", &conn_id[..conn_id.len().min(4)]))
    }

    /// Drop the connection from `usernames`/`roles`. Resting orders and
    /// positions are left exactly as they are — they stay keyed by this
    /// now-defunct connection id.
    pub fn disconnect(&mut self, conn_id: &str) {
        self.usernames.remove(conn_id);
        self.roles.remove(conn_id);
    }
}

pub fn sanitize_symbol(raw: &str) -> String {
    let truncated: String = raw.trim().to_uppercase().chars().take(16).collect();
    if truncated.is_empty() {
        "A".to_string()
    } else {
        truncated
    }
}

pub fn sanitize_name(raw: &str, conn_id: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        let prefix: String = conn_id.chars().take(4).collect();
        format!("Player-{}", prefix)
    } else {
        trimmed.chars().take(24).collect()
    }
}

pub fn is_valid_code(code: &str) -> bool {
    code.len() == 4 && code.chars().all(|c| c.is_ascii_digit())
}

/// Process-wide `code -> session` map. Shared-read, exclusive-write on
/// creation/lookup; everything inside a session is then protected by that
/// session's own lock.
#[derive(Default)]
pub struct Registry {
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, code: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions.read().unwrap().get(code).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    /// Fetch the session for `code`, creating it with `init` if absent.
    /// Idempotent: a second call for the same code never re-runs `init`.
    pub fn get_or_create(&self, code: &str, init: impl FnOnce() -> Session) -> Arc<Mutex<Session>> {
        if let Some(existing) = self.get(code) {
            return existing;
        }
        let mut sessions = self.sessions.write().unwrap();
        if let Some(existing) = sessions.get(code) {
            return existing.clone();
        }
        let session = Arc::new(Mutex::new(init()));
        sessions.insert(code.to_string(), session.clone());
        session
    }
}
