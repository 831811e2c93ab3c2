//! Bearer-token sessions.
//!
//! Tokens live only in memory as SHA-256 hashes. A restart signs everyone out.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::credentials::{generate_token, hash_token};
use crate::models::Principal;

/// One signed-in account.
#[derive(Debug, Clone)]
pub struct Session {
    pub principal: Principal,
    pub username: String,
    expires_at: Instant,
}

impl Session {
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

pub struct SessionStore {
    sessions: HashMap<[u8; 32], Session>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            ttl,
        }
    }

    /// Start a session and return its bearer token.
    pub fn issue(&mut self, principal: Principal, username: String) -> String {
        self.cleanup();
        let token = generate_token();
        self.sessions.insert(
            hash_token(&token),
            Session {
                principal,
                username,
                expires_at: Instant::now() + self.ttl,
            },
        );
        token
    }

    /// Look up a live session. Expired sessions are dropped on sight.
    pub fn resolve(&mut self, token: &str) -> Option<Session> {
        let key = hash_token(token);
        let session = self.sessions.get(&key)?;
        if Instant::now() >= session.expires_at {
            self.sessions.remove(&key);
            return None;
        }
        Some(session.clone())
    }

    pub fn revoke(&mut self, token: &str) -> Option<Session> {
        self.sessions.remove(&hash_token(token))
    }

    /// End every session of an account (e.g. after deletion). Returns how many ended.
    pub fn revoke_account(&mut self, account_id: &Uuid) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| &s.principal.id() != account_id);
        before - self.sessions.len()
    }

    pub fn active_count(&self) -> usize {
        let now = Instant::now();
        self.sessions.values().filter(|s| now < s.expires_at).count()
    }

    fn cleanup(&mut self) {
        let now = Instant::now();
        self.sessions.retain(|_, s| now < s.expires_at);
    }
}
