//! Shared types for the HTTP and WebSocket layer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;

use crate::api::error::ApiError;
use crate::core_state::CoreState;
use crate::models::Principal;

/// How long a WebSocket upgrade ticket stays valid.
pub const WS_TICKET_TTL: Duration = Duration::from_secs(30);

// ═══════════════════════════════════════════════════════════
// API context: shared state for the router
// ═══════════════════════════════════════════════════════════

/// Shared context for all routes and middleware.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
    pub ws_tickets: Arc<Mutex<WsTicketStore>>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self {
            core,
            ws_tickets: Arc::new(Mutex::new(WsTicketStore::new())),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Current user: injected by the auth middleware
// ═══════════════════════════════════════════════════════════

/// The signed-in account behind a request.
///
/// Handlers that take a `CurrentUser` reject anonymous requests with 401.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub principal: Principal,
    pub username: String,
    pub token: String,
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(ApiError::Unauthorized)
    }
}

// ═══════════════════════════════════════════════════════════
// JSON body with 400 on malformed input
// ═══════════════════════════════════════════════════════════

/// `Json<T>` whose rejection is a 400 in the API error envelope.
pub struct JsonBody<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        Ok(Self(value))
    }
}

// ═══════════════════════════════════════════════════════════
// WS ticket store: one-time WebSocket upgrade tokens
// ═══════════════════════════════════════════════════════════

/// One-time WebSocket upgrade ticket.
/// Keeps the bearer token out of the upgrade URL.
struct WsTicket {
    principal: Principal,
    username: String,
    expires_at: Instant,
}

pub struct WsTicketStore {
    tickets: HashMap<String, WsTicket>,
}

impl WsTicketStore {
    pub fn new() -> Self {
        Self {
            tickets: HashMap::new(),
        }
    }

    /// Issue a one-time ticket for the given account.
    pub fn issue(&mut self, principal: Principal, username: String) -> String {
        self.cleanup();
        let ticket = uuid::Uuid::new_v4().to_string();
        self.tickets.insert(
            ticket.clone(),
            WsTicket {
                principal,
                username,
                expires_at: Instant::now() + WS_TICKET_TTL,
            },
        );
        ticket
    }

    /// Consume a ticket (one-time use).
    pub fn consume(&mut self, ticket: &str) -> Option<(Principal, String)> {
        let entry = self.tickets.remove(ticket)?;
        if Instant::now() > entry.expires_at {
            return None;
        }
        Some((entry.principal, entry.username))
    }

    fn cleanup(&mut self) {
        let now = Instant::now();
        self.tickets.retain(|_, t| now < t.expires_at);
    }
}

impl Default for WsTicketStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn ticket_is_single_use() {
        let mut store = WsTicketStore::new();
        let principal = Principal::Patient(Uuid::new_v4());
        let ticket = store.issue(principal, "ada".into());
        assert_eq!(store.consume(&ticket), Some((principal, "ada".to_string())));
        assert!(store.consume(&ticket).is_none());
    }

    #[test]
    fn unknown_ticket_is_rejected() {
        let mut store = WsTicketStore::new();
        assert!(store.consume("nope").is_none());
    }

    #[test]
    fn expired_ticket_is_rejected() {
        let mut store = WsTicketStore::new();
        let principal = Principal::Clinic(Uuid::new_v4());
        let ticket = store.issue(principal, "clinic".into());
        store.tickets.get_mut(&ticket).unwrap().expires_at = Instant::now() - Duration::from_secs(1);
        assert!(store.consume(&ticket).is_none());
    }
}
