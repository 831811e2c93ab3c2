//! Sign-in, sign-out and WebSocket tickets.
//!
//! `POST /api/auth/login`: public: email + password → bearer token
//! `POST /api/auth/logout`: ends the calling session
//! `POST /api/auth/ws-ticket`: one-time WebSocket upgrade ticket

use axum::extract::State;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::accounts;
use crate::api::error::{ApiError, ApiResponse};
use crate::api::types::{ApiContext, CurrentUser, JsonBody, WS_TICKET_TTL};
use crate::db::repository::*;
use crate::events::RealtimeEvent;
use crate::models::enums::AccountKind;
use crate::models::{AccountSummary, Principal};

const INVALID_CREDENTIALS: &str = "Invalid credentials";

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    /// `user`/`patient` or `hospital`/`clinic`.
    #[serde(alias = "user_type")]
    pub account_kind: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub account_kind: AccountKind,
    pub expires_in: u64,
    pub account: Value,
}

#[derive(Debug, Serialize)]
pub struct WsTicketResponse {
    pub ticket: String,
    pub expires_in: u64,
}

/// `POST /api/auth/login`
pub async fn login(
    State(ctx): State<ApiContext>,
    JsonBody(body): JsonBody<LoginRequest>,
) -> Result<ApiResponse<LoginResponse>, ApiError> {
    let kind = accounts::parse_account_kind(&body.account_kind).ok_or(ApiError::BadRequest(
        "\"account_kind\" must be one of [user, hospital]".into(),
    ))?;
    let email = body.email.trim().to_lowercase();
    if email.is_empty() || body.password.is_empty() {
        return Err(ApiError::BadRequest(INVALID_CREDENTIALS.into()));
    }

    let credentials = {
        let conn = ctx.core.open_db()?;
        find_credentials(&conn, kind, &email)?
    };
    let (id, stored_hash) = credentials.ok_or(ApiError::BadRequest(INVALID_CREDENTIALS.into()))?;
    if !accounts::verify_password(body.password, stored_hash).await? {
        tracing::info!(account_kind = %kind, "Login rejected");
        return Err(ApiError::BadRequest(INVALID_CREDENTIALS.into()));
    }

    let conn = ctx.core.open_db()?;
    set_online(&conn, kind, &id, true)?;
    let (username, account, summary) = match kind {
        AccountKind::Patient => {
            let patient = get_patient(&conn, &id)?.ok_or(ApiError::BadRequest(INVALID_CREDENTIALS.into()))?;
            let summary = AccountSummary::from(&patient);
            (patient.username.clone(), to_value(&patient)?, summary)
        }
        AccountKind::Clinic => {
            let clinic = get_clinic(&conn, &id)?.ok_or(ApiError::BadRequest(INVALID_CREDENTIALS.into()))?;
            let summary = AccountSummary::from(&clinic);
            (clinic.username.clone(), to_value(&clinic)?, summary)
        }
    };

    let token = ctx
        .core
        .write_sessions()?
        .issue(Principal::new(kind, id), username);

    if kind == AccountKind::Patient {
        ctx.core.events().publish_serialized(RealtimeEvent::UserLogin, &summary);
    }
    accounts::broadcast_presence(&ctx, &conn, kind)?;

    tracing::info!(account_id = %id, account_kind = %kind, "Signed in");
    Ok(ApiResponse::ok(
        "Login successful",
        LoginResponse {
            token,
            account_kind: kind,
            expires_in: ctx.core.config().session_ttl.as_secs(),
            account,
        },
    ))
}

/// `POST /api/auth/logout`
pub async fn logout(
    State(ctx): State<ApiContext>,
    user: CurrentUser,
) -> Result<ApiResponse<()>, ApiError> {
    ctx.core.write_sessions()?.revoke(&user.token);

    let principal = user.principal;
    let conn = ctx.core.open_db()?;
    set_online(&conn, principal.kind(), &principal.id(), false)?;
    ctx.core
        .events()
        .publish_serialized(RealtimeEvent::UserLogout, &principal);
    accounts::broadcast_presence(&ctx, &conn, principal.kind())?;

    tracing::info!(account_id = %principal.id(), "Signed out");
    Ok(ApiResponse::message("Logout successful"))
}

/// `POST /api/auth/ws-ticket`
pub async fn ws_ticket(
    State(ctx): State<ApiContext>,
    user: CurrentUser,
) -> Result<ApiResponse<WsTicketResponse>, ApiError> {
    let ticket = {
        let mut tickets = ctx
            .ws_tickets
            .lock()
            .map_err(|_| ApiError::Internal("ticket lock".into()))?;
        tickets.issue(user.principal, user.username)
    };

    Ok(ApiResponse::ok(
        "Ticket issued",
        WsTicketResponse {
            ticket,
            expires_in: WS_TICKET_TTL.as_secs(),
        },
    ))
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|e| ApiError::Internal(e.to_string()))
}
