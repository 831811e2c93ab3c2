//! Bearer token resolution.
//!
//! Extracts `Authorization: Bearer <token>` and resolves it against the
//! session store. A request without a token passes through anonymously;
//! handlers that need an account reject it via the `CurrentUser` extractor.
//! A token that is present but unknown or expired is rejected here.

use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, CurrentUser};

pub async fn resolve_session(req: Request<axum::body::Body>, next: Next) -> Response {
    match resolve_session_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn resolve_session_inner(
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let token = match bearer_token(&req) {
        Some(token) => token,
        None => return Ok(next.run(req).await),
    };

    let session = {
        let mut sessions = ctx.core.write_sessions()?;
        sessions.resolve(&token)
    }; // write guard dropped before any .await

    let session = session.ok_or_else(|| {
        tracing::debug!(path = %req.uri().path(), "Rejected unknown or expired token");
        ApiError::Unauthorized
    })?;

    req.extensions_mut().insert(CurrentUser {
        principal: session.principal,
        username: session.username,
        token,
    });

    Ok(next.run(req).await)
}

fn bearer_token<B>(req: &Request<B>) -> Option<String> {
    req.headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}
