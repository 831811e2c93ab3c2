//! `POST /api/appointments/webhook`: signed video-session events.
//!
//! The body is read raw so the signature covers the exact bytes sent.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use serde_json::Value;

use crate::api::error::{ApiError, ApiResponse};
use crate::api::types::ApiContext;

pub async fn receive(
    State(ctx): State<ApiContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<ApiResponse<Value>, ApiError> {
    let signature = headers.get("Authorization").and_then(|v| v.to_str().ok());
    let event = ctx.core.webhook().verify(&body, signature)?;

    tracing::info!(
        event_type = event.get("type").and_then(|v| v.as_str()).unwrap_or("unknown"),
        "Video session event received"
    );
    ctx.core.appointments().relay_video_event(event.clone());
    Ok(ApiResponse::ok("Webhook received", event))
}
