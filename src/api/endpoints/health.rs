//! Health check endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub name: &'static str,
    pub version: &'static str,
    pub database: bool,
    pub realtime_clients: usize,
}

/// `GET /api/health`
pub async fn check(State(ctx): State<ApiContext>) -> Result<Json<HealthResponse>, ApiError> {
    let database = ctx
        .core
        .open_db()
        .and_then(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))
                .map_err(|e| crate::core_state::CoreError::Database(e.into()))
        })
        .is_ok();

    Ok(Json(HealthResponse {
        status: if database { "ok" } else { "degraded" },
        name: crate::config::APP_NAME,
        version: crate::config::APP_VERSION,
        database,
        realtime_clients: ctx.core.events().subscriber_count(),
    }))
}
