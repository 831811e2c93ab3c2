//! Consistency check and repair for the per-account appointment lists.
//!
//! `GET /api/maintenance/consistency` reports to any signed-in account.
//! `POST` repairs and also needs the configured operator token in
//! `X-Operator-Token`.

use axum::extract::State;
use axum::http::HeaderMap;
use serde::Serialize;

use crate::api::error::{ApiError, ApiResponse};
use crate::api::types::{ApiContext, CurrentUser};
use crate::credentials::secrets_match;
use crate::db::repository::{check_consistency, repair_consistency, ConsistencyReport};

pub const OPERATOR_TOKEN_HEADER: &str = "X-Operator-Token";

#[derive(Debug, Serialize)]
pub struct RepairOutcome {
    pub repaired: usize,
    pub after: ConsistencyReport,
}

pub async fn check(
    State(ctx): State<ApiContext>,
    _user: CurrentUser,
) -> Result<ApiResponse<ConsistencyReport>, ApiError> {
    let conn = ctx.core.open_db()?;
    let report = check_consistency(&conn)?;
    if !report.is_clean() {
        tracing::warn!(issues = report.issues.len(), "Consistency check found issues");
    }
    Ok(ApiResponse::ok("Consistency check completed", report))
}

pub async fn repair(
    State(ctx): State<ApiContext>,
    user: CurrentUser,
    headers: HeaderMap,
) -> Result<ApiResponse<RepairOutcome>, ApiError> {
    let presented = headers.get(OPERATOR_TOKEN_HEADER).and_then(|v| v.to_str().ok());
    let authorized = match (presented, ctx.core.config().operator_token.as_deref()) {
        (Some(presented), Some(expected)) => secrets_match(presented, expected),
        _ => false,
    };
    if !authorized {
        tracing::warn!(by = %user.principal.id(), "Consistency repair refused");
        return Err(ApiError::Forbidden("Operator token required".into()));
    }

    let conn = ctx.core.open_db()?;
    let repaired = repair_consistency(&conn)?;
    let after = check_consistency(&conn)?;
    tracing::info!(repaired, by = %user.principal.id(), "Consistency repair ran");
    Ok(ApiResponse::ok("Consistency repair completed", RepairOutcome { repaired, after }))
}
