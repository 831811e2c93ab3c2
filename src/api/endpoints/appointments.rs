//! Appointment endpoints. All logic lives in `AppointmentService`.
//!
//! Commands:
//! - `POST /api/appointments`: patient books
//! - `PUT /api/appointments/:id`: patient edits a non-failed appointment
//! - `PUT /api/appointments/cancel/:id`: either party cancels a pending one
//! - `PUT /api/appointments/approve/:id`: clinic approves; emails both parties
//! - `DELETE /api/appointments/:id`: either party deletes
//!
//! Queries: `GET /api/appointments`, `/:id`, `/patient/:id`, `/clinic/:id`,
//! `/latest/:id?limit=&user_type=`.

use axum::extract::{Path, Query, State};
use serde::Deserialize;

use super::accounts;
use crate::api::error::{ApiError, ApiResponse};
use crate::api::types::{ApiContext, CurrentUser, JsonBody};
use crate::booking::{CreateAppointment, UpdateAppointment};
use crate::models::enums::AccountKind;
use crate::models::Appointment;

#[derive(Debug, Deserialize)]
pub struct LatestQuery {
    pub limit: Option<u32>,
    #[serde(alias = "userType")]
    pub user_type: Option<String>,
}

/// `POST /api/appointments`
pub async fn create(
    State(ctx): State<ApiContext>,
    user: CurrentUser,
    JsonBody(body): JsonBody<CreateAppointment>,
) -> Result<ApiResponse<Appointment>, ApiError> {
    let appt = ctx.core.appointments().create(&user.principal, &body)?;
    Ok(ApiResponse::created("Appointment created successfully", appt))
}

/// `GET /api/appointments`
pub async fn list(
    State(ctx): State<ApiContext>,
    _user: CurrentUser,
) -> Result<ApiResponse<Vec<Appointment>>, ApiError> {
    let all = ctx.core.appointments().list_all()?;
    Ok(ApiResponse::ok("Appointments fetched successfully", all))
}

/// `GET /api/appointments/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    _user: CurrentUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<Appointment>, ApiError> {
    let appt = ctx.core.appointments().get(&id)?;
    Ok(ApiResponse::ok("Appointment fetched successfully", appt))
}

/// `GET /api/appointments/patient/:id`
pub async fn for_patient(
    State(ctx): State<ApiContext>,
    _user: CurrentUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<Vec<Appointment>>, ApiError> {
    let appts = ctx.core.appointments().list_for(AccountKind::Patient, &id)?;
    Ok(ApiResponse::ok("Appointments fetched successfully", appts))
}

/// `GET /api/appointments/clinic/:id`
pub async fn for_clinic(
    State(ctx): State<ApiContext>,
    _user: CurrentUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<Vec<Appointment>>, ApiError> {
    let appts = ctx.core.appointments().list_for(AccountKind::Clinic, &id)?;
    Ok(ApiResponse::ok("Appointments fetched successfully", appts))
}

/// `GET /api/appointments/latest/:id`
pub async fn latest(
    State(ctx): State<ApiContext>,
    _user: CurrentUser,
    Path(id): Path<String>,
    Query(query): Query<LatestQuery>,
) -> Result<ApiResponse<Vec<Appointment>>, ApiError> {
    let limit = query
        .limit
        .ok_or(ApiError::BadRequest("\"limit\" is required".into()))?;
    let kind = query
        .user_type
        .as_deref()
        .and_then(accounts::parse_account_kind)
        .ok_or(ApiError::BadRequest("\"userType\" must be one of [user, hospital]".into()))?;

    let appts = ctx.core.appointments().latest_for(kind, &id, limit)?;
    if appts.is_empty() {
        return Ok(ApiResponse::ok("No latest appointments found!", appts));
    }
    Ok(ApiResponse::ok("Latest appointments fetched successfully", appts))
}

/// `PUT /api/appointments/:id`
pub async fn update(
    State(ctx): State<ApiContext>,
    user: CurrentUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<UpdateAppointment>,
) -> Result<ApiResponse<Appointment>, ApiError> {
    let appt = ctx.core.appointments().update(&user.principal, &id, &body)?;
    Ok(ApiResponse::ok("Appointment updated successfully", appt))
}

/// `PUT /api/appointments/cancel/:id`
pub async fn cancel(
    State(ctx): State<ApiContext>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<Appointment>, ApiError> {
    let appt = ctx.core.appointments().cancel(&user.principal, &id)?;
    Ok(ApiResponse::ok("Appointment cancelled successfully", appt))
}

/// `PUT /api/appointments/approve/:id`
pub async fn approve(
    State(ctx): State<ApiContext>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<Appointment>, ApiError> {
    let appt = ctx.core.appointments().approve(&user.principal, &id).await?;
    Ok(ApiResponse::ok("Appointment approved successfully", appt))
}

/// `DELETE /api/appointments/:id`
pub async fn remove(
    State(ctx): State<ApiContext>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<Appointment>, ApiError> {
    let appt = ctx.core.appointments().delete(&user.principal, &id)?;
    Ok(ApiResponse::ok("Appointment deleted successfully", appt))
}
