//! Clinic account endpoints.
//!
//! - `POST /api/clinics`: register (public)
//! - `GET /api/clinics/search`, `/online`, `/rating/:id`: public reads
//! - `GET /api/clinics/record-access/:patient_id`: clinics holding access (that patient only)
//! - `GET /api/clinics`, `/me`, `/:id`: reads (signed in)
//! - `PUT|DELETE /api/clinics/:id`: owner only

use axum::extract::{Path, Query, State};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::accounts::{self, SearchQuery, MAX_BIO_LEN, MAX_LOCATION_LEN, MAX_NAME_LEN};
use crate::api::error::{ApiError, ApiResponse};
use crate::api::types::{ApiContext, CurrentUser, JsonBody};
use crate::booking::ledger;
use crate::booking::types::validate_text;
use crate::db::repository::*;
use crate::models::enums::AccountKind;
use crate::models::{AccountSummary, Clinic, Principal, DEFAULT_CLINIC_BIO};

const CLINIC_NOT_FOUND: &str = "Hospital with given id not found";

#[derive(Debug, Deserialize)]
pub struct RegisterClinic {
    pub clinic_name: String,
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateClinic {
    pub clinic_name: String,
    pub username: String,
    pub email: String,
    pub bio: String,
    pub location: String,
}

#[derive(Debug, Serialize)]
pub struct RatingResponse {
    pub clinic_id: Uuid,
    pub average_rating: f64,
}

/// `POST /api/clinics`
pub async fn register(
    State(ctx): State<ApiContext>,
    JsonBody(body): JsonBody<RegisterClinic>,
) -> Result<ApiResponse<AccountSummary>, ApiError> {
    let clinic_name = validate_text("clinic_name", &body.clinic_name, MAX_NAME_LEN)?;
    let sign_up = accounts::validate_sign_up(&body.username, &body.email, &body.password)?;

    {
        let conn = ctx.core.open_db()?;
        accounts::ensure_unique(&conn, AccountKind::Clinic, &sign_up.email, &sign_up.username, None)?;
    }

    let password_hash = accounts::hash_password(sign_up.password).await?;
    let now = Utc::now();
    let clinic = Clinic {
        id: Uuid::new_v4(),
        profile_picture: accounts::avatar_url(&sign_up.username),
        clinic_name,
        username: sign_up.username,
        email: sign_up.email,
        bio: DEFAULT_CLINIC_BIO.to_string(),
        location: String::new(),
        online: false,
        created_at: now,
        updated_at: now,
    };

    let conn = ctx.core.open_db()?;
    insert_clinic(&conn, &clinic, &password_hash).map_err(|e| {
        if e.is_unique_violation() {
            ApiError::BadRequest("Email or username already taken".into())
        } else {
            ApiError::from(e)
        }
    })?;

    tracing::info!(clinic_id = %clinic.id, "Clinic registered");
    Ok(ApiResponse::created("Hospital created successfully", AccountSummary::from(&clinic)))
}

/// `GET /api/clinics`
pub async fn list(
    State(ctx): State<ApiContext>,
    _user: CurrentUser,
) -> Result<ApiResponse<Vec<Clinic>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(ApiResponse::ok("Hospitals fetched successfully", list_clinics(&conn)?))
}

/// `GET /api/clinics/me`
pub async fn me(
    State(ctx): State<ApiContext>,
    user: CurrentUser,
) -> Result<ApiResponse<Clinic>, ApiError> {
    let Principal::Clinic(id) = user.principal else {
        return Err(ApiError::Forbidden("Only clinics have a clinic profile".into()));
    };
    let conn = ctx.core.open_db()?;
    let clinic = get_clinic(&conn, &id)?.ok_or(ApiError::NotFound(CLINIC_NOT_FOUND.into()))?;
    Ok(ApiResponse::ok("Hospital fetched successfully", clinic))
}

/// `GET /api/clinics/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    _user: CurrentUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<Clinic>, ApiError> {
    let id = accounts::parse_account_id(&id, CLINIC_NOT_FOUND)?;
    let conn = ctx.core.open_db()?;
    let clinic = get_clinic(&conn, &id)?.ok_or(ApiError::NotFound(CLINIC_NOT_FOUND.into()))?;
    Ok(ApiResponse::ok("Hospital fetched successfully", clinic))
}

/// `GET /api/clinics/search`
pub async fn search(
    State(ctx): State<ApiContext>,
    Query(query): Query<SearchQuery>,
) -> Result<ApiResponse<Vec<Clinic>>, ApiError> {
    let term = query.term()?;
    let conn = ctx.core.open_db()?;
    let found = search_clinics(&conn, &term)?;
    if found.is_empty() {
        return Err(ApiError::Empty("No hospitals found".into()));
    }
    Ok(ApiResponse::ok("Hospitals fetched successfully", found))
}

/// `GET /api/clinics/online`
pub async fn online(State(ctx): State<ApiContext>) -> Result<ApiResponse<Vec<AccountSummary>>, ApiError> {
    let conn = ctx.core.open_db()?;
    let online = list_online_clinics(&conn)?.iter().map(AccountSummary::from).collect();
    Ok(ApiResponse::ok("Online hospitals fetched successfully", online))
}

/// `GET /api/clinics/rating/:id`
pub async fn rating(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<ApiResponse<RatingResponse>, ApiError> {
    let clinic_id = accounts::parse_account_id(&id, CLINIC_NOT_FOUND)?;
    let conn = ctx.core.open_db()?;
    if get_clinic(&conn, &clinic_id)?.is_none() {
        return Err(ApiError::NotFound(CLINIC_NOT_FOUND.into()));
    }
    let average_rating = average_rating(&conn, &clinic_id)?
        .ok_or(ApiError::Empty("No reviews found for this hospital".into()))?;
    Ok(ApiResponse::ok(
        "Hospital rating fetched successfully",
        RatingResponse {
            clinic_id,
            average_rating,
        },
    ))
}

/// `GET /api/clinics/record-access/:patient_id`
pub async fn with_record_access(
    State(ctx): State<ApiContext>,
    user: CurrentUser,
    Path(patient_id): Path<String>,
) -> Result<ApiResponse<Vec<Clinic>>, ApiError> {
    let patient_id = accounts::parse_account_id(&patient_id, "User with given id not found")?;
    if !user.principal.is_patient(&patient_id) {
        return Err(ApiError::Forbidden(
            "Only the patient can list who holds access to their records".into(),
        ));
    }
    let conn = ctx.core.open_db()?;
    let clinics = ledger::clinics_with_access(&conn, &patient_id)?;
    Ok(ApiResponse::ok("Hospitals fetched successfully", clinics))
}

/// `PUT /api/clinics/:id`
pub async fn update(
    State(ctx): State<ApiContext>,
    user: CurrentUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<UpdateClinic>,
) -> Result<ApiResponse<Clinic>, ApiError> {
    let id = accounts::parse_account_id(&id, CLINIC_NOT_FOUND)?;
    if !user.principal.is_clinic(&id) {
        return Err(ApiError::Forbidden("You can only update your own profile".into()));
    }

    let clinic_name = validate_text("clinic_name", &body.clinic_name, MAX_NAME_LEN)?;
    let username = validate_text("username", &body.username, accounts::MAX_USERNAME_LEN)?;
    let email = accounts::validate_email(&body.email)?;
    let bio = validate_text("bio", &body.bio, MAX_BIO_LEN)?;
    let location = validate_text("location", &body.location, MAX_LOCATION_LEN)?;

    let conn = ctx.core.open_db()?;
    let mut clinic = get_clinic(&conn, &id)?.ok_or(ApiError::NotFound(CLINIC_NOT_FOUND.into()))?;
    accounts::ensure_unique(&conn, AccountKind::Clinic, &email, &username, Some(&id))?;

    clinic.clinic_name = clinic_name;
    clinic.username = username;
    clinic.email = email;
    clinic.bio = bio;
    clinic.location = location;
    clinic.updated_at = Utc::now();
    update_clinic(&conn, &clinic)?;

    tracing::info!(clinic_id = %id, "Clinic profile updated");
    Ok(ApiResponse::ok("Hospital details updated successfully", clinic))
}

/// `DELETE /api/clinics/:id`: also ends the account's sessions.
pub async fn remove(
    State(ctx): State<ApiContext>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<()>, ApiError> {
    let id = accounts::parse_account_id(&id, CLINIC_NOT_FOUND)?;
    if !user.principal.is_clinic(&id) {
        return Err(ApiError::Forbidden("You can only delete your own account".into()));
    }

    let conn = ctx.core.open_db()?;
    if !delete_account(&conn, AccountKind::Clinic, &id)? {
        return Err(ApiError::NotFound(CLINIC_NOT_FOUND.into()));
    }
    let ended = ctx.core.write_sessions()?.revoke_account(&id);
    accounts::broadcast_presence(&ctx, &conn, AccountKind::Clinic)?;

    tracing::info!(clinic_id = %id, sessions_ended = ended, "Clinic account deleted");
    Ok(ApiResponse::message("Hospital deleted successfully"))
}
