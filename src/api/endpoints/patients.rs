//! Patient account endpoints.
//!
//! - `POST /api/patients`: register (public)
//! - `GET /api/patients/search?searchTerm=`: search by name or username (public)
//! - `GET /api/patients/online`: presence list (public)
//! - `GET /api/patients`, `/me`, `/:id`: reads (signed in)
//! - `PUT|DELETE /api/patients/:id`: owner only

use axum::extract::{Path, Query, State};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::accounts::{self, SearchQuery, MAX_BIO_LEN, MAX_LOCATION_LEN, MAX_NAME_LEN};
use crate::api::error::{ApiError, ApiResponse};
use crate::api::types::{ApiContext, CurrentUser, JsonBody};
use crate::booking::types::validate_text;
use crate::db::repository::*;
use crate::models::enums::AccountKind;
use crate::models::{AccountSummary, Patient, Principal};

const PATIENT_NOT_FOUND: &str = "User with given id not found";

#[derive(Debug, Deserialize)]
pub struct RegisterPatient {
    pub name: String,
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePatient {
    pub name: String,
    pub username: String,
    pub email: String,
    pub bio: String,
    pub location: String,
}

/// `POST /api/patients`
pub async fn register(
    State(ctx): State<ApiContext>,
    JsonBody(body): JsonBody<RegisterPatient>,
) -> Result<ApiResponse<AccountSummary>, ApiError> {
    let name = validate_text("name", &body.name, MAX_NAME_LEN)?;
    let sign_up = accounts::validate_sign_up(&body.username, &body.email, &body.password)?;

    {
        let conn = ctx.core.open_db()?;
        accounts::ensure_unique(&conn, AccountKind::Patient, &sign_up.email, &sign_up.username, None)?;
    }

    let password_hash = accounts::hash_password(sign_up.password).await?;
    let now = Utc::now();
    let patient = Patient {
        id: Uuid::new_v4(),
        profile_picture: accounts::avatar_url(&sign_up.username),
        name,
        username: sign_up.username,
        email: sign_up.email,
        bio: None,
        location: String::new(),
        online: false,
        created_at: now,
        updated_at: now,
    };

    let conn = ctx.core.open_db()?;
    insert_patient(&conn, &patient, &password_hash).map_err(|e| {
        if e.is_unique_violation() {
            ApiError::BadRequest("Email or username already taken".into())
        } else {
            ApiError::from(e)
        }
    })?;

    tracing::info!(patient_id = %patient.id, "Patient registered");
    Ok(ApiResponse::created("User created successfully", AccountSummary::from(&patient)))
}

/// `GET /api/patients`
pub async fn list(
    State(ctx): State<ApiContext>,
    _user: CurrentUser,
) -> Result<ApiResponse<Vec<Patient>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(ApiResponse::ok("Users fetched successfully", list_patients(&conn)?))
}

/// `GET /api/patients/me`
pub async fn me(
    State(ctx): State<ApiContext>,
    user: CurrentUser,
) -> Result<ApiResponse<Patient>, ApiError> {
    let Principal::Patient(id) = user.principal else {
        return Err(ApiError::Forbidden("Only patients have a patient profile".into()));
    };
    let conn = ctx.core.open_db()?;
    let patient = get_patient(&conn, &id)?.ok_or(ApiError::NotFound(PATIENT_NOT_FOUND.into()))?;
    Ok(ApiResponse::ok("User fetched successfully", patient))
}

/// `GET /api/patients/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    _user: CurrentUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<Patient>, ApiError> {
    let id = accounts::parse_account_id(&id, PATIENT_NOT_FOUND)?;
    let conn = ctx.core.open_db()?;
    let patient = get_patient(&conn, &id)?.ok_or(ApiError::NotFound(PATIENT_NOT_FOUND.into()))?;
    Ok(ApiResponse::ok("User fetched successfully", patient))
}

/// `GET /api/patients/search`
pub async fn search(
    State(ctx): State<ApiContext>,
    Query(query): Query<SearchQuery>,
) -> Result<ApiResponse<Vec<Patient>>, ApiError> {
    let term = query.term()?;
    let conn = ctx.core.open_db()?;
    let found = search_patients(&conn, &term)?;
    if found.is_empty() {
        return Err(ApiError::Empty("No users found".into()));
    }
    Ok(ApiResponse::ok("User fetched successfully", found))
}

/// `GET /api/patients/online`
pub async fn online(State(ctx): State<ApiContext>) -> Result<ApiResponse<Vec<AccountSummary>>, ApiError> {
    let conn = ctx.core.open_db()?;
    let online = list_online_patients(&conn)?.iter().map(AccountSummary::from).collect();
    Ok(ApiResponse::ok("Online users fetched successfully", online))
}

/// `PUT /api/patients/:id`
pub async fn update(
    State(ctx): State<ApiContext>,
    user: CurrentUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<UpdatePatient>,
) -> Result<ApiResponse<Patient>, ApiError> {
    let id = accounts::parse_account_id(&id, PATIENT_NOT_FOUND)?;
    if !user.principal.is_patient(&id) {
        return Err(ApiError::Forbidden("You can only update your own profile".into()));
    }

    let name = validate_text("name", &body.name, MAX_NAME_LEN)?;
    let username = validate_text("username", &body.username, accounts::MAX_USERNAME_LEN)?;
    let email = accounts::validate_email(&body.email)?;
    let bio = validate_text("bio", &body.bio, MAX_BIO_LEN)?;
    let location = validate_text("location", &body.location, MAX_LOCATION_LEN)?;

    let conn = ctx.core.open_db()?;
    let mut patient = get_patient(&conn, &id)?.ok_or(ApiError::NotFound(PATIENT_NOT_FOUND.into()))?;
    accounts::ensure_unique(&conn, AccountKind::Patient, &email, &username, Some(&id))?;

    patient.name = name;
    patient.username = username;
    patient.email = email;
    patient.bio = Some(bio);
    patient.location = location;
    patient.updated_at = Utc::now();
    update_patient(&conn, &patient)?;

    tracing::info!(patient_id = %id, "Patient profile updated");
    Ok(ApiResponse::ok("User details updated successfully", patient))
}

/// `DELETE /api/patients/:id`: also ends the account's sessions.
pub async fn remove(
    State(ctx): State<ApiContext>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<()>, ApiError> {
    let id = accounts::parse_account_id(&id, PATIENT_NOT_FOUND)?;
    if !user.principal.is_patient(&id) {
        return Err(ApiError::Forbidden("You can only delete your own account".into()));
    }

    let conn = ctx.core.open_db()?;
    if !delete_account(&conn, AccountKind::Patient, &id)? {
        return Err(ApiError::NotFound(PATIENT_NOT_FOUND.into()));
    }
    let ended = ctx.core.write_sessions()?.revoke_account(&id);
    accounts::broadcast_presence(&ctx, &conn, AccountKind::Patient)?;

    tracing::info!(patient_id = %id, sessions_ended = ended, "Patient account deleted");
    Ok(ApiResponse::message("User deleted successfully"))
}
