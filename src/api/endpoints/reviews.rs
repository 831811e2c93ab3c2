//! Clinic reviews written by patients.
//!
//! Reads are public. Writes need the authoring patient and broadcast
//! `newReview`, `updateReview` or `deleteReview`.

use axum::extract::{Path, State};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::accounts;
use crate::api::error::{ApiError, ApiResponse};
use crate::api::types::{ApiContext, CurrentUser, JsonBody};
use crate::booking::types::{parse_id, validate_text};
use crate::db::repository::*;
use crate::events::RealtimeEvent;
use crate::models::enums::AccountKind;
use crate::models::{Principal, Review};

pub const MAX_MESSAGE_LEN: usize = 1000;

const REVIEW_NOT_FOUND: &str = "Review with given id not found";
const NO_REVIEWS: &str = "No reviews found";

#[derive(Debug, Deserialize)]
pub struct CreateReview {
    pub message: String,
    pub rating: i64,
    pub clinic_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateReview {
    pub message: String,
    pub rating: i64,
}

fn validate_rating(rating: i64) -> Result<u8, ApiError> {
    match u8::try_from(rating) {
        Ok(r @ 1..=5) => Ok(r),
        _ => Err(ApiError::BadRequest("\"rating\" must be between 1 and 5".into())),
    }
}

/// Load a review and check the caller wrote it.
fn load_authored(conn: &rusqlite::Connection, user: &CurrentUser, id: &str) -> Result<Review, ApiError> {
    let Principal::Patient(patient_id) = user.principal else {
        return Err(ApiError::Forbidden("Only patients can change reviews".into()));
    };
    let id = accounts::parse_account_id(id, REVIEW_NOT_FOUND)?;
    let review = get_review(conn, &id)?.ok_or(ApiError::NotFound(REVIEW_NOT_FOUND.into()))?;
    if review.patient_id != patient_id {
        return Err(ApiError::Forbidden("You can only change your own reviews".into()));
    }
    Ok(review)
}

fn non_empty(reviews: Vec<Review>) -> Result<Vec<Review>, ApiError> {
    if reviews.is_empty() {
        return Err(ApiError::Empty(NO_REVIEWS.into()));
    }
    Ok(reviews)
}

/// `POST /api/reviews`
pub async fn create(
    State(ctx): State<ApiContext>,
    user: CurrentUser,
    JsonBody(body): JsonBody<CreateReview>,
) -> Result<ApiResponse<Review>, ApiError> {
    let Principal::Patient(patient_id) = user.principal else {
        return Err(ApiError::Forbidden("Only patients can write reviews".into()));
    };
    let message = validate_text("message", &body.message, MAX_MESSAGE_LEN)?;
    let rating = validate_rating(body.rating)?;
    let clinic_id = parse_id("clinic_id", &body.clinic_id)?;

    let conn = ctx.core.open_db()?;
    if get_clinic(&conn, &clinic_id)?.is_none() {
        return Err(ApiError::NotFound("Hospital with given id not found".into()));
    }

    let now = Utc::now();
    let review = Review {
        id: Uuid::new_v4(),
        message,
        rating,
        patient_id,
        clinic_id,
        created_at: now,
        updated_at: now,
    };
    insert_review(&conn, &review)?;

    tracing::info!(review_id = %review.id, clinic_id = %clinic_id, "Review created");
    ctx.core.events().publish_serialized(RealtimeEvent::NewReview, &review);
    Ok(ApiResponse::created("Review created successfully", review))
}

/// `GET /api/reviews`
pub async fn list(State(ctx): State<ApiContext>) -> Result<ApiResponse<Vec<Review>>, ApiError> {
    let conn = ctx.core.open_db()?;
    let reviews = non_empty(list_reviews(&conn)?)?;
    Ok(ApiResponse::ok("Reviews fetched successfully", reviews))
}

/// `GET /api/reviews/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<ApiResponse<Review>, ApiError> {
    let id = accounts::parse_account_id(&id, REVIEW_NOT_FOUND)?;
    let conn = ctx.core.open_db()?;
    let review = get_review(&conn, &id)?.ok_or(ApiError::NotFound(REVIEW_NOT_FOUND.into()))?;
    Ok(ApiResponse::ok("Review fetched successfully", review))
}

/// `GET /api/reviews/patient/:id`
pub async fn by_patient(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<ApiResponse<Vec<Review>>, ApiError> {
    let id = accounts::parse_account_id(&id, NO_REVIEWS)?;
    let conn = ctx.core.open_db()?;
    let reviews = non_empty(list_reviews_for(&conn, AccountKind::Patient, &id)?)?;
    Ok(ApiResponse::ok("Reviews fetched successfully", reviews))
}

/// `GET /api/reviews/clinic/:id`
pub async fn by_clinic(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<ApiResponse<Vec<Review>>, ApiError> {
    let id = accounts::parse_account_id(&id, NO_REVIEWS)?;
    let conn = ctx.core.open_db()?;
    let reviews = non_empty(list_reviews_for(&conn, AccountKind::Clinic, &id)?)?;
    Ok(ApiResponse::ok("Reviews fetched successfully", reviews))
}

/// `PUT /api/reviews/:id`
pub async fn update(
    State(ctx): State<ApiContext>,
    user: CurrentUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<UpdateReview>,
) -> Result<ApiResponse<Review>, ApiError> {
    let message = validate_text("message", &body.message, MAX_MESSAGE_LEN)?;
    let rating = validate_rating(body.rating)?;

    let conn = ctx.core.open_db()?;
    let mut review = load_authored(&conn, &user, &id)?;
    review.message = message;
    review.rating = rating;
    review.updated_at = Utc::now();
    update_review(&conn, &review)?;

    tracing::info!(review_id = %review.id, "Review updated");
    ctx.core.events().publish_serialized(RealtimeEvent::UpdateReview, &review);
    Ok(ApiResponse::ok("Review updated successfully", review))
}

/// `DELETE /api/reviews/:id`
pub async fn remove(
    State(ctx): State<ApiContext>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<Review>, ApiError> {
    let conn = ctx.core.open_db()?;
    let review = load_authored(&conn, &user, &id)?;
    if !delete_review(&conn, &review.id)? {
        return Err(ApiError::NotFound(REVIEW_NOT_FOUND.into()));
    }

    tracing::info!(review_id = %review.id, "Review deleted");
    ctx.core.events().publish_serialized(RealtimeEvent::DeleteReview, &review);
    Ok(ApiResponse::ok("Review deleted successfully", review))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_must_be_one_to_five() {
        assert!(validate_rating(0).is_err());
        assert!(validate_rating(6).is_err());
        assert!(validate_rating(-3).is_err());
        assert_eq!(validate_rating(1).unwrap(), 1);
        assert_eq!(validate_rating(5).unwrap(), 5);
    }
}
