//! `GET /api/rooms/token?patient_id=&clinic_id=`: chat room id for a
//! patient/clinic pair. Only the two parties may have it.

use axum::extract::Query;
use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResponse};
use crate::api::types::CurrentUser;
use crate::booking::types::parse_id;
use crate::models::RoomId;

#[derive(Debug, Deserialize)]
pub struct RoomQuery {
    #[serde(alias = "userId")]
    pub patient_id: String,
    #[serde(alias = "hospitalId")]
    pub clinic_id: String,
}

#[derive(Debug, Serialize)]
pub struct RoomToken {
    pub room_id: String,
}

pub async fn token(
    user: CurrentUser,
    Query(query): Query<RoomQuery>,
) -> Result<ApiResponse<RoomToken>, ApiError> {
    let room = RoomId::new(
        parse_id("patient_id", &query.patient_id)?,
        parse_id("clinic_id", &query.clinic_id)?,
    );
    if !user.principal.is_patient(&room.patient_id) && !user.principal.is_clinic(&room.clinic_id) {
        return Err(ApiError::NotAuthorized);
    }
    Ok(ApiResponse::ok(
        "Room token generated successfully",
        RoomToken {
            room_id: room.to_string(),
        },
    ))
}
