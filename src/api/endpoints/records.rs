//! Medical records and the access ledger.
//!
//! Records belong to a patient. The patient always reads and writes them;
//! a clinic reads them only while it is in the patient's access set.
//!
//! - `POST /api/records`: patient adds a record
//! - `GET /api/records?patient_id=`: list a patient's records
//! - `GET /api/records/me`: the caller's own records
//! - `GET|PUT|DELETE /api/records/:id`
//! - `GET /api/records/clinic-access?patient_id=&clinic_id=`: membership check
//! - `DELETE /api/records/clinic-access?clinic_id=`: patient revokes a clinic

use axum::extract::{Path, Query, State};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::accounts;
use crate::api::error::{ApiError, ApiResponse};
use crate::api::types::{ApiContext, CurrentUser, JsonBody};
use crate::booking::ledger;
use crate::booking::types::validate_text;
use crate::db::repository::*;
use crate::models::{MedicalRecord, Principal};

pub const MAX_SYMPTOMS_LEN: usize = 2500;
pub const MAX_DIAGNOSIS_LEN: usize = 25000;

const RECORD_NOT_FOUND: &str = "Medical record with given id not found";
const PATIENT_NOT_FOUND: &str = "User with given id does not exist";

#[derive(Debug, Deserialize)]
pub struct RecordBody {
    pub symptoms: String,
    pub diagnosis: String,
}

impl RecordBody {
    fn validate(&self) -> Result<(String, String), ApiError> {
        Ok((
            validate_text("symptoms", &self.symptoms, MAX_SYMPTOMS_LEN)?,
            validate_text("diagnosis", &self.diagnosis, MAX_DIAGNOSIS_LEN)?,
        ))
    }
}

#[derive(Debug, Deserialize)]
pub struct PatientQuery {
    pub patient_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AccessQuery {
    pub patient_id: Option<String>,
    pub clinic_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AccessStatus {
    pub patient_id: Uuid,
    pub clinic_id: Uuid,
    pub has_access: bool,
}

fn require_patient(user: &CurrentUser) -> Result<Uuid, ApiError> {
    match user.principal {
        Principal::Patient(id) => Ok(id),
        Principal::Clinic(_) => Err(ApiError::Forbidden("Only patients can do this".into())),
    }
}

fn required_id(raw: Option<&str>, field: &str) -> Result<Uuid, ApiError> {
    let raw = raw
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("\"{field}\" is required")))?;
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("\"{field}\" must be a valid id")))
}

/// Load a record and check it belongs to the calling patient.
fn load_owned(
    conn: &rusqlite::Connection,
    user: &CurrentUser,
    id: &str,
) -> Result<MedicalRecord, ApiError> {
    let patient_id = require_patient(user)?;
    let id = accounts::parse_account_id(id, RECORD_NOT_FOUND)?;
    let record = get_medical_record(conn, &id)?.ok_or(ApiError::NotFound(RECORD_NOT_FOUND.into()))?;
    if record.patient_id != patient_id {
        return Err(ApiError::Forbidden("You can only change your own medical records".into()));
    }
    Ok(record)
}

/// `POST /api/records`
pub async fn create(
    State(ctx): State<ApiContext>,
    user: CurrentUser,
    JsonBody(body): JsonBody<RecordBody>,
) -> Result<ApiResponse<MedicalRecord>, ApiError> {
    let patient_id = require_patient(&user)?;
    let (symptoms, diagnosis) = body.validate()?;

    let conn = ctx.core.open_db()?;
    if get_patient(&conn, &patient_id)?.is_none() {
        return Err(ApiError::NotFound(PATIENT_NOT_FOUND.into()));
    }

    let now = Utc::now();
    let record = MedicalRecord {
        id: Uuid::new_v4(),
        patient_id,
        symptoms,
        diagnosis,
        created_at: now,
        updated_at: now,
    };
    insert_medical_record(&conn, &record)?;

    tracing::info!(record_id = %record.id, patient_id = %patient_id, "Medical record created");
    Ok(ApiResponse::created("Medical record created successfully", record))
}

/// `GET /api/records?patient_id=`
pub async fn list(
    State(ctx): State<ApiContext>,
    user: CurrentUser,
    Query(query): Query<PatientQuery>,
) -> Result<ApiResponse<Vec<MedicalRecord>>, ApiError> {
    let patient_id = required_id(query.patient_id.as_deref(), "patient_id")?;
    let conn = ctx.core.open_db()?;
    if get_patient(&conn, &patient_id)?.is_none() {
        return Err(ApiError::NotFound(PATIENT_NOT_FOUND.into()));
    }
    ledger::authorize_record_read(&conn, &user.principal, &patient_id)?;

    let records = list_medical_records_for_patient(&conn, &patient_id)?;
    Ok(ApiResponse::ok("Medical records retrieved successfully", records))
}

/// `GET /api/records/me`
pub async fn mine(
    State(ctx): State<ApiContext>,
    user: CurrentUser,
) -> Result<ApiResponse<Vec<MedicalRecord>>, ApiError> {
    let patient_id = require_patient(&user)?;
    let conn = ctx.core.open_db()?;
    let records = list_medical_records_for_patient(&conn, &patient_id)?;
    Ok(ApiResponse::ok("Medical records retrieved successfully", records))
}

/// `GET /api/records/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<MedicalRecord>, ApiError> {
    let id = accounts::parse_account_id(&id, RECORD_NOT_FOUND)?;
    let conn = ctx.core.open_db()?;
    let record = get_medical_record(&conn, &id)?.ok_or(ApiError::NotFound(RECORD_NOT_FOUND.into()))?;
    ledger::authorize_record_read(&conn, &user.principal, &record.patient_id)?;
    Ok(ApiResponse::ok("Medical record retrieved successfully", record))
}

/// `PUT /api/records/:id`
pub async fn update(
    State(ctx): State<ApiContext>,
    user: CurrentUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<RecordBody>,
) -> Result<ApiResponse<MedicalRecord>, ApiError> {
    let (symptoms, diagnosis) = body.validate()?;
    let conn = ctx.core.open_db()?;
    let mut record = load_owned(&conn, &user, &id)?;

    record.symptoms = symptoms;
    record.diagnosis = diagnosis;
    record.updated_at = Utc::now();
    update_medical_record(&conn, &record)?;

    tracing::info!(record_id = %record.id, "Medical record updated");
    Ok(ApiResponse::ok("Medical record updated successfully", record))
}

/// `DELETE /api/records/:id`
pub async fn remove(
    State(ctx): State<ApiContext>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<MedicalRecord>, ApiError> {
    let conn = ctx.core.open_db()?;
    let record = load_owned(&conn, &user, &id)?;
    if !delete_medical_record(&conn, &record.id)? {
        return Err(ApiError::NotFound(RECORD_NOT_FOUND.into()));
    }

    tracing::info!(record_id = %record.id, "Medical record deleted");
    Ok(ApiResponse::ok("Medical record deleted successfully", record))
}

/// `GET /api/records/clinic-access?patient_id=&clinic_id=`
///
/// Either party may ask; nobody else.
pub async fn access_status(
    State(ctx): State<ApiContext>,
    user: CurrentUser,
    Query(query): Query<AccessQuery>,
) -> Result<ApiResponse<AccessStatus>, ApiError> {
    let patient_id = required_id(query.patient_id.as_deref(), "patient_id")?;
    let clinic_id = required_id(query.clinic_id.as_deref(), "clinic_id")?;
    if !user.principal.is_patient(&patient_id) && !user.principal.is_clinic(&clinic_id) {
        return Err(ApiError::NotAuthorized);
    }

    let conn = ctx.core.open_db()?;
    let has_access = ledger::has_access(&conn, &patient_id, &clinic_id)?;
    Ok(ApiResponse::ok(
        "Access status retrieved successfully",
        AccessStatus {
            patient_id,
            clinic_id,
            has_access,
        },
    ))
}

/// `DELETE /api/records/clinic-access?clinic_id=`
pub async fn revoke_access(
    State(ctx): State<ApiContext>,
    user: CurrentUser,
    Query(query): Query<AccessQuery>,
) -> Result<ApiResponse<()>, ApiError> {
    let patient_id = require_patient(&user)?;
    let clinic_id = required_id(query.clinic_id.as_deref(), "clinic_id")?;
    if let Some(raw) = query.patient_id.as_deref() {
        if required_id(Some(raw), "patient_id")? != patient_id {
            return Err(ApiError::Forbidden("You can only manage your own medical record access".into()));
        }
    }

    let conn = ctx.core.open_db()?;
    let clinic = ledger::revoke(&conn, &patient_id, &clinic_id)?;
    Ok(ApiResponse::message(format!(
        "{} has been removed from your medical record access",
        clinic.clinic_name
    )))
}
