//! Medical-record access ledger.
//!
//! A patient's access set lists the clinics allowed to read their records.
//! Granting is idempotent; revoking is an explicit patient action.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use super::error::BookingError;
use crate::db::repository::{
    delete_access_grant, get_clinic, get_patient, has_access_grant, insert_access_grant,
    list_access_grants,
};
use crate::models::{Clinic, Principal};

/// Add `clinic_id` to the patient's access set unless already present.
pub fn grant(
    conn: &Connection,
    patient_id: &Uuid,
    clinic_id: &Uuid,
    now: &DateTime<Utc>,
) -> Result<bool, BookingError> {
    let added = insert_access_grant(conn, patient_id, clinic_id, now)?;
    if added {
        tracing::info!(patient_id = %patient_id, clinic_id = %clinic_id, "Medical record access granted");
    } else {
        tracing::debug!(patient_id = %patient_id, clinic_id = %clinic_id, "Clinic already in access set");
    }
    Ok(added)
}

/// Remove a clinic from the patient's access set.
///
/// Both accounts must exist. Returns the clinic for the confirmation message.
pub fn revoke(conn: &Connection, patient_id: &Uuid, clinic_id: &Uuid) -> Result<Clinic, BookingError> {
    if get_patient(conn, patient_id)?.is_none() {
        return Err(BookingError::NotFound("User not found".into()));
    }
    let clinic = get_clinic(conn, clinic_id)?
        .ok_or_else(|| BookingError::NotFound("Hospital not found".into()))?;

    if delete_access_grant(conn, patient_id, clinic_id)? {
        tracing::info!(patient_id = %patient_id, clinic_id = %clinic_id, "Medical record access revoked");
    }
    Ok(clinic)
}

pub fn has_access(conn: &Connection, patient_id: &Uuid, clinic_id: &Uuid) -> Result<bool, BookingError> {
    Ok(has_access_grant(conn, patient_id, clinic_id)?)
}

/// Clinics currently allowed to read the patient's records.
///
/// Grants naming deleted clinics are skipped.
pub fn clinics_with_access(conn: &Connection, patient_id: &Uuid) -> Result<Vec<Clinic>, BookingError> {
    if get_patient(conn, patient_id)?.is_none() {
        return Err(BookingError::NotFound("User not found".into()));
    }
    let mut clinics = Vec::new();
    for grant in list_access_grants(conn, patient_id)? {
        if let Some(clinic) = get_clinic(conn, &grant.clinic_id)? {
            clinics.push(clinic);
        }
    }
    Ok(clinics)
}

/// A patient reads their own records; a clinic needs a grant.
pub fn authorize_record_read(
    conn: &Connection,
    principal: &Principal,
    patient_id: &Uuid,
) -> Result<(), BookingError> {
    match principal {
        Principal::Patient(id) if id == patient_id => Ok(()),
        Principal::Patient(_) => Err(BookingError::Forbidden(
            "You can only view your own medical records".into(),
        )),
        Principal::Clinic(clinic_id) => {
            if has_access_grant(conn, patient_id, clinic_id)? {
                Ok(())
            } else {
                Err(BookingError::Forbidden(
                    "Hospital doesn't have access to view user medical record".into(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures;
    use crate::db::sqlite::open_memory_database;

    #[test]
    fn grant_then_revoke_round_trip() {
        let conn = open_memory_database().unwrap();
        let patient = fixtures::patient(&conn, "ada");
        let clinic = fixtures::clinic(&conn, "harbor");
        let now = Utc::now();

        assert!(grant(&conn, &patient.id, &clinic.id, &now).unwrap());
        assert!(!grant(&conn, &patient.id, &clinic.id, &now).unwrap());
        assert_eq!(list_access_grants(&conn, &patient.id).unwrap().len(), 1);
        assert!(has_access(&conn, &patient.id, &clinic.id).unwrap());

        let removed = revoke(&conn, &patient.id, &clinic.id).unwrap();
        assert_eq!(removed.id, clinic.id);
        assert!(!has_access(&conn, &patient.id, &clinic.id).unwrap());
    }

    #[test]
    fn revoke_requires_both_accounts() {
        let conn = open_memory_database().unwrap();
        let patient = fixtures::patient(&conn, "ada");
        let clinic = fixtures::clinic(&conn, "harbor");

        let err = revoke(&conn, &Uuid::new_v4(), &clinic.id).unwrap_err();
        assert_eq!(err.to_string(), "User not found");
        let err = revoke(&conn, &patient.id, &Uuid::new_v4()).unwrap_err();
        assert_eq!(err.to_string(), "Hospital not found");
    }

    #[test]
    fn clinic_reads_need_a_grant() {
        let conn = open_memory_database().unwrap();
        let patient = fixtures::patient(&conn, "ada");
        let clinic = fixtures::clinic(&conn, "harbor");
        let as_clinic = Principal::Clinic(clinic.id);

        assert!(matches!(
            authorize_record_read(&conn, &as_clinic, &patient.id),
            Err(BookingError::Forbidden(_))
        ));
        grant(&conn, &patient.id, &clinic.id, &Utc::now()).unwrap();
        assert!(authorize_record_read(&conn, &as_clinic, &patient.id).is_ok());
        assert!(authorize_record_read(&conn, &Principal::Patient(patient.id), &patient.id).is_ok());
        assert!(authorize_record_read(&conn, &Principal::Patient(Uuid::new_v4()), &patient.id).is_err());
    }

    #[test]
    fn access_list_skips_deleted_clinics() {
        let conn = open_memory_database().unwrap();
        let patient = fixtures::patient(&conn, "ada");
        let kept = fixtures::clinic(&conn, "harbor");
        let now = Utc::now();
        grant(&conn, &patient.id, &kept.id, &now).unwrap();
        grant(&conn, &patient.id, &Uuid::new_v4(), &now).unwrap();

        let clinics = clinics_with_access(&conn, &patient.id).unwrap();
        assert_eq!(clinics.len(), 1);
        assert_eq!(clinics[0].id, kept.id);
    }
}
