use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{ts_from_db, ts_to_db, uuid_from_db};
use crate::db::DatabaseError;
use crate::models::AccessGrant;

/// Add a clinic to a patient's access set.
///
/// Returns true when the grant is new, false when the clinic was already present.
pub fn insert_access_grant(
    conn: &Connection,
    patient_id: &Uuid,
    clinic_id: &Uuid,
    granted_at: &DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let rows = conn.execute(
        "INSERT OR IGNORE INTO medical_record_access (patient_id, clinic_id, granted_at)
         VALUES (?1, ?2, ?3)",
        params![patient_id.to_string(), clinic_id.to_string(), ts_to_db(granted_at)],
    )?;
    Ok(rows > 0)
}

/// Remove a clinic from a patient's access set. Returns false if it was absent.
pub fn delete_access_grant(
    conn: &Connection,
    patient_id: &Uuid,
    clinic_id: &Uuid,
) -> Result<bool, DatabaseError> {
    let rows = conn.execute(
        "DELETE FROM medical_record_access WHERE patient_id = ?1 AND clinic_id = ?2",
        params![patient_id.to_string(), clinic_id.to_string()],
    )?;
    Ok(rows > 0)
}

pub fn has_access_grant(
    conn: &Connection,
    patient_id: &Uuid,
    clinic_id: &Uuid,
) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM medical_record_access WHERE patient_id = ?1 AND clinic_id = ?2",
        params![patient_id.to_string(), clinic_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// The access set of a patient in grant order.
pub fn list_access_grants(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<AccessGrant>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT patient_id, clinic_id, granted_at FROM medical_record_access
         WHERE patient_id = ?1 ORDER BY granted_at, clinic_id",
    )?;
    let rows = stmt.query_map(params![patient_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    let mut grants = Vec::new();
    for row in rows {
        let (patient, clinic, granted_at) = row?;
        grants.push(AccessGrant {
            patient_id: uuid_from_db(&patient)?,
            clinic_id: uuid_from_db(&clinic)?,
            granted_at: ts_from_db(&granted_at)?,
        });
    }
    Ok(grants)
}
