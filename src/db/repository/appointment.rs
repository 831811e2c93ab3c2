use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{ts_from_db, ts_to_db, uuid_from_db};
use crate::db::DatabaseError;
use crate::models::enums::{AccountKind, AppointmentStatus};
use crate::models::*;

const APPOINTMENT_COLUMNS: &str =
    "id, title, description, patient_id, clinic_id, start_at, end_at, status, created_at, updated_at";

pub fn insert_appointment(conn: &Connection, appt: &Appointment) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO appointments (id, title, description, patient_id, clinic_id, start_at,
         end_at, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            appt.id.to_string(),
            appt.title,
            appt.description,
            appt.patient_id.to_string(),
            appt.clinic_id.to_string(),
            ts_to_db(&appt.start_at),
            ts_to_db(&appt.end_at),
            appt.status.as_str(),
            ts_to_db(&appt.created_at),
            ts_to_db(&appt.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_appointment(conn: &Connection, id: &Uuid) -> Result<Option<Appointment>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?1"),
            params![id.to_string()],
            read_appointment_row,
        )
        .optional()?;
    row.map(appointment_from_row).transpose()
}

pub fn list_appointments(conn: &Connection) -> Result<Vec<Appointment>, DatabaseError> {
    query_appointments(
        conn,
        &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments ORDER BY created_at DESC"),
        params![],
    )
}

/// Appointments owned by a patient or a clinic, newest first.
pub fn list_appointments_for(
    conn: &Connection,
    kind: AccountKind,
    account_id: &Uuid,
) -> Result<Vec<Appointment>, DatabaseError> {
    let column = owner_column(kind);
    query_appointments(
        conn,
        &format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE {column} = ?1
             ORDER BY created_at DESC"
        ),
        params![account_id.to_string()],
    )
}

/// The `limit` most recent appointments by start time (then last update).
pub fn list_latest_appointments(
    conn: &Connection,
    kind: AccountKind,
    account_id: &Uuid,
    limit: u32,
) -> Result<Vec<Appointment>, DatabaseError> {
    let column = owner_column(kind);
    query_appointments(
        conn,
        &format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE {column} = ?1
             ORDER BY start_at DESC, updated_at DESC LIMIT ?2"
        ),
        params![account_id.to_string(), limit],
    )
}

/// Non-failed appointments of a clinic whose window overlaps `[start, end)`.
pub fn find_overlapping_appointments(
    conn: &Connection,
    clinic_id: &Uuid,
    start: &DateTime<Utc>,
    end: &DateTime<Utc>,
    exclude: Option<&Uuid>,
) -> Result<Vec<Appointment>, DatabaseError> {
    let exclude = exclude.map(|id| id.to_string()).unwrap_or_default();
    query_appointments(
        conn,
        &format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments
             WHERE clinic_id = ?1 AND status != ?2 AND id != ?3
               AND start_at < ?5 AND end_at > ?4
             ORDER BY start_at"
        ),
        params![
            clinic_id.to_string(),
            AppointmentStatus::Failed.as_str(),
            exclude,
            ts_to_db(start),
            ts_to_db(end),
        ],
    )
}

/// Write title, description and window. Status is never touched here.
pub fn update_appointment_details(
    conn: &Connection,
    appt: &Appointment,
) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE appointments SET title = ?2, description = ?3, start_at = ?4, end_at = ?5,
         updated_at = ?6
         WHERE id = ?1",
        params![
            appt.id.to_string(),
            appt.title,
            appt.description,
            ts_to_db(&appt.start_at),
            ts_to_db(&appt.end_at),
            ts_to_db(&appt.updated_at),
        ],
    )?;
    if rows == 0 {
        return Err(not_found(&appt.id));
    }
    Ok(())
}

pub fn update_appointment_status(
    conn: &Connection,
    id: &Uuid,
    status: AppointmentStatus,
    updated_at: &DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE appointments SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![id.to_string(), status.as_str(), ts_to_db(updated_at)],
    )?;
    if rows == 0 {
        return Err(not_found(id));
    }
    Ok(())
}

/// Move `expected -> next` only if the row still holds `expected`.
/// Returns false when the status changed underneath the caller.
pub fn transition_appointment_status(
    conn: &Connection,
    id: &Uuid,
    expected: AppointmentStatus,
    next: AppointmentStatus,
    updated_at: &DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let rows = conn.execute(
        "UPDATE appointments SET status = ?3, updated_at = ?4 WHERE id = ?1 AND status = ?2",
        params![
            id.to_string(),
            expected.as_str(),
            next.as_str(),
            ts_to_db(updated_at)
        ],
    )?;
    Ok(rows > 0)
}

pub fn delete_appointment(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "DELETE FROM appointments WHERE id = ?1",
        params![id.to_string()],
    )?;
    if rows == 0 {
        return Err(not_found(id));
    }
    Ok(())
}

// ─── Per-account appointment lists ───

fn list_table(kind: AccountKind) -> (&'static str, &'static str) {
    match kind {
        AccountKind::Patient => ("patient_appointments", "patient_id"),
        AccountKind::Clinic => ("clinic_appointments", "clinic_id"),
    }
}

fn owner_column(kind: AccountKind) -> &'static str {
    list_table(kind).1
}

/// Add an appointment to an account's list. Re-adding is a no-op.
pub fn link_appointment(
    conn: &Connection,
    kind: AccountKind,
    account_id: &Uuid,
    appointment_id: &Uuid,
) -> Result<(), DatabaseError> {
    let (table, column) = list_table(kind);
    conn.execute(
        &format!("INSERT OR IGNORE INTO {table} ({column}, appointment_id) VALUES (?1, ?2)"),
        params![account_id.to_string(), appointment_id.to_string()],
    )?;
    Ok(())
}

pub fn unlink_appointment(
    conn: &Connection,
    kind: AccountKind,
    account_id: &Uuid,
    appointment_id: &Uuid,
) -> Result<bool, DatabaseError> {
    let (table, column) = list_table(kind);
    let rows = conn.execute(
        &format!("DELETE FROM {table} WHERE {column} = ?1 AND appointment_id = ?2"),
        params![account_id.to_string(), appointment_id.to_string()],
    )?;
    Ok(rows > 0)
}

pub fn linked_appointment_ids(
    conn: &Connection,
    kind: AccountKind,
    account_id: &Uuid,
) -> Result<Vec<Uuid>, DatabaseError> {
    let (table, column) = list_table(kind);
    let mut stmt = conn.prepare(&format!(
        "SELECT appointment_id FROM {table} WHERE {column} = ?1 ORDER BY appointment_id"
    ))?;
    let rows = stmt.query_map(params![account_id.to_string()], |row| row.get::<_, String>(0))?;
    let mut ids = Vec::new();
    for row in rows {
        ids.push(uuid_from_db(&row?)?);
    }
    Ok(ids)
}

fn not_found(id: &Uuid) -> DatabaseError {
    DatabaseError::NotFound {
        entity_type: "Appointment".into(),
        id: id.to_string(),
    }
}

fn query_appointments(
    conn: &Connection,
    sql: &str,
    args: impl rusqlite::Params,
) -> Result<Vec<Appointment>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(args, read_appointment_row)?;
    let mut appointments = Vec::new();
    for row in rows {
        appointments.push(appointment_from_row(row?)?);
    }
    Ok(appointments)
}

// Internal row type for Appointment mapping
struct AppointmentRow {
    id: String,
    title: String,
    description: String,
    patient_id: String,
    clinic_id: String,
    start_at: String,
    end_at: String,
    status: String,
    created_at: String,
    updated_at: String,
}

fn read_appointment_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AppointmentRow> {
    Ok(AppointmentRow {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        patient_id: row.get(3)?,
        clinic_id: row.get(4)?,
        start_at: row.get(5)?,
        end_at: row.get(6)?,
        status: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn appointment_from_row(row: AppointmentRow) -> Result<Appointment, DatabaseError> {
    Ok(Appointment {
        id: uuid_from_db(&row.id)?,
        title: row.title,
        description: row.description,
        patient_id: uuid_from_db(&row.patient_id)?,
        clinic_id: uuid_from_db(&row.clinic_id)?,
        start_at: ts_from_db(&row.start_at)?,
        end_at: ts_from_db(&row.end_at)?,
        status: AppointmentStatus::from_str(&row.status)?,
        created_at: ts_from_db(&row.created_at)?,
        updated_at: ts_from_db(&row.updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use crate::db::sqlite::open_memory_database;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 3, 4, h, m, 0).unwrap()
    }

    fn make(conn: &Connection, clinic_id: Uuid, start: DateTime<Utc>, minutes: i64) -> Appointment {
        let now = Utc::now();
        let appt = Appointment {
            id: Uuid::new_v4(),
            title: "Checkup".into(),
            description: "Routine".into(),
            patient_id: Uuid::new_v4(),
            clinic_id,
            start_at: start,
            end_at: start + Duration::minutes(minutes),
            status: AppointmentStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        insert_appointment(conn, &appt).unwrap();
        appt
    }

    #[test]
    fn overlap_query_honours_half_open_windows() {
        let conn = open_memory_database().unwrap();
        let clinic = Uuid::new_v4();
        let existing = make(&conn, clinic, at(10, 0), 60);

        let hits = find_overlapping_appointments(&conn, &clinic, &at(10, 30), &at(11, 30), None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, existing.id);

        let adjacent = find_overlapping_appointments(&conn, &clinic, &at(11, 0), &at(12, 0), None).unwrap();
        assert!(adjacent.is_empty());

        let other_clinic = find_overlapping_appointments(&conn, &Uuid::new_v4(), &at(10, 0), &at(11, 0), None).unwrap();
        assert!(other_clinic.is_empty());
    }

    #[test]
    fn overlap_query_skips_failed_and_excluded() {
        let conn = open_memory_database().unwrap();
        let clinic = Uuid::new_v4();
        let appt = make(&conn, clinic, at(10, 0), 60);

        let excluded = find_overlapping_appointments(&conn, &clinic, &at(10, 0), &at(11, 0), Some(&appt.id)).unwrap();
        assert!(excluded.is_empty());

        update_appointment_status(&conn, &appt.id, AppointmentStatus::Failed, &Utc::now()).unwrap();
        let after_cancel = find_overlapping_appointments(&conn, &clinic, &at(10, 0), &at(11, 0), None).unwrap();
        assert!(after_cancel.is_empty());
    }

    #[test]
    fn guarded_transition_refuses_stale_status() {
        let conn = open_memory_database().unwrap();
        let appt = make(&conn, Uuid::new_v4(), at(9, 0), 30);
        let now = Utc::now();
        assert!(transition_appointment_status(
            &conn, &appt.id, AppointmentStatus::Pending, AppointmentStatus::Failed, &now
        ).unwrap());
        assert!(!transition_appointment_status(
            &conn, &appt.id, AppointmentStatus::Pending, AppointmentStatus::Success, &now
        ).unwrap());
        let stored = get_appointment(&conn, &appt.id).unwrap().unwrap();
        assert_eq!(stored.status, AppointmentStatus::Failed);
    }

    #[test]
    fn latest_orders_by_start_descending() {
        let conn = open_memory_database().unwrap();
        let clinic = Uuid::new_v4();
        make(&conn, clinic, at(8, 0), 30);
        let last = make(&conn, clinic, at(15, 0), 30);
        make(&conn, clinic, at(12, 0), 30);

        let latest = list_latest_appointments(&conn, AccountKind::Clinic, &clinic, 2).unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].id, last.id);
        assert_eq!(latest[1].start_at, at(12, 0));
    }

    #[test]
    fn list_links_are_idempotent() {
        let conn = open_memory_database().unwrap();
        let patient = Uuid::new_v4();
        let appt = Uuid::new_v4();
        link_appointment(&conn, AccountKind::Patient, &patient, &appt).unwrap();
        link_appointment(&conn, AccountKind::Patient, &patient, &appt).unwrap();
        assert_eq!(linked_appointment_ids(&conn, AccountKind::Patient, &patient).unwrap(), vec![appt]);

        assert!(unlink_appointment(&conn, AccountKind::Patient, &patient, &appt).unwrap());
        assert!(!unlink_appointment(&conn, AccountKind::Patient, &patient, &appt).unwrap());
    }

    #[test]
    fn delete_missing_is_not_found() {
        let conn = open_memory_database().unwrap();
        let err = delete_appointment(&conn, &Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }
}
