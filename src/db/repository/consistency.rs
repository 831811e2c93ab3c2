use rusqlite::Connection;

use crate::db::DatabaseError;

/// A single consistency issue detected by the checker.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConsistencyIssue {
    pub category: String,
    pub severity: String,
    pub description: String,
    pub appointment_id: Option<String>,
}

/// Result of a consistency check over appointments, account lists and the access ledger.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConsistencyReport {
    pub issues: Vec<ConsistencyIssue>,
    pub appointments_checked: i64,
}

impl ConsistencyReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

// List entries whose appointment row is gone (left by a partial delete).
const DANGLING_PATIENT_LINKS: &str =
    "FROM patient_appointments l
     WHERE NOT EXISTS (SELECT 1 FROM appointments a WHERE a.id = l.appointment_id)";
const DANGLING_CLINIC_LINKS: &str =
    "FROM clinic_appointments l
     WHERE NOT EXISTS (SELECT 1 FROM appointments a WHERE a.id = l.appointment_id)";

// Appointments absent from their owners' lists.
const UNLISTED_FOR_PATIENT: &str =
    "FROM appointments a
     WHERE NOT EXISTS (SELECT 1 FROM patient_appointments l
                       WHERE l.appointment_id = a.id AND l.patient_id = a.patient_id)";
const UNLISTED_FOR_CLINIC: &str =
    "FROM appointments a
     WHERE NOT EXISTS (SELECT 1 FROM clinic_appointments l
                       WHERE l.appointment_id = a.id AND l.clinic_id = a.clinic_id)";

// Grants naming a clinic account that no longer exists.
const ORPHANED_GRANTS: &str =
    "FROM medical_record_access g
     WHERE NOT EXISTS (SELECT 1 FROM clinics c WHERE c.id = g.clinic_id)";

fn collect_ids(conn: &Connection, sql: &str) -> Result<Vec<String>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Run a full consistency check across the database.
///
/// Detects:
/// - appointment-list entries pointing at deleted appointments
/// - appointments missing from their patient's or clinic's list
/// - access grants for clinics that were deleted
pub fn check_consistency(conn: &Connection) -> Result<ConsistencyReport, DatabaseError> {
    let mut issues = Vec::new();

    for (sql, owner) in [(DANGLING_PATIENT_LINKS, "patient"), (DANGLING_CLINIC_LINKS, "clinic")] {
        for id in collect_ids(conn, &format!("SELECT l.appointment_id {sql}"))? {
            issues.push(ConsistencyIssue {
                category: "dangling_list_entry".into(),
                severity: "medium".into(),
                description: format!("A {owner} appointment list references a deleted appointment"),
                appointment_id: Some(id),
            });
        }
    }

    for (sql, owner) in [(UNLISTED_FOR_PATIENT, "patient"), (UNLISTED_FOR_CLINIC, "clinic")] {
        for id in collect_ids(conn, &format!("SELECT a.id {sql}"))? {
            issues.push(ConsistencyIssue {
                category: "missing_list_entry".into(),
                severity: "high".into(),
                description: format!("Appointment is missing from its {owner}'s list"),
                appointment_id: Some(id),
            });
        }
    }

    let orphaned_grants: i64 =
        conn.query_row(&format!("SELECT COUNT(*) {ORPHANED_GRANTS}"), [], |row| row.get(0))?;
    if orphaned_grants > 0 {
        issues.push(ConsistencyIssue {
            category: "orphaned_access_grant".into(),
            severity: "low".into(),
            description: format!("{orphaned_grants} access grants name deleted clinics"),
            appointment_id: None,
        });
    }

    let appointments_checked =
        conn.query_row("SELECT COUNT(*) FROM appointments", [], |row| row.get(0))?;

    Ok(ConsistencyReport { issues, appointments_checked })
}

/// Auto-repair every issue [`check_consistency`] reports.
///
/// Returns the number of rows repaired.
pub fn repair_consistency(conn: &Connection) -> Result<usize, DatabaseError> {
    let mut repaired = 0;

    let dangling = conn.execute(
        &format!("DELETE FROM patient_appointments WHERE rowid IN (SELECT l.rowid {DANGLING_PATIENT_LINKS})"),
        [],
    )? + conn.execute(
        &format!("DELETE FROM clinic_appointments WHERE rowid IN (SELECT l.rowid {DANGLING_CLINIC_LINKS})"),
        [],
    )?;
    if dangling > 0 {
        tracing::info!(count = dangling, "Removed dangling appointment list entries");
        repaired += dangling;
    }

    let relinked = conn.execute(
        &format!(
            "INSERT OR IGNORE INTO patient_appointments (patient_id, appointment_id)
             SELECT a.patient_id, a.id {UNLISTED_FOR_PATIENT}"
        ),
        [],
    )? + conn.execute(
        &format!(
            "INSERT OR IGNORE INTO clinic_appointments (clinic_id, appointment_id)
             SELECT a.clinic_id, a.id {UNLISTED_FOR_CLINIC}"
        ),
        [],
    )?;
    if relinked > 0 {
        tracing::info!(count = relinked, "Restored missing appointment list entries");
        repaired += relinked;
    }

    let grants = conn.execute(
        &format!("DELETE FROM medical_record_access WHERE rowid IN (SELECT g.rowid {ORPHANED_GRANTS})"),
        [],
    )?;
    if grants > 0 {
        tracing::info!(count = grants, "Removed access grants for deleted clinics");
        repaired += grants;
    }

    Ok(repaired)
}
