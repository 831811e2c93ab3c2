use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{ts_from_db, ts_to_db, uuid_from_db};
use crate::db::DatabaseError;
use crate::models::enums::AccountKind;
use crate::models::*;

const PATIENT_COLUMNS: &str =
    "id, name, username, email, profile_picture, bio, location, online, created_at, updated_at";
const CLINIC_COLUMNS: &str =
    "id, clinic_name, username, email, profile_picture, bio, location, online, created_at, updated_at";

fn table(kind: AccountKind) -> &'static str {
    match kind {
        AccountKind::Patient => "patients",
        AccountKind::Clinic => "clinics",
    }
}

/// Escape LIKE wildcards so a search term matches literally.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

// ─── Patients ───

pub fn insert_patient(
    conn: &Connection,
    patient: &Patient,
    password_hash: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO patients (id, name, username, email, password_hash, profile_picture, bio,
         location, online, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            patient.id.to_string(),
            patient.name,
            patient.username,
            patient.email,
            password_hash,
            patient.profile_picture,
            patient.bio,
            patient.location,
            patient.online as i32,
            ts_to_db(&patient.created_at),
            ts_to_db(&patient.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_patient(conn: &Connection, id: &Uuid) -> Result<Option<Patient>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?1"),
            params![id.to_string()],
            read_account_row,
        )
        .optional()?;
    row.map(patient_from_row).transpose()
}

pub fn list_patients(conn: &Connection) -> Result<Vec<Patient>, DatabaseError> {
    query_patients(
        conn,
        &format!("SELECT {PATIENT_COLUMNS} FROM patients ORDER BY created_at DESC"),
        params![],
    )
}

pub fn search_patients(conn: &Connection, term: &str) -> Result<Vec<Patient>, DatabaseError> {
    query_patients(
        conn,
        &format!(
            "SELECT {PATIENT_COLUMNS} FROM patients
             WHERE name LIKE ?1 ESCAPE '\\' OR username LIKE ?1 ESCAPE '\\'
             ORDER BY name"
        ),
        params![like_pattern(term)],
    )
}

pub fn list_online_patients(conn: &Connection) -> Result<Vec<Patient>, DatabaseError> {
    query_patients(
        conn,
        &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE online = 1 ORDER BY name"),
        params![],
    )
}

pub fn update_patient(conn: &Connection, patient: &Patient) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE patients SET name = ?2, username = ?3, email = ?4, profile_picture = ?5,
         bio = ?6, location = ?7, updated_at = ?8
         WHERE id = ?1",
        params![
            patient.id.to_string(),
            patient.name,
            patient.username,
            patient.email,
            patient.profile_picture,
            patient.bio,
            patient.location,
            ts_to_db(&patient.updated_at),
        ],
    )?;
    if rows == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Patient".into(),
            id: patient.id.to_string(),
        });
    }
    Ok(())
}

fn query_patients(
    conn: &Connection,
    sql: &str,
    args: impl rusqlite::Params,
) -> Result<Vec<Patient>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(args, read_account_row)?;
    let mut patients = Vec::new();
    for row in rows {
        patients.push(patient_from_row(row?)?);
    }
    Ok(patients)
}

// ─── Clinics ───

pub fn insert_clinic(
    conn: &Connection,
    clinic: &Clinic,
    password_hash: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO clinics (id, clinic_name, username, email, password_hash, profile_picture,
         bio, location, online, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            clinic.id.to_string(),
            clinic.clinic_name,
            clinic.username,
            clinic.email,
            password_hash,
            clinic.profile_picture,
            clinic.bio,
            clinic.location,
            clinic.online as i32,
            ts_to_db(&clinic.created_at),
            ts_to_db(&clinic.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_clinic(conn: &Connection, id: &Uuid) -> Result<Option<Clinic>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {CLINIC_COLUMNS} FROM clinics WHERE id = ?1"),
            params![id.to_string()],
            read_account_row,
        )
        .optional()?;
    row.map(clinic_from_row).transpose()
}

pub fn list_clinics(conn: &Connection) -> Result<Vec<Clinic>, DatabaseError> {
    query_clinics(
        conn,
        &format!("SELECT {CLINIC_COLUMNS} FROM clinics ORDER BY created_at DESC"),
        params![],
    )
}

pub fn search_clinics(conn: &Connection, term: &str) -> Result<Vec<Clinic>, DatabaseError> {
    query_clinics(
        conn,
        &format!(
            "SELECT {CLINIC_COLUMNS} FROM clinics
             WHERE clinic_name LIKE ?1 ESCAPE '\\' OR username LIKE ?1 ESCAPE '\\'
             ORDER BY clinic_name"
        ),
        params![like_pattern(term)],
    )
}

pub fn list_online_clinics(conn: &Connection) -> Result<Vec<Clinic>, DatabaseError> {
    query_clinics(
        conn,
        &format!("SELECT {CLINIC_COLUMNS} FROM clinics WHERE online = 1 ORDER BY clinic_name"),
        params![],
    )
}

pub fn update_clinic(conn: &Connection, clinic: &Clinic) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE clinics SET clinic_name = ?2, username = ?3, email = ?4, profile_picture = ?5,
         bio = ?6, location = ?7, updated_at = ?8
         WHERE id = ?1",
        params![
            clinic.id.to_string(),
            clinic.clinic_name,
            clinic.username,
            clinic.email,
            clinic.profile_picture,
            clinic.bio,
            clinic.location,
            ts_to_db(&clinic.updated_at),
        ],
    )?;
    if rows == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Clinic".into(),
            id: clinic.id.to_string(),
        });
    }
    Ok(())
}

fn query_clinics(
    conn: &Connection,
    sql: &str,
    args: impl rusqlite::Params,
) -> Result<Vec<Clinic>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(args, read_account_row)?;
    let mut clinics = Vec::new();
    for row in rows {
        clinics.push(clinic_from_row(row?)?);
    }
    Ok(clinics)
}

// ─── Either account kind ───

/// Look up `(id, password_hash)` for a login email.
pub fn find_credentials(
    conn: &Connection,
    kind: AccountKind,
    email: &str,
) -> Result<Option<(Uuid, String)>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT id, password_hash FROM {} WHERE email = ?1", table(kind)),
            params![email],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?;
    match row {
        Some((id, hash)) => Ok(Some((uuid_from_db(&id)?, hash))),
        None => Ok(None),
    }
}

/// Whether `column` already holds `value` on an account other than `except`.
fn value_taken(
    conn: &Connection,
    kind: AccountKind,
    column: &str,
    value: &str,
    except: Option<&Uuid>,
) -> Result<bool, DatabaseError> {
    let except = except.map(|id| id.to_string()).unwrap_or_default();
    let count: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM {} WHERE {column} = ?1 AND id != ?2",
            table(kind)
        ),
        params![value, except],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn email_taken(
    conn: &Connection,
    kind: AccountKind,
    email: &str,
    except: Option<&Uuid>,
) -> Result<bool, DatabaseError> {
    value_taken(conn, kind, "email", email, except)
}

pub fn username_taken(
    conn: &Connection,
    kind: AccountKind,
    username: &str,
    except: Option<&Uuid>,
) -> Result<bool, DatabaseError> {
    value_taken(conn, kind, "username", username, except)
}

pub fn set_online(
    conn: &Connection,
    kind: AccountKind,
    id: &Uuid,
    online: bool,
) -> Result<(), DatabaseError> {
    conn.execute(
        &format!("UPDATE {} SET online = ?2 WHERE id = ?1", table(kind)),
        params![id.to_string(), online as i32],
    )?;
    Ok(())
}

/// Delete an account. Returns false when no such account exists.
pub fn delete_account(
    conn: &Connection,
    kind: AccountKind,
    id: &Uuid,
) -> Result<bool, DatabaseError> {
    let rows = conn.execute(
        &format!("DELETE FROM {} WHERE id = ?1", table(kind)),
        params![id.to_string()],
    )?;
    Ok(rows > 0)
}

// Internal row type shared by both account tables
struct AccountRow {
    id: String,
    display_name: String,
    username: String,
    email: String,
    profile_picture: String,
    bio: Option<String>,
    location: String,
    online: i32,
    created_at: String,
    updated_at: String,
}

fn read_account_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AccountRow> {
    Ok(AccountRow {
        id: row.get(0)?,
        display_name: row.get(1)?,
        username: row.get(2)?,
        email: row.get(3)?,
        profile_picture: row.get(4)?,
        bio: row.get(5)?,
        location: row.get(6)?,
        online: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn patient_from_row(row: AccountRow) -> Result<Patient, DatabaseError> {
    Ok(Patient {
        id: uuid_from_db(&row.id)?,
        name: row.display_name,
        username: row.username,
        email: row.email,
        profile_picture: row.profile_picture,
        bio: row.bio,
        location: row.location,
        online: row.online != 0,
        created_at: ts_from_db(&row.created_at)?,
        updated_at: ts_from_db(&row.updated_at)?,
    })
}

fn clinic_from_row(row: AccountRow) -> Result<Clinic, DatabaseError> {
    Ok(Clinic {
        id: uuid_from_db(&row.id)?,
        clinic_name: row.display_name,
        username: row.username,
        email: row.email,
        profile_picture: row.profile_picture,
        bio: row.bio.unwrap_or_else(|| DEFAULT_CLINIC_BIO.into()),
        location: row.location,
        online: row.online != 0,
        created_at: ts_from_db(&row.created_at)?,
        updated_at: ts_from_db(&row.updated_at)?,
    })
}
