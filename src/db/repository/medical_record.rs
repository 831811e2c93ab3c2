use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{ts_from_db, ts_to_db, uuid_from_db};
use crate::db::DatabaseError;
use crate::models::MedicalRecord;

pub fn insert_medical_record(conn: &Connection, record: &MedicalRecord) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO medical_records (id, patient_id, symptoms, diagnosis, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            record.id.to_string(),
            record.patient_id.to_string(),
            record.symptoms,
            record.diagnosis,
            ts_to_db(&record.created_at),
            ts_to_db(&record.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_medical_record(conn: &Connection, id: &Uuid) -> Result<Option<MedicalRecord>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, patient_id, symptoms, diagnosis, created_at, updated_at
             FROM medical_records WHERE id = ?1",
            params![id.to_string()],
            read_record_row,
        )
        .optional()?;
    row.map(record_from_row).transpose()
}

pub fn list_medical_records_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<MedicalRecord>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, patient_id, symptoms, diagnosis, created_at, updated_at
         FROM medical_records WHERE patient_id = ?1 ORDER BY created_at DESC",
    )?;
    let rows = stmt.query_map(params![patient_id.to_string()], read_record_row)?;
    let mut records = Vec::new();
    for row in rows {
        records.push(record_from_row(row?)?);
    }
    Ok(records)
}

pub fn update_medical_record(conn: &Connection, record: &MedicalRecord) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE medical_records SET symptoms = ?2, diagnosis = ?3, updated_at = ?4 WHERE id = ?1",
        params![
            record.id.to_string(),
            record.symptoms,
            record.diagnosis,
            ts_to_db(&record.updated_at),
        ],
    )?;
    if rows == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "MedicalRecord".into(),
            id: record.id.to_string(),
        });
    }
    Ok(())
}

pub fn delete_medical_record(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let rows = conn.execute(
        "DELETE FROM medical_records WHERE id = ?1",
        params![id.to_string()],
    )?;
    Ok(rows > 0)
}

struct RecordRow {
    id: String,
    patient_id: String,
    symptoms: String,
    diagnosis: String,
    created_at: String,
    updated_at: String,
}

fn read_record_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecordRow> {
    Ok(RecordRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        symptoms: row.get(2)?,
        diagnosis: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn record_from_row(row: RecordRow) -> Result<MedicalRecord, DatabaseError> {
    Ok(MedicalRecord {
        id: uuid_from_db(&row.id)?,
        patient_id: uuid_from_db(&row.patient_id)?,
        symptoms: row.symptoms,
        diagnosis: row.diagnosis,
        created_at: ts_from_db(&row.created_at)?,
        updated_at: ts_from_db(&row.updated_at)?,
    })
}
