use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{ts_from_db, ts_to_db, uuid_from_db};
use crate::db::DatabaseError;
use crate::models::enums::AccountKind;
use crate::models::Review;

const REVIEW_COLUMNS: &str = "id, message, rating, patient_id, clinic_id, created_at, updated_at";

pub fn insert_review(conn: &Connection, review: &Review) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO reviews (id, message, rating, patient_id, clinic_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            review.id.to_string(),
            review.message,
            review.rating,
            review.patient_id.to_string(),
            review.clinic_id.to_string(),
            ts_to_db(&review.created_at),
            ts_to_db(&review.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_review(conn: &Connection, id: &Uuid) -> Result<Option<Review>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = ?1"),
            params![id.to_string()],
            read_review_row,
        )
        .optional()?;
    row.map(review_from_row).transpose()
}

pub fn list_reviews(conn: &Connection) -> Result<Vec<Review>, DatabaseError> {
    query_reviews(
        conn,
        &format!("SELECT {REVIEW_COLUMNS} FROM reviews ORDER BY created_at DESC"),
        params![],
    )
}

/// Reviews written by a patient or received by a clinic, newest first.
pub fn list_reviews_for(
    conn: &Connection,
    kind: AccountKind,
    account_id: &Uuid,
) -> Result<Vec<Review>, DatabaseError> {
    let column = match kind {
        AccountKind::Patient => "patient_id",
        AccountKind::Clinic => "clinic_id",
    };
    query_reviews(
        conn,
        &format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE {column} = ?1 ORDER BY created_at DESC"
        ),
        params![account_id.to_string()],
    )
}

pub fn update_review(conn: &Connection, review: &Review) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE reviews SET message = ?2, rating = ?3, updated_at = ?4 WHERE id = ?1",
        params![
            review.id.to_string(),
            review.message,
            review.rating,
            ts_to_db(&review.updated_at),
        ],
    )?;
    if rows == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Review".into(),
            id: review.id.to_string(),
        });
    }
    Ok(())
}

pub fn delete_review(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let rows = conn.execute("DELETE FROM reviews WHERE id = ?1", params![id.to_string()])?;
    Ok(rows > 0)
}

/// Mean rating of a clinic, `None` when it has no reviews.
pub fn average_rating(conn: &Connection, clinic_id: &Uuid) -> Result<Option<f64>, DatabaseError> {
    let avg = conn.query_row(
        "SELECT AVG(rating) FROM reviews WHERE clinic_id = ?1",
        params![clinic_id.to_string()],
        |row| row.get::<_, Option<f64>>(0),
    )?;
    Ok(avg)
}

fn query_reviews(
    conn: &Connection,
    sql: &str,
    args: impl rusqlite::Params,
) -> Result<Vec<Review>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(args, read_review_row)?;
    let mut reviews = Vec::new();
    for row in rows {
        reviews.push(review_from_row(row?)?);
    }
    Ok(reviews)
}

struct ReviewRow {
    id: String,
    message: String,
    rating: u8,
    patient_id: String,
    clinic_id: String,
    created_at: String,
    updated_at: String,
}

fn read_review_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReviewRow> {
    Ok(ReviewRow {
        id: row.get(0)?,
        message: row.get(1)?,
        rating: row.get(2)?,
        patient_id: row.get(3)?,
        clinic_id: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn review_from_row(row: ReviewRow) -> Result<Review, DatabaseError> {
    Ok(Review {
        id: uuid_from_db(&row.id)?,
        message: row.message,
        rating: row.rating,
        patient_id: uuid_from_db(&row.patient_id)?,
        clinic_id: uuid_from_db(&row.clinic_id)?,
        created_at: ts_from_db(&row.created_at)?,
        updated_at: ts_from_db(&row.updated_at)?,
    })
}
