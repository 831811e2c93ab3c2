//! Repository layer: entity-scoped database operations.
//!
//! Every function takes a plain `&Connection`, so callers can pass either a
//! connection or an open `Transaction`.

mod access;
mod account;
mod appointment;
mod chat;
mod consistency;
mod medical_record;
mod review;

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use super::DatabaseError;

pub use access::*;
pub use account::*;
pub use appointment::*;
pub use chat::*;
pub use consistency::*;
pub use medical_record::*;
pub use review::*;

/// Fixed-width UTC text so lexical order equals chronological order.
pub(crate) fn ts_to_db(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn ts_from_db(raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::ConstraintViolation(format!("bad timestamp '{raw}': {e}")))
}

pub(crate) fn uuid_from_db(raw: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(raw).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::Utc;
    use rusqlite::Connection;
    use uuid::Uuid;

    use crate::models::*;

    pub fn patient(conn: &Connection, username: &str) -> Patient {
        let now = Utc::now();
        let patient = Patient {
            id: Uuid::new_v4(),
            name: format!("{username} name"),
            username: username.into(),
            email: format!("{username}@example.com"),
            profile_picture: "https://example.com/p.png".into(),
            bio: None,
            location: "Lagos".into(),
            online: false,
            created_at: now,
            updated_at: now,
        };
        super::insert_patient(conn, &patient, "hash").unwrap();
        patient
    }

    pub fn clinic(conn: &Connection, username: &str) -> Clinic {
        let now = Utc::now();
        let clinic = Clinic {
            id: Uuid::new_v4(),
            clinic_name: format!("{username} clinic"),
            username: username.into(),
            email: format!("{username}@clinic.example.com"),
            profile_picture: "https://example.com/c.png".into(),
            bio: DEFAULT_CLINIC_BIO.into(),
            location: "Abuja".into(),
            online: false,
            created_at: now,
            updated_at: now,
        };
        super::insert_clinic(conn, &clinic, "hash").unwrap();
        clinic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_sort_lexically() {
        let early = Utc.with_ymd_and_hms(2030, 1, 1, 9, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2030, 1, 1, 10, 0, 0).unwrap();
        assert!(ts_to_db(&early) < ts_to_db(&late));
        assert_eq!(ts_from_db(&ts_to_db(&early)).unwrap(), early);
    }

    #[test]
    fn bad_uuid_is_constraint_violation() {
        assert!(matches!(
            uuid_from_db("nope"),
            Err(DatabaseError::ConstraintViolation(_))
        ));
    }
}
