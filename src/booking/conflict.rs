//! Clinic double-booking detection.
//!
//! Two windows conflict when `start_a < end_b && start_b < end_a` and both
//! belong to the same clinic. Failed appointments never block a slot.

use rusqlite::Connection;
use uuid::Uuid;

use super::error::BookingError;
use crate::db::repository::find_overlapping_appointments;
use crate::models::TimeWindow;

/// Reject `window` if the clinic already has a live appointment overlapping it.
///
/// `exclude` skips the appointment being edited. Must run inside the same
/// write transaction as the insert or update it guards.
pub fn ensure_slot_free(
    conn: &Connection,
    clinic_id: &Uuid,
    window: &TimeWindow,
    exclude: Option<&Uuid>,
) -> Result<(), BookingError> {
    let clashes = find_overlapping_appointments(conn, clinic_id, &window.start, &window.end, exclude)?;
    if let Some(existing) = clashes.first() {
        tracing::info!(
            clinic_id = %clinic_id,
            existing = %existing.id,
            requested_start = %window.start,
            requested_end = %window.end,
            "Booking rejected: overlapping appointment"
        );
        return Err(BookingError::Conflict);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use crate::db::repository::{insert_appointment, update_appointment_status};
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::AppointmentStatus;
    use crate::models::Appointment;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2031, 6, 1, h, m, 0).unwrap()
    }

    fn booked(conn: &Connection, clinic_id: Uuid, start: DateTime<Utc>) -> Appointment {
        let appt = Appointment {
            id: Uuid::new_v4(),
            title: "Visit".into(),
            description: "Visit".into(),
            patient_id: Uuid::new_v4(),
            clinic_id,
            start_at: start,
            end_at: start + Duration::hours(1),
            status: AppointmentStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        insert_appointment(conn, &appt).unwrap();
        appt
    }

    #[test]
    fn overlapping_live_appointment_conflicts() {
        let conn = open_memory_database().unwrap();
        let clinic = Uuid::new_v4();
        booked(&conn, clinic, at(10, 0));

        let window = TimeWindow { start: at(10, 30), end: at(11, 30) };
        assert!(matches!(
            ensure_slot_free(&conn, &clinic, &window, None),
            Err(BookingError::Conflict)
        ));
    }

    #[test]
    fn failed_appointment_frees_its_slot() {
        let conn = open_memory_database().unwrap();
        let clinic = Uuid::new_v4();
        let appt = booked(&conn, clinic, at(10, 0));
        update_appointment_status(&conn, &appt.id, AppointmentStatus::Failed, &Utc::now()).unwrap();

        let window = TimeWindow { start: at(10, 30), end: at(11, 30) };
        assert!(ensure_slot_free(&conn, &clinic, &window, None).is_ok());
    }

    #[test]
    fn other_clinics_and_adjacent_windows_are_free() {
        let conn = open_memory_database().unwrap();
        let clinic = Uuid::new_v4();
        booked(&conn, clinic, at(10, 0));

        let same = TimeWindow { start: at(10, 0), end: at(11, 0) };
        assert!(ensure_slot_free(&conn, &Uuid::new_v4(), &same, None).is_ok());

        let adjacent = TimeWindow { start: at(11, 0), end: at(12, 0) };
        assert!(ensure_slot_free(&conn, &clinic, &adjacent, None).is_ok());
    }

    #[test]
    fn edited_appointment_does_not_conflict_with_itself() {
        let conn = open_memory_database().unwrap();
        let clinic = Uuid::new_v4();
        let appt = booked(&conn, clinic, at(10, 0));

        let shifted = TimeWindow { start: at(10, 15), end: at(11, 15) };
        assert!(ensure_slot_free(&conn, &clinic, &shifted, Some(&appt.id)).is_ok());
    }
}
