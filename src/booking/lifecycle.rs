//! Appointment state machine.
//!
//! ```text
//! pending --approve--> success
//! pending --cancel---> failed
//! pending --approval fails (email, missing party)--> failed
//! ```
//! `success` and `failed` are terminal for status changes. Details stay
//! editable until the appointment has failed.

use chrono::{DateTime, Utc};

use super::error::BookingError;
use crate::models::enums::AppointmentStatus;
use crate::models::Appointment;

pub fn check_editable(appt: &Appointment) -> Result<(), BookingError> {
    match appt.status {
        AppointmentStatus::Pending | AppointmentStatus::Success => Ok(()),
        AppointmentStatus::Failed => Err(BookingError::IllegalTransition(
            "You cannot update an appointment that has already been cancelled!".into(),
        )),
    }
}

pub fn check_cancellable(appt: &Appointment) -> Result<(), BookingError> {
    match appt.status {
        AppointmentStatus::Pending => Ok(()),
        AppointmentStatus::Failed => Err(BookingError::IllegalTransition(
            "Appointment is already cancelled!".into(),
        )),
        AppointmentStatus::Success => Err(BookingError::IllegalTransition(
            "Cannot cancel an already approved appointment.".into(),
        )),
    }
}

/// An appointment whose start has passed can no longer be approved.
pub fn check_approvable(appt: &Appointment, now: DateTime<Utc>) -> Result<(), BookingError> {
    match appt.status {
        AppointmentStatus::Failed => Err(BookingError::IllegalTransition(
            "Appointment is already cancelled".into(),
        )),
        AppointmentStatus::Success => Err(BookingError::IllegalTransition(
            "Appointment is already approved".into(),
        )),
        AppointmentStatus::Pending if appt.start_at < now => Err(BookingError::IllegalTransition(
            "Appointment has expired!".into(),
        )),
        AppointmentStatus::Pending => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn appt(status: AppointmentStatus, start: DateTime<Utc>) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            title: "t".into(),
            description: "d".into(),
            patient_id: Uuid::new_v4(),
            clinic_id: Uuid::new_v4(),
            start_at: start,
            end_at: start + Duration::minutes(30),
            status,
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn only_pending_is_cancellable() {
        let now = Utc::now();
        assert!(check_cancellable(&appt(AppointmentStatus::Pending, now)).is_ok());

        let err = check_cancellable(&appt(AppointmentStatus::Failed, now)).unwrap_err();
        assert_eq!(err.to_string(), "Appointment is already cancelled!");

        let err = check_cancellable(&appt(AppointmentStatus::Success, now)).unwrap_err();
        assert_eq!(err.to_string(), "Cannot cancel an already approved appointment.");
    }

    #[test]
    fn approval_requires_future_pending_appointment() {
        let now = Utc::now();
        let future = appt(AppointmentStatus::Pending, now + Duration::hours(1));
        assert!(check_approvable(&future, now).is_ok());

        let past = appt(AppointmentStatus::Pending, now - Duration::minutes(1));
        assert_eq!(check_approvable(&past, now).unwrap_err().to_string(), "Appointment has expired!");

        let cancelled = appt(AppointmentStatus::Failed, now + Duration::hours(1));
        assert!(matches!(
            check_approvable(&cancelled, now),
            Err(BookingError::IllegalTransition(_))
        ));
    }

    #[test]
    fn only_failed_appointments_are_frozen() {
        let now = Utc::now();
        assert!(check_editable(&appt(AppointmentStatus::Pending, now)).is_ok());
        assert!(check_editable(&appt(AppointmentStatus::Success, now)).is_ok());
        let err = check_editable(&appt(AppointmentStatus::Failed, now)).unwrap_err();
        assert_eq!(err.to_string(), "You cannot update an appointment that has already been cancelled!");
    }
}
