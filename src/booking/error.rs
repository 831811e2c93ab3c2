//! Error taxonomy for the booking core.
//!
//! Display strings are the messages clients see.

use thiserror::Error;
use uuid::Uuid;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum BookingError {
    /// Malformed or out-of-range input.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// The clinic already holds an overlapping non-failed appointment.
    #[error("Appointment time range conflicts with an existing appointment.")]
    Conflict,

    /// The lifecycle forbids the requested action from the current status.
    #[error("{0}")]
    IllegalTransition(String),

    /// The caller is authenticated but not a party allowed to act.
    #[error("{0}")]
    Forbidden(String),

    /// Approval emails could not be delivered; the appointment is now failed.
    #[error("An error occurred while sending approval emails")]
    NotificationFailure(String),

    /// The appointment row is gone but list cleanup did not complete.
    #[error("An error occurred while deleting the appointment")]
    PartialFailure { appointment_id: Uuid, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl From<rusqlite::Error> for BookingError {
    fn from(e: rusqlite::Error) -> Self {
        BookingError::Database(DatabaseError::Sqlite(e))
    }
}

/// Reason a notifier could not deliver.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Mail relay unreachable: {0}")]
    Transport(String),

    #[error("Mail relay rejected message for {recipient}: HTTP {status}")]
    Rejected { recipient: String, status: u16 },
}
