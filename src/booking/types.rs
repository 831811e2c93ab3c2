use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::BookingError;
use crate::models::{Appointment, Clinic, Patient, TimeWindow};

pub const MAX_TITLE_LEN: usize = 50;
pub const MAX_DESCRIPTION_LEN: usize = 1000;

/// Body of a create request.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAppointment {
    pub title: String,
    pub description: String,
    pub patient_id: String,
    pub clinic_id: String,
    pub start_date: String,
    pub end_date: String,
    /// Consent to add the clinic to the patient's medical-record access set.
    #[serde(default)]
    pub medical_record_access: bool,
}

/// Body of an update request. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateAppointment {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(default)]
    pub medical_record_access: bool,
}

/// Create input after parsing and validation.
#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub title: String,
    pub description: String,
    pub patient_id: Uuid,
    pub clinic_id: Uuid,
    pub window: TimeWindow,
    pub grant_access: bool,
}

impl CreateAppointment {
    pub fn validate(&self) -> Result<NewAppointment, BookingError> {
        let title = validate_text("title", &self.title, MAX_TITLE_LEN)?;
        let description = validate_text("description", &self.description, MAX_DESCRIPTION_LEN)?;
        let patient_id = parse_id("patient_id", &self.patient_id)?;
        let clinic_id = parse_id("clinic_id", &self.clinic_id)?;
        let start = parse_instant("start_date", &self.start_date)?;
        let end = parse_instant("end_date", &self.end_date)?;
        if end <= start {
            return Err(BookingError::Validation(
                "End date must be later than the start date".into(),
            ));
        }
        Ok(NewAppointment {
            title,
            description,
            patient_id,
            clinic_id,
            window: TimeWindow { start, end },
            grant_access: self.medical_record_access,
        })
    }
}

/// Update input after parsing and validation of the supplied fields.
#[derive(Debug, Clone, Default)]
pub struct AppointmentChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub grant_access: bool,
}

impl UpdateAppointment {
    pub fn validate(&self) -> Result<AppointmentChanges, BookingError> {
        let title = self
            .title
            .as_deref()
            .map(|t| validate_text("title", t, MAX_TITLE_LEN))
            .transpose()?;
        let description = self
            .description
            .as_deref()
            .map(|d| validate_text("description", d, MAX_DESCRIPTION_LEN))
            .transpose()?;
        let start = self
            .start_date
            .as_deref()
            .map(|s| parse_instant("start_date", s))
            .transpose()?;
        let end = self
            .end_date
            .as_deref()
            .map(|s| parse_instant("end_date", s))
            .transpose()?;
        Ok(AppointmentChanges {
            title,
            description,
            start,
            end,
            grant_access: self.medical_record_access,
        })
    }
}

impl AppointmentChanges {
    pub fn touches_window(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }
}

/// Everything a notifier needs to email both parties about an approval.
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalNotice {
    pub appointment: Appointment,
    pub patient_name: String,
    pub patient_email: String,
    pub clinic_name: String,
    pub clinic_email: String,
    pub patient_meeting_link: String,
    pub patient_reschedule_link: String,
    pub clinic_meeting_link: String,
    pub clinic_reschedule_link: String,
}

impl ApprovalNotice {
    pub fn new(appointment: Appointment, patient: &Patient, clinic: &Clinic, public_url: &str) -> Self {
        let base = public_url.trim_end_matches('/');
        let id = appointment.id;
        Self {
            patient_name: patient.name.clone(),
            patient_email: patient.email.clone(),
            clinic_name: clinic.clinic_name.clone(),
            clinic_email: clinic.email.clone(),
            patient_meeting_link: format!("{base}/patient/appointments/{id}/session"),
            patient_reschedule_link: format!("{base}/patient/appointments/{id}"),
            clinic_meeting_link: format!("{base}/clinic/appointments/{id}/session"),
            clinic_reschedule_link: format!("{base}/clinic/appointments/{id}"),
            appointment,
        }
    }
}

pub(crate) fn validate_text(field: &str, value: &str, max: usize) -> Result<String, BookingError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(BookingError::Validation(format!("\"{field}\" is not allowed to be empty")));
    }
    if trimmed.chars().count() > max {
        return Err(BookingError::Validation(format!(
            "\"{field}\" length must be less than or equal to {max} characters long"
        )));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn parse_id(field: &str, raw: &str) -> Result<Uuid, BookingError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| BookingError::Validation(format!("\"{field}\" must be a valid id")))
}

/// Parse an ISO-8601 instant. A missing offset is read as UTC.
///
/// Precision is cut to milliseconds, the resolution instants are stored at.
pub(crate) fn parse_instant(field: &str, raw: &str) -> Result<DateTime<Utc>, BookingError> {
    let raw = raw.trim();
    let parsed = match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => dt.with_timezone(&Utc),
        Err(_) => chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M"))
            .map(|naive| naive.and_utc())
            .map_err(|_| {
                BookingError::Validation(format!("\"{field}\" must be in ISO 8601 date format"))
            })?,
    };
    Ok(parsed.trunc_subsecs(3))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> CreateAppointment {
        CreateAppointment {
            title: "Checkup".into(),
            description: "Annual".into(),
            patient_id: Uuid::new_v4().to_string(),
            clinic_id: Uuid::new_v4().to_string(),
            start_date: "2030-05-01T10:00:00Z".into(),
            end_date: "2030-05-01T10:30:00Z".into(),
            medical_record_access: false,
        }
    }

    #[test]
    fn valid_input_parses_window() {
        let parsed = input().validate().unwrap();
        assert_eq!(parsed.window.end - parsed.window.start, chrono::Duration::minutes(30));
        assert!(!parsed.grant_access);
    }

    #[test]
    fn title_over_limit_is_rejected() {
        let mut bad = input();
        bad.title = "x".repeat(MAX_TITLE_LEN + 1);
        assert!(matches!(bad.validate(), Err(BookingError::Validation(_))));
    }

    #[test]
    fn end_must_follow_start() {
        let mut bad = input();
        bad.end_date = bad.start_date.clone();
        let err = bad.validate().unwrap_err();
        assert_eq!(err.to_string(), "End date must be later than the start date");
    }

    #[test]
    fn offsets_are_normalised_and_naive_is_utc() {
        let with_offset = parse_instant("start_date", "2030-05-01T12:00:00+02:00").unwrap();
        let naive = parse_instant("start_date", "2030-05-01T10:00:00").unwrap();
        assert_eq!(with_offset, naive);
        assert!(parse_instant("start_date", "tomorrow").is_err());
    }

    #[test]
    fn instants_are_cut_to_milliseconds() {
        let parsed = parse_instant("start_date", "2030-05-01T10:00:00.123456789Z").unwrap();
        assert_eq!(parsed.timestamp_subsec_nanos(), 123_000_000);

        // Equal once stored, so the window is empty
        let mut bad = input();
        bad.start_date = "2030-05-01T10:00:00.000100Z".into();
        bad.end_date = "2030-05-01T10:00:00.000900Z".into();
        let err = bad.validate().unwrap_err();
        assert_eq!(err.to_string(), "End date must be later than the start date");
    }

    #[test]
    fn bad_ids_are_validation_errors() {
        let mut bad = input();
        bad.clinic_id = "clinic-1".into();
        let err = bad.validate().unwrap_err();
        assert_eq!(err.to_string(), "\"clinic_id\" must be a valid id");
    }

    #[test]
    fn update_validates_only_supplied_fields() {
        let changes = UpdateAppointment {
            end_date: Some("2030-05-01T11:00:00Z".into()),
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert!(changes.title.is_none());
        assert!(changes.touches_window());
    }
}
