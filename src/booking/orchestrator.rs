//! Appointment orchestration.
//!
//! Composes validation, the conflict detector, the lifecycle rules and the
//! access ledger into the operations exposed over HTTP. Every multi-row
//! write runs in one `IMMEDIATE` transaction; events are published only
//! after the transaction commits.

use std::sync::Arc;

use rusqlite::{Connection, TransactionBehavior};
use serde_json::Value;
use uuid::Uuid;

use super::conflict::ensure_slot_free;
use super::error::BookingError;
use super::ledger;
use super::lifecycle;
use super::traits::{Clock, Notifier};
use super::types::{ApprovalNotice, CreateAppointment, UpdateAppointment};
use crate::db::repository::*;
use crate::db::Database;
use crate::events::{EventPublisher, RealtimeEvent};
use crate::models::enums::{AccountKind, AppointmentStatus};
use crate::models::{Appointment, Principal, TimeWindow};

const APPOINTMENT_NOT_FOUND: &str = "Appointment with given id not found";

pub struct AppointmentService {
    db: Database,
    publisher: Arc<dyn EventPublisher>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    public_url: String,
}

impl AppointmentService {
    pub fn new(
        db: Database,
        publisher: Arc<dyn EventPublisher>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        public_url: &str,
    ) -> Self {
        Self {
            db,
            publisher,
            notifier,
            clock,
            public_url: public_url.to_string(),
        }
    }

    fn open(&self) -> Result<Connection, BookingError> {
        Ok(self.db.open()?)
    }

    fn broadcast(&self, event: RealtimeEvent, appt: &Appointment) {
        match serde_json::to_value(appt) {
            Ok(payload) => self.publisher.publish(event, payload),
            Err(e) => tracing::warn!(appointment_id = %appt.id, error = %e, "Event payload not serializable"),
        }
    }

    // ─── Commands ───

    /// Book a pending appointment for the calling patient.
    pub fn create(
        &self,
        principal: &Principal,
        input: &CreateAppointment,
    ) -> Result<Appointment, BookingError> {
        let new = input.validate()?;
        if !principal.is_patient(&new.patient_id) {
            return Err(BookingError::Forbidden(
                "Patients can only book appointments for themselves".into(),
            ));
        }

        let mut conn = self.open()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if get_patient(&tx, &new.patient_id)?.is_none() {
            return Err(BookingError::NotFound("User not found".into()));
        }
        if get_clinic(&tx, &new.clinic_id)?.is_none() {
            return Err(BookingError::NotFound("Hospital not found".into()));
        }

        ensure_slot_free(&tx, &new.clinic_id, &new.window, None)?;

        let now = self.clock.now();
        let appt = Appointment {
            id: Uuid::new_v4(),
            title: new.title,
            description: new.description,
            patient_id: new.patient_id,
            clinic_id: new.clinic_id,
            start_at: new.window.start,
            end_at: new.window.end,
            status: AppointmentStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        insert_appointment(&tx, &appt)?;

        if new.grant_access {
            ledger::grant(&tx, &appt.patient_id, &appt.clinic_id, &now)?;
        }

        link_appointment(&tx, AccountKind::Patient, &appt.patient_id, &appt.id)?;
        link_appointment(&tx, AccountKind::Clinic, &appt.clinic_id, &appt.id)?;
        tx.commit()?;

        tracing::info!(
            appointment_id = %appt.id,
            patient_id = %appt.patient_id,
            clinic_id = %appt.clinic_id,
            "Appointment created"
        );
        self.broadcast(RealtimeEvent::NewAppointment, &appt);
        Ok(appt)
    }

    /// Edit an appointment that has not failed. Only its patient may edit it.
    pub fn update(
        &self,
        principal: &Principal,
        id: &str,
        input: &UpdateAppointment,
    ) -> Result<Appointment, BookingError> {
        let changes = input.validate()?;
        let id = parse_appointment_id(id)?;

        let mut conn = self.open()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut appt = load(&tx, &id)?;

        if !principal.is_patient(&appt.patient_id) {
            return Err(BookingError::Forbidden(
                "Only the patient who booked this appointment can edit it".into(),
            ));
        }
        lifecycle::check_editable(&appt)?;

        let window = TimeWindow {
            start: changes.start.unwrap_or(appt.start_at),
            end: changes.end.unwrap_or(appt.end_at),
        };
        if changes.touches_window() {
            if window.end <= window.start {
                return Err(BookingError::Validation(
                    "End date cannot be earlier than the start date".into(),
                ));
            }
            if window != appt.window() {
                ensure_slot_free(&tx, &appt.clinic_id, &window, Some(&appt.id))?;
            }
        }

        let now = self.clock.now();
        if let Some(title) = changes.title {
            appt.title = title;
        }
        if let Some(description) = changes.description {
            appt.description = description;
        }
        appt.start_at = window.start;
        appt.end_at = window.end;
        appt.updated_at = now;
        update_appointment_details(&tx, &appt)?;

        if changes.grant_access {
            ledger::grant(&tx, &appt.patient_id, &appt.clinic_id, &now)?;
        }
        tx.commit()?;

        tracing::info!(appointment_id = %appt.id, "Appointment updated");
        self.broadcast(RealtimeEvent::UpdateAppointment, &appt);
        Ok(appt)
    }

    /// `pending -> failed`, by either party.
    pub fn cancel(&self, principal: &Principal, id: &str) -> Result<Appointment, BookingError> {
        let id = parse_appointment_id(id)?;

        let mut conn = self.open()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut appt = load(&tx, &id)?;
        ensure_party(principal, &appt)?;

        if let Err(e) = lifecycle::check_cancellable(&appt) {
            tracing::warn!(appointment_id = %appt.id, status = %appt.status, "Cancel rejected");
            return Err(e);
        }

        let now = self.clock.now();
        update_appointment_status(&tx, &appt.id, AppointmentStatus::Failed, &now)?;
        tx.commit()?;

        appt.status = AppointmentStatus::Failed;
        appt.updated_at = now;
        tracing::info!(appointment_id = %appt.id, by = %principal.kind(), "Appointment cancelled");
        self.broadcast(RealtimeEvent::CancelAppointment, &appt);
        Ok(appt)
    }

    /// `pending -> success`, by the owning clinic, after both approval emails are sent.
    ///
    /// A missing party or a failed email forces the appointment to `failed`.
    pub async fn approve(&self, principal: &Principal, id: &str) -> Result<Appointment, BookingError> {
        let id = parse_appointment_id(id)?;
        let notice = self.prepare_approval(principal, &id)?;

        // No connection is held while the emails are in flight
        if let Err(e) = self.notifier.send_approval_emails(&notice).await {
            tracing::error!(appointment_id = %id, error = %e, "Approval emails failed");
            self.force_fail(&id)?;
            return Err(BookingError::NotificationFailure(e.to_string()));
        }

        let now = self.clock.now();
        let conn = self.open()?;
        let moved = transition_appointment_status(
            &conn,
            &id,
            AppointmentStatus::Pending,
            AppointmentStatus::Success,
            &now,
        )?;
        if !moved {
            tracing::warn!(appointment_id = %id, "Appointment changed while approval emails were sent");
            return Err(BookingError::IllegalTransition(
                "Appointment status changed during approval".into(),
            ));
        }

        let mut appt = notice.appointment;
        appt.status = AppointmentStatus::Success;
        appt.updated_at = now;
        tracing::info!(appointment_id = %appt.id, "Appointment approved");
        self.broadcast(RealtimeEvent::ApproveAppointment, &appt);
        Ok(appt)
    }

    fn prepare_approval(&self, principal: &Principal, id: &Uuid) -> Result<ApprovalNotice, BookingError> {
        let conn = self.open()?;
        let appt = load(&conn, id)?;

        if !principal.is_clinic(&appt.clinic_id) {
            return Err(BookingError::Forbidden(
                "Only the clinic hosting this appointment can approve it".into(),
            ));
        }
        if let Err(e) = lifecycle::check_approvable(&appt, self.clock.now()) {
            tracing::warn!(appointment_id = %appt.id, status = %appt.status, reason = %e, "Approval rejected");
            return Err(e);
        }

        let patient = get_patient(&conn, &appt.patient_id)?;
        let clinic = get_clinic(&conn, &appt.clinic_id)?;
        match (patient, clinic) {
            (Some(patient), Some(clinic)) => {
                Ok(ApprovalNotice::new(appt, &patient, &clinic, &self.public_url))
            }
            _ => {
                tracing::warn!(appointment_id = %appt.id, "Approval failed: party account missing");
                self.force_fail(&appt.id)?;
                Err(BookingError::NotFound(
                    "Appointment failed, user or hospital not found!".into(),
                ))
            }
        }
    }

    /// Move a still-pending appointment to `failed` and announce it.
    fn force_fail(&self, id: &Uuid) -> Result<(), BookingError> {
        let conn = self.open()?;
        let now = self.clock.now();
        if transition_appointment_status(&conn, id, AppointmentStatus::Pending, AppointmentStatus::Failed, &now)? {
            if let Some(appt) = get_appointment(&conn, id)? {
                self.broadcast(RealtimeEvent::CancelAppointment, &appt);
            }
        }
        Ok(())
    }

    /// Delete an appointment in any state and drop it from both parties' lists.
    ///
    /// The row delete commits on its own. If list cleanup then fails the
    /// appointment stays deleted and `PartialFailure` is returned; the
    /// consistency repair removes the leftover entries.
    pub fn delete(&self, principal: &Principal, id: &str) -> Result<Appointment, BookingError> {
        let id = parse_appointment_id(id)?;

        let mut conn = self.open()?;
        let appt = load(&conn, &id)?;
        ensure_party(principal, &appt)?;

        delete_appointment(&conn, &appt.id)?;
        tracing::info!(appointment_id = %appt.id, by = %principal.kind(), "Appointment deleted");
        self.broadcast(RealtimeEvent::DeleteAppointment, &appt);

        if let Err(e) = deregister(&mut conn, &appt) {
            tracing::error!(appointment_id = %appt.id, error = %e, "Appointment list cleanup failed");
            return Err(BookingError::PartialFailure {
                appointment_id: appt.id,
                reason: e.to_string(),
            });
        }
        Ok(appt)
    }

    // ─── Queries ───

    pub fn get(&self, id: &str) -> Result<Appointment, BookingError> {
        let id = parse_appointment_id(id)?;
        load(&self.open()?, &id)
    }

    pub fn list_all(&self) -> Result<Vec<Appointment>, BookingError> {
        Ok(list_appointments(&self.open()?)?)
    }

    pub fn list_for(&self, kind: AccountKind, account_id: &str) -> Result<Vec<Appointment>, BookingError> {
        let account_id = parse_account_id(kind, account_id)?;
        Ok(list_appointments_for(&self.open()?, kind, &account_id)?)
    }

    pub fn latest_for(
        &self,
        kind: AccountKind,
        account_id: &str,
        limit: u32,
    ) -> Result<Vec<Appointment>, BookingError> {
        if limit == 0 {
            return Err(BookingError::Validation("\"limit\" must be greater than or equal to 1".into()));
        }
        let account_id = parse_account_id(kind, account_id)?;
        Ok(list_latest_appointments(&self.open()?, kind, &account_id, limit)?)
    }

    /// Relay a verified video-session event to subscribers.
    pub fn relay_video_event(&self, event: Value) {
        self.publisher.publish(RealtimeEvent::VideoSessionEvent, event);
    }
}

fn parse_appointment_id(raw: &str) -> Result<Uuid, BookingError> {
    Uuid::parse_str(raw).map_err(|_| BookingError::NotFound(APPOINTMENT_NOT_FOUND.into()))
}

fn parse_account_id(kind: AccountKind, raw: &str) -> Result<Uuid, BookingError> {
    Uuid::parse_str(raw).map_err(|_| {
        BookingError::NotFound(match kind {
            AccountKind::Patient => "User not found".into(),
            AccountKind::Clinic => "Hospital not found".into(),
        })
    })
}

fn load(conn: &Connection, id: &Uuid) -> Result<Appointment, BookingError> {
    get_appointment(conn, id)?.ok_or_else(|| BookingError::NotFound(APPOINTMENT_NOT_FOUND.into()))
}

fn ensure_party(principal: &Principal, appt: &Appointment) -> Result<(), BookingError> {
    if principal.is_patient(&appt.patient_id) || principal.is_clinic(&appt.clinic_id) {
        Ok(())
    } else {
        Err(BookingError::Forbidden(
            "Only the patient or clinic of this appointment can do that".into(),
        ))
    }
}

fn deregister(conn: &mut Connection, appt: &Appointment) -> Result<(), BookingError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    unlink_appointment(&tx, AccountKind::Patient, &appt.patient_id, &appt.id)?;
    unlink_appointment(&tx, AccountKind::Clinic, &appt.clinic_id, &appt.id)?;
    tx.commit()?;
    Ok(())
}
