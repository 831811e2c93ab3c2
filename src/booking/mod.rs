//! Appointment core: conflict detection, the status lifecycle, the
//! medical-record access ledger and the orchestrator that composes them.

pub mod conflict;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod notifier;
pub mod orchestrator;
pub mod traits;
pub mod types;

pub use error::{BookingError, NotifyError};
pub use notifier::{LogNotifier, MailRelayNotifier};
pub use orchestrator::AppointmentService;
pub use traits::{Clock, Notifier, SystemClock};
pub use types::*;

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use chrono::{DateTime, Duration, Utc};
    use futures_util::future::BoxFuture;
    use futures_util::FutureExt;
    use serde_json::Value;
    use uuid::Uuid;

    use super::*;
    use crate::events::{EventPublisher, RealtimeEvent};
    use crate::models::enums::AppointmentStatus;
    use crate::models::{Appointment, Clinic, Patient, DEFAULT_CLINIC_BIO};

    /// Records every published event in order.
    #[derive(Default)]
    pub struct RecordingPublisher {
        events: Mutex<Vec<(RealtimeEvent, Value)>>,
    }

    impl RecordingPublisher {
        pub fn names(&self) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .map(|(e, _)| e.as_str().to_string())
                .collect()
        }
    }

    impl EventPublisher for RecordingPublisher {
        fn publish(&self, event: RealtimeEvent, payload: Value) {
            self.events.lock().unwrap().push((event, payload));
        }
    }

    /// Notifier whose outcome is fixed at construction.
    pub struct FakeNotifier {
        fail: bool,
        sent: AtomicUsize,
    }

    impl FakeNotifier {
        pub fn succeeding() -> Self {
            Self { fail: false, sent: AtomicUsize::new(0) }
        }

        pub fn failing() -> Self {
            Self { fail: true, sent: AtomicUsize::new(0) }
        }

        pub fn sent(&self) -> usize {
            self.sent.load(Ordering::SeqCst)
        }
    }

    impl Notifier for FakeNotifier {
        fn send_approval_emails<'a>(
            &'a self,
            _notice: &'a ApprovalNotice,
        ) -> BoxFuture<'a, Result<(), NotifyError>> {
            async move {
                if self.fail {
                    return Err(NotifyError::Transport("relay down".into()));
                }
                self.sent.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            .boxed()
        }
    }

    pub struct FixedClock(pub DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    pub fn sample_notice() -> ApprovalNotice {
        let now = Utc::now();
        let patient = Patient {
            id: Uuid::new_v4(),
            name: "Ada".into(),
            username: "ada".into(),
            email: "ada@example.com".into(),
            profile_picture: String::new(),
            bio: None,
            location: String::new(),
            online: false,
            created_at: now,
            updated_at: now,
        };
        let clinic = Clinic {
            id: Uuid::new_v4(),
            clinic_name: "Harbor".into(),
            username: "harbor".into(),
            email: "desk@harbor.example.com".into(),
            profile_picture: String::new(),
            bio: DEFAULT_CLINIC_BIO.into(),
            location: String::new(),
            online: false,
            created_at: now,
            updated_at: now,
        };
        let appointment = Appointment {
            id: Uuid::new_v4(),
            title: "Consultation".into(),
            description: "Follow-up".into(),
            patient_id: patient.id,
            clinic_id: clinic.id,
            start_at: now + Duration::days(1),
            end_at: now + Duration::days(1) + Duration::minutes(30),
            status: AppointmentStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        ApprovalNotice::new(appointment, &patient, &clinic, "https://care.example.com/")
    }
}
