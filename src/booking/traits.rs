//! Seams of the booking core.
//!
//! - Notifier: delivers approval emails (mail relay in production, fakes in tests)
//! - Clock: source of "now" for expiry checks and timestamps
//!
//! Event publication goes through [`crate::events::EventPublisher`].

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;

use super::error::NotifyError;
use super::types::ApprovalNotice;

pub trait Notifier: Send + Sync {
    /// Send the patient and clinic emails for an approval.
    /// Succeeds only when both were delivered.
    fn send_approval_emails<'a>(
        &'a self,
        notice: &'a ApprovalNotice,
    ) -> BoxFuture<'a, Result<(), NotifyError>>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
