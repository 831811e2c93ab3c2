use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::Serialize;

use super::error::NotifyError;
use super::traits::Notifier;
use super::types::ApprovalNotice;

/// Logs approval emails instead of sending them. Used when no relay is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send_approval_emails<'a>(
        &'a self,
        notice: &'a ApprovalNotice,
    ) -> BoxFuture<'a, Result<(), NotifyError>> {
        async move {
            tracing::info!(
                appointment_id = %notice.appointment.id,
                patient = %notice.patient_email,
                clinic = %notice.clinic_email,
                "Approval emails logged (no mail relay configured)"
            );
            Ok(())
        }
        .boxed()
    }
}

/// Request body for the relay's send endpoint
#[derive(Serialize)]
struct OutgoingEmail<'a> {
    to: &'a str,
    subject: &'a str,
    html: String,
}

/// Posts each email as JSON to an HTTP mail relay.
pub struct MailRelayNotifier {
    endpoint: String,
    client: reqwest::Client,
}

impl MailRelayNotifier {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn send(&self, email: &OutgoingEmail<'_>) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(email)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected {
                recipient: email.to.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

impl Notifier for MailRelayNotifier {
    fn send_approval_emails<'a>(
        &'a self,
        notice: &'a ApprovalNotice,
    ) -> BoxFuture<'a, Result<(), NotifyError>> {
        async move {
            let subject = "Appointment Approved";
            let to_patient = OutgoingEmail {
                to: &notice.patient_email,
                subject,
                html: approval_body(
                    &notice.patient_name,
                    &notice.clinic_name,
                    notice,
                    &notice.patient_meeting_link,
                    &notice.patient_reschedule_link,
                ),
            };
            let to_clinic = OutgoingEmail {
                to: &notice.clinic_email,
                subject,
                html: approval_body(
                    &notice.clinic_name,
                    &notice.patient_name,
                    notice,
                    &notice.clinic_meeting_link,
                    &notice.clinic_reschedule_link,
                ),
            };

            let (patient, clinic) = tokio::join!(self.send(&to_patient), self.send(&to_clinic));
            patient?;
            clinic?;
            tracing::info!(appointment_id = %notice.appointment.id, "Approval emails sent");
            Ok(())
        }
        .boxed()
    }
}

/// Escape text for an HTML body or a double-quoted attribute.
fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn approval_body(
    recipient: &str,
    counterpart: &str,
    notice: &ApprovalNotice,
    meeting_link: &str,
    reschedule_link: &str,
) -> String {
    let appt = &notice.appointment;
    format!(
        "<p>Hello {recipient},</p>\
         <p>Your appointment \"{title}\" with {counterpart} has been approved.</p>\
         <p>It runs from {start} to {end} (UTC).</p>\
         <p><a href=\"{meeting_link}\">Join the session</a> · \
         <a href=\"{reschedule_link}\">Reschedule</a></p>",
        recipient = escape_html(recipient),
        counterpart = escape_html(counterpart),
        meeting_link = escape_html(meeting_link),
        reschedule_link = escape_html(reschedule_link),
        title = escape_html(&appt.title),
        start = appt.start_at.format("%Y-%m-%d %H:%M"),
        end = appt.end_at.format("%Y-%m-%d %H:%M"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::testing::sample_notice;

    #[tokio::test]
    async fn log_notifier_always_succeeds() {
        let notice = sample_notice();
        assert!(LogNotifier.send_approval_emails(&notice).await.is_ok());
    }

    #[tokio::test]
    async fn unreachable_relay_is_transport_error() {
        // Port 9 (discard) on localhost is closed in test environments
        let notifier = MailRelayNotifier::new("http://127.0.0.1:9/send", Duration::from_secs(2)).unwrap();
        let notice = sample_notice();
        let err = notifier.send_approval_emails(&notice).await.unwrap_err();
        assert!(matches!(err, NotifyError::Transport(_)));
    }

    #[test]
    fn body_names_both_parties_and_links() {
        let notice = sample_notice();
        let html = approval_body("Ada", "Harbor", &notice, "https://m", "https://r");
        assert!(html.contains("Hello Ada"));
        assert!(html.contains("with Harbor"));
        assert!(html.contains("href=\"https://m\""));
    }

    #[test]
    fn body_escapes_user_supplied_text() {
        let mut notice = sample_notice();
        notice.appointment.title = "<script>alert(1)</script> & \"more\"".into();
        let html = approval_body("<b>Ada</b>", "Harbor & Co", &notice, "https://m", "https://r");
        assert!(!html.contains("<script>"));
        assert!(!html.contains("<b>Ada"));
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt; &amp; &quot;more&quot;"));
        assert!(html.contains("Hello &lt;b&gt;Ada&lt;/b&gt;"));
        assert!(html.contains("with Harbor &amp; Co"));
    }
}
