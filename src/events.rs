//! In-process fan-out of domain events to connected WebSocket clients.
//!
//! Booking, review and account operations publish here after their writes
//! commit. Each WebSocket connection holds a broadcast receiver and filters
//! room-scoped messages itself.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

/// Buffered messages per subscriber before it starts lagging.
const EVENT_BUFFER: usize = 256;

/// Named events relayed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealtimeEvent {
    NewAppointment,
    UpdateAppointment,
    CancelAppointment,
    ApproveAppointment,
    DeleteAppointment,
    NewReview,
    UpdateReview,
    DeleteReview,
    UserLogin,
    UserLogout,
    OnlineUsers,
    OnlineHospitals,
    VideoSessionEvent,
    NewMessage,
    ResponseTyping,
}

impl RealtimeEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewAppointment => "newAppointment",
            Self::UpdateAppointment => "updateAppointment",
            Self::CancelAppointment => "cancelAppointment",
            Self::ApproveAppointment => "approveAppointment",
            Self::DeleteAppointment => "deleteAppointment",
            Self::NewReview => "newReview",
            Self::UpdateReview => "updateReview",
            Self::DeleteReview => "deleteReview",
            Self::UserLogin => "userLogin",
            Self::UserLogout => "userLogout",
            Self::OnlineUsers => "onlineUsers",
            Self::OnlineHospitals => "onlineHospitals",
            Self::VideoSessionEvent => "videoSessionEvent",
            Self::NewMessage => "newMessage",
            Self::ResponseTyping => "responseTyping",
        }
    }
}

/// Where a message should be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    Everyone,
    /// Members of a chat room, optionally skipping the connection that sent it.
    Room { room_id: String, except_connection: Option<u64> },
}

#[derive(Debug, Clone)]
pub struct RealtimeMessage {
    pub event: RealtimeEvent,
    pub payload: Value,
    pub audience: Audience,
}

/// Publishing side of the event seam.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: RealtimeEvent, payload: Value);
}

/// Broadcast hub shared by the HTTP layer and every WebSocket connection.
#[derive(Debug, Clone)]
pub struct EventHub {
    tx: broadcast::Sender<RealtimeMessage>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeMessage> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn publish_to_room(
        &self,
        room_id: &str,
        except_connection: Option<u64>,
        event: RealtimeEvent,
        payload: Value,
    ) {
        self.send(RealtimeMessage {
            event,
            payload,
            audience: Audience::Room {
                room_id: room_id.to_string(),
                except_connection,
            },
        });
    }

    /// Serialize `payload` and publish it to everyone.
    pub fn publish_serialized<T: Serialize>(&self, event: RealtimeEvent, payload: &T) {
        match serde_json::to_value(payload) {
            Ok(value) => self.publish(event, value),
            Err(e) => tracing::warn!(event = event.as_str(), error = %e, "Event payload not serializable"),
        }
    }

    fn send(&self, message: RealtimeMessage) {
        let event = message.event.as_str();
        // No subscribers is normal when no client is connected
        if self.tx.send(message).is_err() {
            tracing::trace!(event, "Event dropped, no subscribers");
        } else {
            tracing::debug!(event, "Event published");
        }
    }
}

impl EventPublisher for EventHub {
    fn publish(&self, event: RealtimeEvent, payload: Value) {
        self.send(RealtimeMessage { event, payload, audience: Audience::Everyone });
    }
}
