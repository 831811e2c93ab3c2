//! Real-time channel: domain event fan-out plus patient/clinic chat rooms.
//!
//! Connection lifecycle:
//! 1. Client calls `POST /api/auth/ws-ticket` to get a one-time ticket
//! 2. Client opens `GET /ws/connect?ticket=xxx`; ticket consumed, WS upgraded
//! 3. Server sends Welcome, then forwards every published domain event
//! 4. `joinRoom` subscribes the connection to a room and replies with its history
//! 5. Heartbeat every 30s; 3 missed = disconnect

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::booking::types::validate_text;
use crate::core_state::CoreState;
use crate::db::repository::{insert_chat_message, list_room_messages};
use crate::events::{Audience, RealtimeEvent, RealtimeMessage};
use crate::models::{ChatMessage, Principal, RoomId};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Disconnect after this many missed heartbeats (3 × 30s = 90s).
const MAX_MISSED_HEARTBEATS: u32 = 3;

pub const MAX_CHAT_MESSAGE_LEN: usize = 2000;

const NOT_A_MEMBER: &str = "You're not authorized!";

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Deserialize)]
pub struct WsAuthQuery {
    ticket: String,
}

/// Client → server messages.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WsIncoming {
    JoinRoom { room_id: String },
    SendMessage { room_id: String, message: String },
    Typing { room_id: String },
    Pong {},
}

/// Server → client messages.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WsOutgoing {
    Welcome {
        connection_id: u64,
        account_id: Uuid,
        username: String,
    },
    /// Client should answer with `pong`.
    Heartbeat { server_time: String },
    /// A published domain or room event.
    Event { event: &'static str, payload: Value },
    ChatHistory { room_id: String, messages: Vec<ChatMessage> },
    Error { message: String },
}

/// Action returned by `WsSessionState::on_heartbeat_tick()`.
#[derive(Debug, PartialEq)]
pub(crate) enum HeartbeatAction {
    SendHeartbeat,
    HeartbeatTimeout,
}

/// Per-connection liveness and room state, kept apart from the socket so it
/// can be tested without one.
pub(crate) struct WsSessionState {
    missed_heartbeats: u32,
    rooms: HashSet<String>,
}

impl WsSessionState {
    fn new() -> Self {
        Self {
            missed_heartbeats: 0,
            rooms: HashSet::new(),
        }
    }

    fn on_pong(&mut self) {
        self.missed_heartbeats = 0;
    }

    fn on_heartbeat_tick(&mut self) -> HeartbeatAction {
        if self.missed_heartbeats >= MAX_MISSED_HEARTBEATS {
            return HeartbeatAction::HeartbeatTimeout;
        }
        self.missed_heartbeats += 1;
        HeartbeatAction::SendHeartbeat
    }

    fn join(&mut self, room_id: String) {
        self.rooms.insert(room_id);
    }

    /// Whether a published message is meant for this connection.
    fn wants(&self, audience: &Audience, connection_id: u64) -> bool {
        match audience {
            Audience::Everyone => true,
            Audience::Room {
                room_id,
                except_connection,
            } => self.rooms.contains(room_id) && *except_connection != Some(connection_id),
        }
    }
}

/// Who is on the other end of a connection.
struct Peer {
    connection_id: u64,
    principal: Principal,
    username: String,
}

/// WebSocket upgrade handler. The ticket is consumed before upgrading.
pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(ctx): State<ApiContext>,
    Query(query): Query<WsAuthQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (principal, username) = {
        let mut tickets = ctx
            .ws_tickets
            .lock()
            .map_err(|_| ApiError::Internal("ticket lock".into()))?;
        tickets.consume(&query.ticket).ok_or(ApiError::Unauthorized)?
    };

    let peer = Peer {
        connection_id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
        principal,
        username,
    };
    tracing::info!(
        connection_id = peer.connection_id,
        account_id = %peer.principal.id(),
        "WebSocket upgrade accepted"
    );
    let core = ctx.core.clone();
    Ok(ws.on_upgrade(move |socket| handle_ws(socket, core, peer)))
}

async fn handle_ws(socket: WebSocket, core: Arc<CoreState>, peer: Peer) {
    let (ws_sink, mut ws_stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<WsOutgoing>(64);

    // Subscribe before Welcome so nothing published afterwards is missed
    let mut events = core.events().subscribe();

    let sender_handle = tokio::spawn(async move {
        let mut sink = ws_sink;
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(_) => continue,
            };
            if sink.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let _ = tx
        .send(WsOutgoing::Welcome {
            connection_id: peer.connection_id,
            account_id: peer.principal.id(),
            username: peer.username.clone(),
        })
        .await;

    let mut session = WsSessionState::new();
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await; // Consume initial immediate tick

    loop {
        tokio::select! {
            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(Message::Text(ref text))) => {
                        match serde_json::from_str::<WsIncoming>(text) {
                            Ok(WsIncoming::Pong {}) => session.on_pong(),
                            Ok(incoming) => {
                                handle_incoming(&core, &peer, &mut session, incoming, &tx).await;
                            }
                            Err(e) => {
                                tracing::debug!(connection_id = peer.connection_id, error = %e, "Ignoring malformed WS message");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {} // Ping/Pong frames handled by axum/tungstenite
                }
            }
            published = events.recv() => {
                match published {
                    Ok(RealtimeMessage { event, payload, audience }) => {
                        if session.wants(&audience, peer.connection_id) {
                            let _ = tx.send(WsOutgoing::Event { event: event.as_str(), payload }).await;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(connection_id = peer.connection_id, skipped, "WebSocket client lagging, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = heartbeat.tick() => {
                match session.on_heartbeat_tick() {
                    HeartbeatAction::HeartbeatTimeout => {
                        tracing::info!(
                            connection_id = peer.connection_id,
                            "{MAX_MISSED_HEARTBEATS} missed heartbeats, disconnecting"
                        );
                        break;
                    }
                    HeartbeatAction::SendHeartbeat => {
                        let _ = tx.send(WsOutgoing::Heartbeat {
                            server_time: Utc::now().to_rfc3339(),
                        }).await;
                    }
                }
            }
        }
    }

    drop(tx);
    let _ = sender_handle.await;

    tracing::info!(connection_id = peer.connection_id, "WebSocket disconnected");
}

/// Resolve a room id the caller belongs to.
fn member_room(principal: &Principal, raw: &str) -> Option<RoomId> {
    RoomId::parse(raw).filter(|room| room.has_member(&principal.id()))
}

async fn handle_incoming(
    core: &Arc<CoreState>,
    peer: &Peer,
    session: &mut WsSessionState,
    msg: WsIncoming,
    tx: &mpsc::Sender<WsOutgoing>,
) {
    let result = match msg {
        WsIncoming::JoinRoom { room_id } => join_room(core, peer, session, &room_id, tx).await,
        WsIncoming::SendMessage { room_id, message } => send_message(core, peer, &room_id, message).await,
        WsIncoming::Typing { room_id } => match member_room(&peer.principal, &room_id) {
            Some(room) => {
                core.events().publish_to_room(
                    &room.to_string(),
                    Some(peer.connection_id),
                    RealtimeEvent::ResponseTyping,
                    Value::String(format!("{} is typing...", peer.username)),
                );
                Ok(())
            }
            None => Err(NOT_A_MEMBER.to_string()),
        },
        WsIncoming::Pong {} => Ok(()),
    };

    if let Err(message) = result {
        let _ = tx.send(WsOutgoing::Error { message }).await;
    }
}

async fn join_room(
    core: &Arc<CoreState>,
    peer: &Peer,
    session: &mut WsSessionState,
    raw: &str,
    tx: &mpsc::Sender<WsOutgoing>,
) -> Result<(), String> {
    let room = member_room(&peer.principal, raw).ok_or_else(|| NOT_A_MEMBER.to_string())?;
    let room_id = room.to_string();

    let history_core = core.clone();
    let history_room = room_id.clone();
    let messages = tokio::task::spawn_blocking(move || {
        let conn = history_core.open_db().map_err(|e| e.to_string())?;
        list_room_messages(&conn, &history_room).map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| format!("Task join error: {e}"))?
    .map_err(|e| {
        tracing::error!(room_id = %room_id, error = %e, "Failed to load chat history");
        "Failed to load chat history".to_string()
    })?;

    session.join(room_id.clone());
    tracing::debug!(connection_id = peer.connection_id, room_id = %room_id, "Joined room");
    let _ = tx.send(WsOutgoing::ChatHistory { room_id, messages }).await;
    Ok(())
}

async fn send_message(
    core: &Arc<CoreState>,
    peer: &Peer,
    raw: &str,
    message: String,
) -> Result<(), String> {
    let sender_id = peer.principal.id();
    let room = member_room(&peer.principal, raw).ok_or_else(|| NOT_A_MEMBER.to_string())?;
    let receiver_id = room.counterpart(&sender_id).ok_or_else(|| NOT_A_MEMBER.to_string())?;
    let message = validate_text("message", &message, MAX_CHAT_MESSAGE_LEN).map_err(|e| e.to_string())?;

    let chat = ChatMessage {
        id: Uuid::new_v4(),
        room_id: room.to_string(),
        sender_id,
        receiver_id,
        message,
        created_at: Utc::now(),
    };

    let store_core = core.clone();
    let stored = chat.clone();
    tokio::task::spawn_blocking(move || {
        let conn = store_core.open_db().map_err(|e| e.to_string())?;
        insert_chat_message(&conn, &stored).map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| format!("Task join error: {e}"))?
    .map_err(|e| {
        tracing::error!(room_id = %chat.room_id, error = %e, "Failed to store chat message");
        "Failed to send message".to_string()
    })?;

    match serde_json::to_value(&chat) {
        Ok(payload) => core
            .events()
            .publish_to_room(&chat.room_id, None, RealtimeEvent::NewMessage, payload),
        Err(e) => tracing::warn!(error = %e, "Chat message not serializable"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_missed_heartbeats_time_out() {
        let mut session = WsSessionState::new();
        session.on_heartbeat_tick();
        session.on_heartbeat_tick();
        assert_eq!(session.on_heartbeat_tick(), HeartbeatAction::SendHeartbeat);
        assert_eq!(session.on_heartbeat_tick(), HeartbeatAction::HeartbeatTimeout);
    }

    #[test]
    fn pong_resets_missed_counter() {
        let mut session = WsSessionState::new();
        session.on_heartbeat_tick();
        session.on_heartbeat_tick();
        session.on_pong();
        for _ in 0..3 {
            assert_eq!(session.on_heartbeat_tick(), HeartbeatAction::SendHeartbeat);
        }
        assert_eq!(session.on_heartbeat_tick(), HeartbeatAction::HeartbeatTimeout);
    }

    #[test]
    fn room_events_reach_joined_connections_except_sender() {
        let mut session = WsSessionState::new();
        let room = Audience::Room {
            room_id: "p_c".into(),
            except_connection: None,
        };
        assert!(session.wants(&Audience::Everyone, 1));
        assert!(!session.wants(&room, 1));

        session.join("p_c".into());
        assert!(session.wants(&room, 1));

        let typing = Audience::Room {
            room_id: "p_c".into(),
            except_connection: Some(1),
        };
        assert!(!session.wants(&typing, 1));
        assert!(session.wants(&typing, 2));
    }

    #[test]
    fn only_members_resolve_rooms() {
        let patient = Uuid::new_v4();
        let clinic = Uuid::new_v4();
        let raw = RoomId::new(patient, clinic).to_string();

        assert!(member_room(&Principal::Patient(patient), &raw).is_some());
        assert!(member_room(&Principal::Clinic(clinic), &raw).is_some());
        assert!(member_room(&Principal::Patient(Uuid::new_v4()), &raw).is_none());
        assert!(member_room(&Principal::Patient(patient), "garbage").is_none());
    }

    #[test]
    fn incoming_messages_use_camel_case_tags() {
        let msg: WsIncoming = serde_json::from_str(r#"{"type":"joinRoom","room_id":"a_b"}"#).unwrap();
        assert_eq!(msg, WsIncoming::JoinRoom { room_id: "a_b".into() });
        let msg: WsIncoming = serde_json::from_str(r#"{"type":"pong"}"#).unwrap();
        assert_eq!(msg, WsIncoming::Pong {});
    }

    // ═══════════════════════════════════════════════════════════
    // Integration tests: full WebSocket connection lifecycle
    // ═══════════════════════════════════════════════════════════

    use crate::api::router::api_router_with_ctx;
    use crate::config::AppConfig;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite;

    type Client = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    struct TestServer {
        ctx: ApiContext,
        addr: std::net::SocketAddr,
        handle: tokio::task::JoinHandle<()>,
        _dir: tempfile::TempDir,
    }

    impl TestServer {
        async fn start() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let core = Arc::new(CoreState::new(AppConfig::for_data_dir(dir.path().to_path_buf())).unwrap());
            let ctx = ApiContext::new(core);
            let app = api_router_with_ctx(ctx.clone());

            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let handle = tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });
            Self { ctx, addr, handle, _dir: dir }
        }

        fn url_for(&self, principal: Principal, username: &str) -> String {
            let ticket = self
                .ctx
                .ws_tickets
                .lock()
                .unwrap()
                .issue(principal, username.to_string());
            format!("ws://{}/ws/connect?ticket={ticket}", self.addr)
        }

        /// Connect and consume the Welcome message.
        async fn connect(&self, principal: Principal, username: &str) -> Client {
            let (mut ws, _) = tokio_tungstenite::connect_async(self.url_for(principal, username))
                .await
                .expect("WS connect failed");
            let welcome = next_json(&mut ws).await;
            assert_eq!(welcome["type"], "welcome");
            ws
        }
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            self.handle.abort();
        }
    }

    async fn next_json(ws: &mut Client) -> Value {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream ended")
            .expect("WS error");
        serde_json::from_str(&msg.into_text().expect("not text")).unwrap()
    }

    async fn send_json(ws: &mut Client, value: Value) {
        ws.send(tungstenite::Message::Text(value.to_string()))
            .await
            .expect("send failed");
    }

    #[tokio::test]
    async fn welcome_names_the_account() {
        let server = TestServer::start().await;
        let id = Uuid::new_v4();
        let (mut ws, _) = tokio_tungstenite::connect_async(server.url_for(Principal::Patient(id), "ada"))
            .await
            .unwrap();

        let welcome = next_json(&mut ws).await;
        assert_eq!(welcome["type"], "welcome");
        assert_eq!(welcome["account_id"], id.to_string());
        assert_eq!(welcome["username"], "ada");
        let _ = ws.close(None).await;
    }

    #[tokio::test]
    async fn invalid_ticket_rejects_upgrade() {
        let server = TestServer::start().await;
        let url = format!("ws://{}/ws/connect?ticket=invalid", server.addr);
        assert!(tokio_tungstenite::connect_async(&url).await.is_err());
    }

    #[tokio::test]
    async fn ticket_is_single_use() {
        let server = TestServer::start().await;
        let url = server.url_for(Principal::Patient(Uuid::new_v4()), "ada");

        let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        let _ = ws.close(None).await;

        assert!(tokio_tungstenite::connect_async(&url).await.is_err());
    }

    #[tokio::test]
    async fn domain_events_reach_every_client() {
        let server = TestServer::start().await;
        let mut ws = server.connect(Principal::Clinic(Uuid::new_v4()), "harbor").await;

        server
            .ctx
            .core
            .events()
            .publish_serialized(RealtimeEvent::NewReview, &serde_json::json!({"rating": 5}));

        let event = next_json(&mut ws).await;
        assert_eq!(event["type"], "event");
        assert_eq!(event["event"], "newReview");
        assert_eq!(event["payload"]["rating"], 5);
        let _ = ws.close(None).await;
    }

    #[tokio::test]
    async fn chat_round_trip_between_room_members() {
        let server = TestServer::start().await;
        let patient = Uuid::new_v4();
        let clinic = Uuid::new_v4();
        let room_id = RoomId::new(patient, clinic).to_string();

        let mut patient_ws = server.connect(Principal::Patient(patient), "ada").await;
        let mut clinic_ws = server.connect(Principal::Clinic(clinic), "harbor").await;

        for ws in [&mut patient_ws, &mut clinic_ws] {
            send_json(ws, serde_json::json!({"type": "joinRoom", "room_id": room_id})).await;
            let history = next_json(ws).await;
            assert_eq!(history["type"], "chatHistory");
            assert_eq!(history["messages"], serde_json::json!([]));
        }

        send_json(&mut clinic_ws, serde_json::json!({"type": "typing", "room_id": room_id})).await;
        let typing = next_json(&mut patient_ws).await;
        assert_eq!(typing["event"], "responseTyping");
        assert_eq!(typing["payload"], "harbor is typing...");

        send_json(
            &mut patient_ws,
            serde_json::json!({"type": "sendMessage", "room_id": room_id, "message": "Hello doctor"}),
        )
        .await;
        for ws in [&mut patient_ws, &mut clinic_ws] {
            let delivered = next_json(ws).await;
            assert_eq!(delivered["event"], "newMessage");
            assert_eq!(delivered["payload"]["message"], "Hello doctor");
            assert_eq!(delivered["payload"]["receiver_id"], clinic.to_string());
        }

        // History is persisted for later joiners
        let mut again = server.connect(Principal::Clinic(clinic), "harbor").await;
        send_json(&mut again, serde_json::json!({"type": "joinRoom", "room_id": room_id})).await;
        let history = next_json(&mut again).await;
        assert_eq!(history["messages"].as_array().unwrap().len(), 1);

        let _ = patient_ws.close(None).await;
        let _ = clinic_ws.close(None).await;
        let _ = again.close(None).await;
    }

    #[tokio::test]
    async fn outsiders_cannot_join_rooms() {
        let server = TestServer::start().await;
        let room_id = RoomId::new(Uuid::new_v4(), Uuid::new_v4()).to_string();
        let mut ws = server.connect(Principal::Patient(Uuid::new_v4()), "eve").await;

        send_json(&mut ws, serde_json::json!({"type": "joinRoom", "room_id": room_id})).await;
        let reply = next_json(&mut ws).await;
        assert_eq!(reply["type"], "error");
        assert_eq!(reply["message"], "You're not authorized!");
        let _ = ws.close(None).await;
    }

    #[tokio::test]
    async fn message_bursts_are_all_delivered() {
        let server = TestServer::start().await;
        let patient = Uuid::new_v4();
        let room_id = RoomId::new(patient, Uuid::new_v4()).to_string();
        let mut ws = server.connect(Principal::Patient(patient), "ada").await;

        send_json(&mut ws, serde_json::json!({"type": "joinRoom", "room_id": room_id})).await;
        assert_eq!(next_json(&mut ws).await["type"], "chatHistory");

        for i in 0..25 {
            send_json(
                &mut ws,
                serde_json::json!({"type": "sendMessage", "room_id": room_id, "message": format!("m{i}")}),
            )
            .await;
        }
        for i in 0..25 {
            let delivered = next_json(&mut ws).await;
            assert_eq!(delivered["event"], "newMessage");
            assert_eq!(delivered["payload"]["message"], format!("m{i}"));
        }
        let _ = ws.close(None).await;
    }

    #[tokio::test]
    async fn malformed_json_keeps_connection() {
        let server = TestServer::start().await;
        let mut ws = server.connect(Principal::Patient(Uuid::new_v4()), "ada").await;

        ws.send(tungstenite::Message::Text("not valid json {{{".into()))
            .await
            .unwrap();

        // Still alive: a published event is delivered afterwards
        tokio::time::sleep(Duration::from_millis(50)).await;
        server
            .ctx
            .core
            .events()
            .publish_serialized(RealtimeEvent::OnlineUsers, &Vec::<String>::new());
        let event = next_json(&mut ws).await;
        assert_eq!(event["event"], "onlineUsers");
        let _ = ws.close(None).await;
    }
}
