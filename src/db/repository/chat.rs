use rusqlite::{params, Connection};

use super::{ts_from_db, ts_to_db, uuid_from_db};
use crate::db::DatabaseError;
use crate::models::ChatMessage;

pub fn insert_chat_message(conn: &Connection, msg: &ChatMessage) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO chat_messages (id, room_id, sender_id, receiver_id, message, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            msg.id.to_string(),
            msg.room_id,
            msg.sender_id.to_string(),
            msg.receiver_id.to_string(),
            msg.message,
            ts_to_db(&msg.created_at),
        ],
    )?;
    Ok(())
}

/// Full history of a room, oldest first.
pub fn list_room_messages(conn: &Connection, room_id: &str) -> Result<Vec<ChatMessage>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, room_id, sender_id, receiver_id, message, created_at
         FROM chat_messages WHERE room_id = ?1 ORDER BY created_at, id",
    )?;
    let rows = stmt.query_map(params![room_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
        ))
    })?;

    let mut messages = Vec::new();
    for row in rows {
        let (id, room_id, sender, receiver, message, created_at) = row?;
        messages.push(ChatMessage {
            id: uuid_from_db(&id)?,
            room_id,
            sender_id: uuid_from_db(&sender)?,
            receiver_id: uuid_from_db(&receiver)?,
            message,
            created_at: ts_from_db(&created_at)?,
        });
    }
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;
    use crate::db::sqlite::open_memory_database;

    #[test]
    fn history_is_scoped_to_room_and_ordered() {
        let conn = open_memory_database().unwrap();
        let now = Utc::now();
        let msg = |room: &str, text: &str, offset: i64| ChatMessage {
            id: Uuid::new_v4(),
            room_id: room.into(),
            sender_id: Uuid::new_v4(),
            receiver_id: Uuid::new_v4(),
            message: text.into(),
            created_at: now + Duration::seconds(offset),
        };
        insert_chat_message(&conn, &msg("a_b", "second", 5)).unwrap();
        insert_chat_message(&conn, &msg("a_b", "first", 0)).unwrap();
        insert_chat_message(&conn, &msg("c_d", "elsewhere", 1)).unwrap();

        let history = list_room_messages(&conn, "a_b").unwrap();
        let texts: Vec<_> = history.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
    }
}
