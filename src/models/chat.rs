use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub room_id: String,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Room shared by exactly one patient and one clinic: `<patient>_<clinic>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomId {
    pub patient_id: Uuid,
    pub clinic_id: Uuid,
}

impl RoomId {
    pub fn new(patient_id: Uuid, clinic_id: Uuid) -> Self {
        Self { patient_id, clinic_id }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let (patient, clinic) = raw.split_once('_')?;
        Some(Self {
            patient_id: Uuid::parse_str(patient).ok()?,
            clinic_id: Uuid::parse_str(clinic).ok()?,
        })
    }

    pub fn has_member(&self, account_id: &Uuid) -> bool {
        &self.patient_id == account_id || &self.clinic_id == account_id
    }

    /// The other party of the room, if `account_id` is a member.
    pub fn counterpart(&self, account_id: &Uuid) -> Option<Uuid> {
        if &self.patient_id == account_id {
            Some(self.clinic_id)
        } else if &self.clinic_id == account_id {
            Some(self.patient_id)
        } else {
            None
        }
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.patient_id, self.clinic_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_id_round_trips() {
        let room = RoomId::new(Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(RoomId::parse(&room.to_string()), Some(room));
    }

    #[test]
    fn malformed_room_ids_are_rejected() {
        assert!(RoomId::parse("not-a-room").is_none());
        assert!(RoomId::parse(&format!("{}_junk", Uuid::new_v4())).is_none());
    }

    #[test]
    fn counterpart_requires_membership() {
        let (p, c) = (Uuid::new_v4(), Uuid::new_v4());
        let room = RoomId::new(p, c);
        assert_eq!(room.counterpart(&p), Some(c));
        assert_eq!(room.counterpart(&c), Some(p));
        assert_eq!(room.counterpart(&Uuid::new_v4()), None);
    }
}
