use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::AccountKind;

pub const DEFAULT_CLINIC_BIO: &str = "Bridging health with technology";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub name: String,
    pub username: String,
    pub email: String,
    pub profile_picture: String,
    pub bio: Option<String>,
    pub location: String,
    pub online: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clinic {
    pub id: Uuid,
    pub clinic_name: String,
    pub username: String,
    pub email: String,
    pub profile_picture: String,
    pub bio: String,
    pub location: String,
    pub online: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The authenticated party behind a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Principal {
    Patient(Uuid),
    Clinic(Uuid),
}

impl Principal {
    pub fn new(kind: AccountKind, id: Uuid) -> Self {
        match kind {
            AccountKind::Patient => Principal::Patient(id),
            AccountKind::Clinic => Principal::Clinic(id),
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Principal::Patient(id) | Principal::Clinic(id) => *id,
        }
    }

    pub fn kind(&self) -> AccountKind {
        match self {
            Principal::Patient(_) => AccountKind::Patient,
            Principal::Clinic(_) => AccountKind::Clinic,
        }
    }

    pub fn is_patient(&self, id: &Uuid) -> bool {
        matches!(self, Principal::Patient(own) if own == id)
    }

    pub fn is_clinic(&self, id: &Uuid) -> bool {
        matches!(self, Principal::Clinic(own) if own == id)
    }
}

/// Public fields shown in presence lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSummary {
    pub id: Uuid,
    pub kind: AccountKind,
    pub display_name: String,
    pub username: String,
    pub profile_picture: String,
}

impl From<&Patient> for AccountSummary {
    fn from(p: &Patient) -> Self {
        Self {
            id: p.id,
            kind: AccountKind::Patient,
            display_name: p.name.clone(),
            username: p.username.clone(),
            profile_picture: p.profile_picture.clone(),
        }
    }
}

impl From<&Clinic> for AccountSummary {
    fn from(c: &Clinic) -> Self {
        Self {
            id: c.id,
            kind: AccountKind::Clinic,
            display_name: c.clinic_name.clone(),
            username: c.username.clone(),
            profile_picture: c.profile_picture.clone(),
        }
    }
}
