use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicalRecord {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub symptoms: String,
    pub diagnosis: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One entry of a patient's medical-record access set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessGrant {
    pub patient_id: Uuid,
    pub clinic_id: Uuid,
    pub granted_at: DateTime<Utc>,
}
