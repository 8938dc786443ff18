use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A family member as known to the document store.
///
/// `id` is opaque and generated; the schedule file addresses the same person
/// by `name` under `user_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub id: String,
    pub user_key: String,
    pub name: String,
    pub dob: Option<String>,
}

/// One ledger document: a medicine schedule for one member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicineRecord {
    pub id: Uuid,
    pub family_member_id: String,
    pub name: String,
    pub dosage: String,
    pub times: Vec<String>,
    pub updated_at: NaiveDateTime,
}
