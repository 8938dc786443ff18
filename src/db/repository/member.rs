use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::MemberRecord;

/// Register a family member and return the record with its generated id.
pub fn insert_member(
    conn: &Connection,
    user_key: &str,
    name: &str,
    dob: Option<&str>,
) -> Result<MemberRecord, DatabaseError> {
    if name.trim().is_empty() {
        return Err(DatabaseError::InvalidInput(
            "Family member name cannot be empty".into(),
        ));
    }

    let record = MemberRecord {
        id: Uuid::new_v4().to_string(),
        user_key: user_key.to_string(),
        name: name.to_string(),
        dob: dob.map(str::to_string),
    };

    conn.execute(
        "INSERT INTO members (id, user_key, name, dob) VALUES (?1, ?2, ?3, ?4)",
        params![record.id, record.user_key, record.name, record.dob],
    )?;
    Ok(record)
}

/// Display name for a member id. Unknown ids are `NotFound`.
pub fn find_member_name(conn: &Connection, member_id: &str) -> Result<String, DatabaseError> {
    conn.query_row(
        "SELECT name FROM members WHERE id = ?1",
        params![member_id],
        |row| row.get::<_, String>(0),
    )
    .optional()?
    .ok_or_else(|| DatabaseError::NotFound {
        entity_type: "FamilyMember".into(),
        id: member_id.to_string(),
    })
}

/// Members registered under `user_key`, ordered by name.
pub fn list_members_for_user(
    conn: &Connection,
    user_key: &str,
) -> Result<Vec<MemberRecord>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, user_key, name, dob FROM members WHERE user_key = ?1 ORDER BY name",
    )?;
    let rows = stmt.query_map(params![user_key], |row| {
        Ok(MemberRecord {
            id: row.get(0)?,
            user_key: row.get(1)?,
            name: row.get(2)?,
            dob: row.get(3)?,
        })
    })?;

    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}
