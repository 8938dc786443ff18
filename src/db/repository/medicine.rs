use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::LedgerUpsert;
use crate::db::DatabaseError;
use crate::models::MedicineRecord;

/// Insert or update the schedule document for (member, medicine name).
///
/// One statement: the unique `(family_member_id, name)` index turns the insert
/// into an update on conflict, so concurrent writers never produce duplicates.
/// `RETURNING id` tells the two cases apart: a fresh row carries the id we
/// generated, an updated row keeps its original id.
pub fn upsert_medicine(
    conn: &Connection,
    member_id: &str,
    name: &str,
    dosage: &str,
    times: &[String],
) -> Result<LedgerUpsert, DatabaseError> {
    if name.is_empty() {
        return Err(DatabaseError::InvalidInput(
            "Medicine name cannot be empty".into(),
        ));
    }

    let candidate_id = Uuid::new_v4().to_string();
    let times_json = serde_json::to_string(times)?;
    let now = Utc::now().naive_utc();

    let stored_id: String = conn.query_row(
        "INSERT INTO medicines (id, family_member_id, name, dosage, times, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT (family_member_id, name) DO UPDATE SET
             dosage = excluded.dosage,
             times = excluded.times,
             updated_at = excluded.updated_at
         RETURNING id",
        params![candidate_id, member_id, name, dosage, times_json, now],
        |row| row.get(0),
    )?;

    if stored_id == candidate_id {
        tracing::debug!(member_id, medicine = name, "Inserted new medicine schedule");
        Ok(LedgerUpsert::Inserted)
    } else {
        tracing::debug!(member_id, medicine = name, "Updated existing medicine schedule");
        Ok(LedgerUpsert::Updated)
    }
}

pub fn get_medicines_for_member(
    conn: &Connection,
    member_id: &str,
) -> Result<Vec<MedicineRecord>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, family_member_id, name, dosage, times, updated_at
         FROM medicines WHERE family_member_id = ?1 ORDER BY name",
    )?;

    let rows = stmt.query_map(params![member_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, NaiveDateTime>(5)?,
        ))
    })?;

    let mut records = Vec::new();
    for row in rows {
        let (id, family_member_id, name, dosage, times, updated_at) = row?;
        records.push(MedicineRecord {
            id: Uuid::parse_str(&id).map_err(|_| DatabaseError::Corrupt {
                field: "medicines.id".into(),
                value: id.clone(),
            })?,
            family_member_id,
            name,
            dosage,
            times: serde_json::from_str(&times)?,
            updated_at,
        });
    }
    Ok(records)
}
