//! SQLite-backed document store: the member directory and the medicine ledger.
//!
//! A rusqlite `Connection` is `Send` but not `Sync`, so the store keeps one
//! connection behind a `Mutex` and hands it to the repository functions.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;

use super::repository::{self, LedgerUpsert, MedicineLedger, MemberDirectory};
use super::sqlite::{open_database, open_memory_database};
use super::DatabaseError;
use crate::models::{MedicineRecord, MemberRecord};

pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
}

impl SqliteDocumentStore {
    /// Open (or create) the database file, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        tracing::info!(path = %path.display(), "Opening document store");
        Ok(Self {
            conn: Mutex::new(open_database(path)?),
        })
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self {
            conn: Mutex::new(open_memory_database()?),
        })
    }

    /// Run `f` with exclusive access to the connection.
    pub fn with_connection<T, F>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }

    pub fn insert_member(
        &self,
        user_key: &str,
        name: &str,
        dob: Option<&str>,
    ) -> Result<MemberRecord, DatabaseError> {
        self.with_connection(|conn| repository::insert_member(conn, user_key, name, dob))
    }

    pub fn members_for_user(&self, user_key: &str) -> Result<Vec<MemberRecord>, DatabaseError> {
        self.with_connection(|conn| repository::list_members_for_user(conn, user_key))
    }

    pub fn medicines_for_member(&self, member_id: &str) -> Result<Vec<MedicineRecord>, DatabaseError> {
        self.with_connection(|conn| repository::get_medicines_for_member(conn, member_id))
    }
}

impl MemberDirectory for SqliteDocumentStore {
    fn find_name(&self, member_id: &str) -> Result<String, DatabaseError> {
        self.with_connection(|conn| repository::find_member_name(conn, member_id))
    }
}

impl MedicineLedger for SqliteDocumentStore {
    fn upsert(
        &self,
        member_id: &str,
        medicine_name: &str,
        dosage: &str,
        times: &[String],
    ) -> Result<LedgerUpsert, DatabaseError> {
        self.with_connection(|conn| {
            repository::upsert_medicine(conn, member_id, medicine_name, dosage, times)
        })
    }
}
