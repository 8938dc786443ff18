//! File-backed schedule store: users → family members → medicine schedules.
//!
//! Every mutation is a full cycle: load the whole file, change it in memory,
//! overwrite the whole file. The cycle runs under a store-wide mutex so two
//! requests in this process cannot interleave and drop each other's update.
//! The file is replaced by rename from a temp file in the same directory, so
//! a reader never sees a half-written document. Separate processes sharing
//! the same file are not coordinated.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::NamedTempFile;
use thiserror::Error;

use crate::models::{FamilyMember, MealTimes, ScheduleData, ScheduleEntry, UserRecord};

#[derive(Error, Debug)]
pub enum ScheduleStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Schedule file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to replace schedule file: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("Internal lock error")]
    LockPoisoned,
}

/// What `upsert_schedule` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleUpsert {
    Inserted,
    Updated,
    /// User or family member does not exist; nothing was written.
    MissingTarget,
}

pub struct ScheduleStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ScheduleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole store. A missing or blank file is an empty store.
    pub fn load(&self) -> Result<ScheduleData, ScheduleStoreError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No schedule file yet, starting fresh");
                return Ok(ScheduleData::new());
            }
            Err(e) => return Err(e.into()),
        };

        if raw.trim().is_empty() {
            return Ok(ScheduleData::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    /// Overwrite the whole store.
    pub fn save(&self, data: &ScheduleData) -> Result<(), ScheduleStoreError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, data)?;
        tmp.write_all(b"\n")?;
        match std::fs::metadata(&self.path) {
            Ok(existing) => tmp.as_file().set_permissions(existing.permissions())?,
            Err(e) if e.kind() == ErrorKind::NotFound => set_new_file_permissions(tmp.as_file())?,
            Err(e) => return Err(e.into()),
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;

        tracing::debug!(path = %self.path.display(), users = data.len(), "Schedule file saved");
        Ok(())
    }

    /// Serialized load → mutate → save. `f` returns its result and whether it
    /// changed anything; unchanged data is not written back.
    fn update<T, F>(&self, f: F) -> Result<T, ScheduleStoreError>
    where
        F: FnOnce(&mut ScheduleData) -> (T, bool),
    {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| ScheduleStoreError::LockPoisoned)?;

        let mut data = self.load()?;
        let (result, changed) = f(&mut data);
        if changed {
            self.save(&data)?;
        }
        Ok(result)
    }

    /// Register a user. Existing users are left untouched.
    pub fn add_user(&self, user_key: &str) -> Result<bool, ScheduleStoreError> {
        let added = self.update(|data| {
            if data.contains_key(user_key) {
                (false, false)
            } else {
                data.insert(user_key.to_string(), UserRecord::default());
                (true, true)
            }
        })?;
        if added {
            tracing::info!(user = user_key, "Added new user");
        }
        Ok(added)
    }

    /// Remove a user together with all family members and their schedules.
    pub fn remove_user(&self, user_key: &str) -> Result<bool, ScheduleStoreError> {
        let removed = self.update(|data| {
            let removed = data.remove(user_key).is_some();
            (removed, removed)
        })?;
        if removed {
            tracing::info!(user = user_key, "Removed user");
        }
        Ok(removed)
    }

    /// Add a family member under an existing user, replacing any member with
    /// the same name. Unknown users are a no-op.
    pub fn add_family_member(
        &self,
        user_key: &str,
        family_name: &str,
        dob: &str,
        meal_times: MealTimes,
    ) -> Result<bool, ScheduleStoreError> {
        let added = self.update(|data| match data.get_mut(user_key) {
            Some(user) => {
                user.family_members
                    .insert(family_name.to_string(), FamilyMember::new(dob, meal_times));
                (true, true)
            }
            None => (false, false),
        })?;
        if added {
            tracing::info!(user = user_key, member = family_name, "Added family member");
        } else {
            tracing::warn!(user = user_key, member = family_name, "Cannot add family member to unknown user");
        }
        Ok(added)
    }

    pub fn remove_family_member(
        &self,
        user_key: &str,
        family_name: &str,
    ) -> Result<bool, ScheduleStoreError> {
        let removed = self.update(|data| {
            let removed = data
                .get_mut(user_key)
                .map(|user| user.family_members.remove(family_name).is_some())
                .unwrap_or(false);
            (removed, removed)
        })?;
        if removed {
            tracing::info!(user = user_key, member = family_name, "Removed family member");
        }
        Ok(removed)
    }

    /// Add or replace one medicine on a member's schedule.
    ///
    /// The medicine name is matched exactly (case-sensitive). A match gets its
    /// dosage and times replaced in place; otherwise a new entry is appended.
    pub fn upsert_schedule(
        &self,
        user_key: &str,
        family_name: &str,
        medicine: &str,
        dosage: &str,
        times: &[String],
    ) -> Result<ScheduleUpsert, ScheduleStoreError> {
        let outcome = self.update(|data| {
            let Some(member) = data
                .get_mut(user_key)
                .and_then(|user| user.family_members.get_mut(family_name))
            else {
                return (ScheduleUpsert::MissingTarget, false);
            };

            match member.schedules.iter_mut().find(|s| s.medicine == medicine) {
                Some(existing) => {
                    existing.dosage = dosage.to_string();
                    existing.times = times.to_vec();
                    (ScheduleUpsert::Updated, true)
                }
                None => {
                    member
                        .schedules
                        .push(ScheduleEntry::new(medicine, dosage, times));
                    (ScheduleUpsert::Inserted, true)
                }
            }
        })?;

        match outcome {
            ScheduleUpsert::MissingTarget => tracing::warn!(
                user = user_key,
                member = family_name,
                medicine,
                "Schedule target does not exist, skipping"
            ),
            _ => tracing::info!(
                user = user_key,
                member = family_name,
                medicine,
                dosage,
                times = %times.join(", "),
                outcome = ?outcome,
                "Schedule upserted"
            ),
        }
        Ok(outcome)
    }

    pub fn family_member(
        &self,
        user_key: &str,
        family_name: &str,
    ) -> Result<Option<FamilyMember>, ScheduleStoreError> {
        let mut data = self.load()?;
        Ok(data
            .get_mut(user_key)
            .and_then(|user| user.family_members.remove(family_name)))
    }

    pub fn meal_times(
        &self,
        user_key: &str,
        family_name: &str,
    ) -> Result<Option<MealTimes>, ScheduleStoreError> {
        Ok(self
            .family_member(user_key, family_name)?
            .and_then(|member| member.meal_times))
    }
}

/// Temp files are created owner-only; a fresh schedule file gets the usual
/// world-readable mode instead (0o644 on Unix).
#[cfg(unix)]
fn set_new_file_permissions(file: &std::fs::File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn set_new_file_permissions(_file: &std::fs::File) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn meals() -> MealTimes {
        MealTimes::new("08:00", "13:00", "20:00")
    }

    fn times(values: &[&str]) -> Vec<String> {
        values.iter().map(|t| t.to_string()).collect()
    }

    fn seeded_store(dir: &tempfile::TempDir) -> ScheduleStore {
        let store = ScheduleStore::new(dir.path().join("schedule.json"));
        store.add_user("a@x.com").unwrap();
        store
            .add_family_member("a@x.com", "Alice", "1990-01-01", meals())
            .unwrap();
        store
    }

    #[test]
    fn missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScheduleStore::new(dir.path().join("absent.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = ScheduleStore::new(&path);
        assert!(matches!(store.load(), Err(ScheduleStoreError::Json(_))));
    }

    #[test]
    fn upsert_new_medicine_appends() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir);

        let outcome = store
            .upsert_schedule("a@x.com", "Alice", "Paracetamol", "500mg", &times(&["08:00", "20:00"]))
            .unwrap();

        assert_eq!(outcome, ScheduleUpsert::Inserted);
        let alice = store.family_member("a@x.com", "Alice").unwrap().unwrap();
        assert_eq!(
            alice.schedules,
            vec![ScheduleEntry::new("Paracetamol", "500mg", &times(&["08:00", "20:00"]))]
        );
    }

    #[test]
    fn repeated_upsert_replaces_without_duplicating() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir);
        store
            .upsert_schedule("a@x.com", "Alice", "Ibuprofen", "200mg", &times(&["09:00"]))
            .unwrap();
        store
            .upsert_schedule("a@x.com", "Alice", "Paracetamol", "500mg", &times(&["08:00"]))
            .unwrap();

        for round in 0..3 {
            let dosage = format!("{}mg", 600 + round);
            let outcome = store
                .upsert_schedule("a@x.com", "Alice", "Paracetamol", &dosage, &times(&["21:00"]))
                .unwrap();
            assert_eq!(outcome, ScheduleUpsert::Updated);
        }

        let alice = store.family_member("a@x.com", "Alice").unwrap().unwrap();
        assert_eq!(alice.schedules.len(), 2);
        // replaced in place, order preserved
        assert_eq!(alice.schedules[0].medicine, "Ibuprofen");
        assert_eq!(alice.schedules[1].dosage, "602mg");
        assert_eq!(alice.schedules[1].times, times(&["21:00"]));
    }

    #[test]
    fn upsert_for_missing_member_is_silent_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir);
        let before = store.load().unwrap();

        let unknown_member = store
            .upsert_schedule("a@x.com", "Zed", "Paracetamol", "500mg", &[])
            .unwrap();
        let unknown_user = store
            .upsert_schedule("nobody@x.com", "Alice", "Paracetamol", "500mg", &[])
            .unwrap();

        assert_eq!(unknown_member, ScheduleUpsert::MissingTarget);
        assert_eq!(unknown_user, ScheduleUpsert::MissingTarget);
        assert_eq!(store.load().unwrap(), before);
    }

    #[test]
    fn noop_on_empty_store_does_not_create_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule.json");
        let store = ScheduleStore::new(&path);
        store
            .upsert_schedule("a@x.com", "Alice", "Paracetamol", "500mg", &[])
            .unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn add_user_twice_keeps_members() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir);
        assert!(!store.add_user("a@x.com").unwrap());
        assert!(store.family_member("a@x.com", "Alice").unwrap().is_some());
    }

    #[test]
    fn add_family_member_to_unknown_user_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScheduleStore::new(dir.path().join("schedule.json"));
        assert!(!store
            .add_family_member("nobody@x.com", "Alice", "1990-01-01", meals())
            .unwrap());
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn remove_user_cascades() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir);
        store
            .upsert_schedule("a@x.com", "Alice", "Paracetamol", "500mg", &[])
            .unwrap();

        assert!(store.remove_user("a@x.com").unwrap());
        assert!(store.family_member("a@x.com", "Alice").unwrap().is_none());
        assert!(!store.remove_user("a@x.com").unwrap());
    }

    #[test]
    fn remove_family_member_keeps_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir);
        store
            .add_family_member("a@x.com", "Bob", "1960-05-05", meals())
            .unwrap();

        assert!(store.remove_family_member("a@x.com", "Alice").unwrap());
        assert!(store.family_member("a@x.com", "Alice").unwrap().is_none());
        assert!(store.family_member("a@x.com", "Bob").unwrap().is_some());
    }

    #[test]
    fn meal_times_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir);
        assert_eq!(store.meal_times("a@x.com", "Alice").unwrap(), Some(meals()));
        assert_eq!(store.meal_times("a@x.com", "Zed").unwrap(), None);
    }

    #[test]
    fn saved_file_uses_documented_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir);
        store
            .upsert_schedule("a@x.com", "Alice", "Paracetamol", "500mg", &times(&["08:00"]))
            .unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let entry = &value["a@x.com"]["family_members"]["Alice"]["schedules"][0];
        assert_eq!(entry["medicine"], "Paracetamol");
        assert_eq!(entry["dosage"], "500mg");
        assert_eq!(entry["times"][0], "08:00");
    }

    #[test]
    fn concurrent_upserts_lose_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(seeded_store(&dir));

        let handles: Vec<_> = (0..6)
            .map(|worker| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..5 {
                        let medicine = format!("Med-{worker}-{i}");
                        store
                            .upsert_schedule("a@x.com", "Alice", &medicine, "1 tab", &[])
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let alice = store.family_member("a@x.com", "Alice").unwrap().unwrap();
        assert_eq!(alice.schedules.len(), 30);
    }

    #[test]
    fn upsert_keeps_fields_written_by_other_tools() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule.json");
        std::fs::write(
            &path,
            r#"{"a@x.com":{"plan":"family","family_members":{"Alice":{
                "dob":"1990-01-01",
                "meal_times":{"breakfast":"08:00","lunch":"13:00","dinner":"20:00"},
                "allergies":["penicillin"],
                "schedules":[]}}}}"#,
        )
        .unwrap();
        let store = ScheduleStore::new(&path);

        store
            .upsert_schedule("a@x.com", "Alice", "Paracetamol", "500mg", &times(&["08:00"]))
            .unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["a@x.com"]["plan"], "family");
        let alice = &value["a@x.com"]["family_members"]["Alice"];
        assert_eq!(alice["allergies"][0], "penicillin");
        assert_eq!(alice["schedules"][0]["medicine"], "Paracetamol");
    }

    #[test]
    fn sparse_record_of_another_user_does_not_block_upserts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule.json");
        std::fs::write(
            &path,
            r#"{
                "a@x.com":{"family_members":{"Alice":{"dob":"1990-01-01",
                    "meal_times":{"breakfast":"08:00","lunch":"13:00","dinner":"20:00"},
                    "schedules":[]}}},
                "b@x.com":{"family_members":{"Bob":{"schedules":[]}}}
            }"#,
        )
        .unwrap();
        let store = ScheduleStore::new(&path);

        let outcome = store
            .upsert_schedule("a@x.com", "Alice", "Paracetamol", "500mg", &times(&["08:00"]))
            .unwrap();

        assert_eq!(outcome, ScheduleUpsert::Inserted);
        assert_eq!(store.meal_times("b@x.com", "Bob").unwrap(), None);
        let bob = store.family_member("b@x.com", "Bob").unwrap().unwrap();
        assert!(bob.dob.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn save_keeps_existing_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir);
        let mode = |path: &Path| std::fs::metadata(path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(store.path()), 0o644);

        std::fs::set_permissions(store.path(), std::fs::Permissions::from_mode(0o640)).unwrap();
        store
            .upsert_schedule("a@x.com", "Alice", "Paracetamol", "500mg", &[])
            .unwrap();

        assert_eq!(mode(store.path()), 0o640);
    }
}
