//! Applies parsed prescription output to both schedule stores.
//!
//! Steps, in order: decode the model output, require a non-empty medicine
//! list, resolve the member's name once, then validate and write each entry.
//! Nothing is written before the member resolves. Each accepted entry goes to
//! the schedule file (addressed by user key and member name) and to the
//! medicine ledger (addressed by member id). The two writes are independent:
//! one failing does not skip or undo the other.

use serde::Serialize;

use crate::db::{DatabaseError, MedicineLedger, MemberDirectory};
use crate::pipeline::processor::ProcessingError;
use crate::pipeline::structuring::parser::{parse_prescription, ParsedMedicine, ParsedPrescription};
use crate::pipeline::structuring::validation::{validate_medicine, EntryRejection};
use crate::schedule_store::ScheduleStore;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Outcome of a reconciliation where every accepted entry was stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    /// Names of the medicines written to both stores.
    pub accepted: Vec<String>,
    pub rejected: Vec<RejectedEntry>,
}

/// An entry skipped by validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedEntry {
    /// Position in the model's `medicines` list.
    pub index: usize,
    pub name: Option<String>,
    pub reason: String,
}

/// Which store a write went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StoreKind {
    ScheduleFile,
    MedicineLedger,
}

/// A write that failed for an accepted entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreFailure {
    pub medicine: String,
    pub store: StoreKind,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

pub struct Reconciler<'a> {
    schedule: &'a ScheduleStore,
    directory: &'a dyn MemberDirectory,
    ledger: &'a dyn MedicineLedger,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        schedule: &'a ScheduleStore,
        directory: &'a dyn MemberDirectory,
        ledger: &'a dyn MedicineLedger,
    ) -> Self {
        Self {
            schedule,
            directory,
            ledger,
        }
    }

    /// Decode `raw_output` and store its medicines for `member_id`.
    ///
    /// Fails with `Format` for non-JSON, `Validation` for a missing or empty
    /// medicine list and `NotFound` for an unknown member; none of these
    /// write anything. Invalid entries are skipped and reported.
    pub fn reconcile(
        &self,
        raw_output: &str,
        user_key: &str,
        member_id: &str,
    ) -> Result<ReconcileReport, ProcessingError> {
        let parsed = parse_prescription(raw_output)?;
        let member_name = resolve_member_name(self.directory, member_id)?;
        self.apply(&parsed, user_key, member_id, &member_name)
    }

    /// Store already-decoded medicines for a resolved member.
    pub fn apply(
        &self,
        parsed: &ParsedPrescription,
        user_key: &str,
        member_id: &str,
        member_name: &str,
    ) -> Result<ReconcileReport, ProcessingError> {
        let _span = tracing::info_span!(
            "reconcile",
            user = user_key,
            member_id,
            member = member_name,
            entries = parsed.medicines.len(),
        )
        .entered();

        if parsed.duration.is_some() || parsed.advice.is_some() || parsed.follow_up.is_some() {
            tracing::debug!(
                duration = ?parsed.duration,
                advice = ?parsed.advice,
                follow_up = ?parsed.follow_up,
                "Prescription extras are not stored"
            );
        }

        let mut report = ReconcileReport::default();
        let mut failures = Vec::new();

        for (index, candidate) in parsed.medicines.iter().enumerate() {
            let verdict = match candidate {
                Ok(medicine) => validate_medicine(medicine).map(|()| medicine),
                Err(rejection) => Err(rejection.clone()),
            };

            match verdict {
                Ok(medicine) => {
                    failures.extend(self.store_entry(medicine, user_key, member_id, member_name));
                    report.accepted.push(medicine.name.clone());
                }
                Err(reason) => {
                    let name = candidate
                        .as_ref()
                        .ok()
                        .map(|m| m.name.clone())
                        .filter(|n| !n.is_empty());
                    tracing::warn!(
                        index,
                        medicine = name.as_deref().unwrap_or("<unnamed>"),
                        reason = %reason,
                        "Invalid medicine entry, skipping"
                    );
                    report.rejected.push(rejected_entry(index, name, &reason));
                }
            }
        }

        tracing::info!(
            accepted = report.accepted.len(),
            rejected = report.rejected.len(),
            failed_writes = failures.len(),
            "Reconciliation finished"
        );

        if failures.is_empty() {
            Ok(report)
        } else {
            Err(ProcessingError::Persistence(failures))
        }
    }

    /// Write one accepted entry to both stores; returns the failed writes.
    fn store_entry(
        &self,
        medicine: &ParsedMedicine,
        user_key: &str,
        member_id: &str,
        member_name: &str,
    ) -> Vec<StoreFailure> {
        let mut failures = Vec::new();

        if let Err(e) = self.schedule.upsert_schedule(
            user_key,
            member_name,
            &medicine.name,
            &medicine.dosage,
            &medicine.times,
        ) {
            tracing::error!(medicine = %medicine.name, error = %e, "Schedule file write failed");
            failures.push(StoreFailure {
                medicine: medicine.name.clone(),
                store: StoreKind::ScheduleFile,
                message: e.to_string(),
            });
        }

        match self
            .ledger
            .upsert(member_id, &medicine.name, &medicine.dosage, &medicine.times)
        {
            Ok(outcome) => tracing::debug!(medicine = %medicine.name, ?outcome, "Ledger upserted"),
            Err(e) => {
                tracing::error!(medicine = %medicine.name, error = %e, "Ledger write failed");
                failures.push(StoreFailure {
                    medicine: medicine.name.clone(),
                    store: StoreKind::MedicineLedger,
                    message: e.to_string(),
                });
            }
        }

        failures
    }
}

/// Translate a member id into the name the schedule file is keyed by.
pub fn resolve_member_name(
    directory: &dyn MemberDirectory,
    member_id: &str,
) -> Result<String, ProcessingError> {
    directory.find_name(member_id).map_err(|e| match e {
        DatabaseError::NotFound { .. } => {
            ProcessingError::NotFound(format!("Family member {member_id} does not exist"))
        }
        other => ProcessingError::Database(other),
    })
}

fn rejected_entry(index: usize, name: Option<String>, reason: &EntryRejection) -> RejectedEntry {
    RejectedEntry {
        index,
        name,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{LedgerUpsert, SqliteDocumentStore};
    use crate::models::MealTimes;
    use crate::pipeline::processor::ErrorKind;

    const USER: &str = "a@x.com";

    struct Fixture {
        _dir: tempfile::TempDir,
        schedule: ScheduleStore,
        docs: SqliteDocumentStore,
        alice_id: String,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let schedule = ScheduleStore::new(dir.path().join("schedule.json"));
            schedule.add_user(USER).unwrap();
            schedule
                .add_family_member(USER, "Alice", "1990-04-12", MealTimes::new("08:00", "13:00", "20:00"))
                .unwrap();

            let docs = SqliteDocumentStore::open_in_memory().unwrap();
            let alice_id = docs.insert_member(USER, "Alice", Some("1990-04-12")).unwrap().id;

            Self {
                _dir: dir,
                schedule,
                docs,
                alice_id,
            }
        }

        fn reconciler(&self) -> Reconciler<'_> {
            Reconciler::new(&self.schedule, &self.docs, &self.docs)
        }

        fn schedule_entries(&self) -> usize {
            self.schedule
                .family_member(USER, "Alice")
                .unwrap()
                .map(|m| m.schedules.len())
                .unwrap_or(0)
        }

        fn ledger_entries(&self) -> usize {
            self.docs.medicines_for_member(&self.alice_id).unwrap().len()
        }
    }

    struct BrokenLedger;

    impl MedicineLedger for BrokenLedger {
        fn upsert(
            &self,
            _member_id: &str,
            _medicine_name: &str,
            _dosage: &str,
            _times: &[String],
        ) -> Result<LedgerUpsert, DatabaseError> {
            Err(DatabaseError::LockPoisoned)
        }
    }

    #[test]
    fn end_to_end_paracetamol_for_alice() {
        let fx = Fixture::new();
        let raw = r#"{"medicines":[{"name":"Paracetamol","dosage":"500mg","times":["08:00","20:00"]}],"duration":"5 days","advice":"","follow_up":""}"#;

        let report = fx.reconciler().reconcile(raw, USER, &fx.alice_id).unwrap();
        assert_eq!(report.accepted, vec!["Paracetamol"]);
        assert!(report.rejected.is_empty());

        let alice = fx.schedule.family_member(USER, "Alice").unwrap().unwrap();
        let entry = alice.schedule_for("Paracetamol").unwrap();
        assert_eq!(entry.dosage, "500mg");
        assert_eq!(entry.times, vec!["08:00", "20:00"]);

        let ledger = fx.docs.medicines_for_member(&fx.alice_id).unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].name, "Paracetamol");
        assert_eq!(ledger[0].dosage, "500mg");
        assert_eq!(ledger[0].times, vec!["08:00", "20:00"]);
        assert_eq!(ledger[0].family_member_id, fx.alice_id);
    }

    #[test]
    fn empty_medicines_fails_without_writes() {
        let fx = Fixture::new();
        let before = std::fs::read_to_string(fx.schedule.path()).unwrap();

        let err = fx
            .reconciler()
            .reconcile(r#"{"medicines":[],"duration":"5 days"}"#, USER, &fx.alice_id)
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(std::fs::read_to_string(fx.schedule.path()).unwrap(), before);
        assert_eq!(fx.ledger_entries(), 0);
    }

    #[test]
    fn non_json_fails_without_writes() {
        let fx = Fixture::new();
        let err = fx
            .reconciler()
            .reconcile("Paracetamol 500mg twice daily", USER, &fx.alice_id)
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Format);
        assert_eq!(fx.schedule_entries(), 0);
        assert_eq!(fx.ledger_entries(), 0);
    }

    #[test]
    fn invalid_entry_is_skipped_valid_one_stored() {
        let fx = Fixture::new();
        let raw = r#"{"medicines":[
            {"name":"Amoxicillin","dosage":"250mg","times":["08:00","14:00","20:00"]},
            {"name":"Cetirizine","dosage":"10mg","times":["9:30"]}
        ]}"#;

        let report = fx.reconciler().reconcile(raw, USER, &fx.alice_id).unwrap();

        assert_eq!(report.accepted, vec!["Amoxicillin"]);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].index, 1);
        assert_eq!(report.rejected[0].name.as_deref(), Some("Cetirizine"));
        assert!(report.rejected[0].reason.contains("9:30"));
        assert_eq!(fx.schedule_entries(), 1);
        assert_eq!(fx.ledger_entries(), 1);
    }

    #[test]
    fn unknown_member_fails_before_any_write() {
        let fx = Fixture::new();
        let raw = r#"{"medicines":[{"name":"Paracetamol","dosage":"500mg","times":["08:00"]}]}"#;

        let err = fx
            .reconciler()
            .reconcile(raw, USER, "00000000-0000-0000-0000-000000000000")
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(fx.schedule_entries(), 0);
        assert_eq!(fx.ledger_entries(), 0);
    }

    #[test]
    fn repeated_reconcile_updates_in_place() {
        let fx = Fixture::new();
        let first = r#"{"medicines":[{"name":"Metformin","dosage":"500mg","times":["08:00"]}]}"#;
        let second = r#"{"medicines":[{"name":"Metformin","dosage":"850mg","times":["08:00","20:00"]}]}"#;

        fx.reconciler().reconcile(first, USER, &fx.alice_id).unwrap();
        fx.reconciler().reconcile(second, USER, &fx.alice_id).unwrap();

        assert_eq!(fx.schedule_entries(), 1);
        let ledger = fx.docs.medicines_for_member(&fx.alice_id).unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].dosage, "850mg");
        let alice = fx.schedule.family_member(USER, "Alice").unwrap().unwrap();
        assert_eq!(alice.schedules[0].times, vec!["08:00", "20:00"]);
    }

    #[test]
    fn ledger_failure_still_writes_schedule_file() {
        let fx = Fixture::new();
        let reconciler = Reconciler::new(&fx.schedule, &fx.docs, &BrokenLedger);
        let raw = r#"{"medicines":[
            {"name":"Paracetamol","dosage":"500mg","times":["08:00"]},
            {"name":"Pantoprazole","dosage":"40mg","times":["07:30"]}
        ]}"#;

        let err = reconciler.reconcile(raw, USER, &fx.alice_id).unwrap_err();

        match &err {
            ProcessingError::Persistence(failures) => {
                assert_eq!(failures.len(), 2);
                assert!(failures.iter().all(|f| f.store == StoreKind::MedicineLedger));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert_eq!(fx.schedule_entries(), 2);
    }

    #[test]
    fn schedule_failure_still_writes_ledger() {
        let fx = Fixture::new();
        let dir = tempfile::tempdir().unwrap();
        // Reading a directory as the schedule file fails every load.
        let unreadable = ScheduleStore::new(dir.path());
        let reconciler = Reconciler::new(&unreadable, &fx.docs, &fx.docs);
        let raw = r#"{"medicines":[{"name":"Paracetamol","dosage":"500mg","times":["08:00"]}]}"#;

        let err = reconciler.reconcile(raw, USER, &fx.alice_id).unwrap_err();

        match err {
            ProcessingError::Persistence(failures) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].store, StoreKind::ScheduleFile);
                assert_eq!(failures[0].medicine, "Paracetamol");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fx.ledger_entries(), 1);
    }

    #[test]
    fn malformed_item_is_rejected_not_fatal() {
        let fx = Fixture::new();
        let raw = r#"{"medicines":["take rest",{"name":"ORS","dosage":"1 sachet","times":[]}]}"#;

        let report = fx.reconciler().reconcile(raw, USER, &fx.alice_id).unwrap();
        assert_eq!(report.accepted, vec!["ORS"]);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].name, None);
    }

    #[test]
    fn member_missing_from_schedule_file_only_writes_ledger() {
        let fx = Fixture::new();
        let bob_id = fx.docs.insert_member(USER, "Bob", None).unwrap().id;
        let raw = r#"{"medicines":[{"name":"Ibuprofen","dosage":"200mg","times":["12:00"]}]}"#;

        let report = fx.reconciler().reconcile(raw, USER, &bob_id).unwrap();

        assert_eq!(report.accepted, vec!["Ibuprofen"]);
        assert!(fx.schedule.family_member(USER, "Bob").unwrap().is_none());
        assert_eq!(fx.docs.medicines_for_member(&bob_id).unwrap().len(), 1);
    }
}
