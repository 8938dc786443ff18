//! Repository layer: entity-scoped database operations.
//!
//! Free functions take a borrowed `Connection`; the traits below are the
//! seams the pipeline depends on so tests can substitute in-memory doubles.

mod medicine;
mod member;

pub use medicine::*;
pub use member::*;

use super::DatabaseError;

/// Resolves an opaque member id to the name the schedule file uses.
pub trait MemberDirectory: Send + Sync {
    fn find_name(&self, member_id: &str) -> Result<String, DatabaseError>;
}

/// Per-(member, medicine) schedule documents with atomic upsert.
pub trait MedicineLedger: Send + Sync {
    fn upsert(
        &self,
        member_id: &str,
        medicine_name: &str,
        dosage: &str,
        times: &[String],
    ) -> Result<LedgerUpsert, DatabaseError>;
}

/// What an upsert did to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerUpsert {
    Inserted,
    Updated,
}
