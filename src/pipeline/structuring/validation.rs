//! Gatekeeping for model-produced medicine entries.
//!
//! An entry is persisted only when its name and dosage are present and every
//! time is a zero-padded 24-hour `HH:MM`. One bad time rejects the entry.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use super::parser::ParsedMedicine;

static TIME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[01][0-9]|2[0-3]):[0-5][0-9]$").unwrap());

/// `true` for `00:00` through `23:59`, two digits each.
pub fn is_valid_time(candidate: &str) -> bool {
    TIME_PATTERN.is_match(candidate)
}

/// Why a medicine entry was skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntryRejection {
    #[error("medicine name is empty")]
    EmptyName,

    #[error("dosage is empty")]
    EmptyDosage,

    #[error("invalid time {0:?}, expected HH:MM")]
    InvalidTime(String),

    #[error("malformed entry: {0}")]
    Malformed(String),
}

/// Accept or reject a single entry.
///
/// An empty `times` list passes; there is nothing invalid in it.
pub fn validate_medicine(medicine: &ParsedMedicine) -> Result<(), EntryRejection> {
    if medicine.name.trim().is_empty() {
        return Err(EntryRejection::EmptyName);
    }
    if medicine.dosage.trim().is_empty() {
        return Err(EntryRejection::EmptyDosage);
    }
    if let Some(bad) = medicine.times.iter().find(|t| !is_valid_time(t)) {
        return Err(EntryRejection::InvalidTime(bad.clone()));
    }
    Ok(())
}
