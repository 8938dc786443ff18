use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Whole contents of the schedule file, keyed by user key (an email address).
pub type ScheduleData = BTreeMap<String, UserRecord>;

/// One account and the family members it manages.
///
/// The file is shared with other writers, so fields this crate does not know
/// about are carried in `extra` and written back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Keyed by family-member name, unique within the user.
    #[serde(default)]
    pub family_members: BTreeMap<String, FamilyMember>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyMember {
    #[serde(default)]
    pub dob: String,
    /// Absent in records written without meal times; lookups treat that as
    /// unknown rather than failing the whole file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meal_times: Option<MealTimes>,
    #[serde(default)]
    pub schedules: Vec<ScheduleEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FamilyMember {
    pub fn new(dob: &str, meal_times: MealTimes) -> Self {
        Self {
            dob: dob.to_string(),
            meal_times: Some(meal_times),
            schedules: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Exact, case-sensitive lookup by medicine name.
    pub fn schedule_for(&self, medicine: &str) -> Option<&ScheduleEntry> {
        self.schedules.iter().find(|s| s.medicine == medicine)
    }
}

/// Usual meal times, used to resolve "after breakfast" style instructions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealTimes {
    pub breakfast: String,
    pub lunch: String,
    pub dinner: String,
}

impl MealTimes {
    pub fn new(breakfast: &str, lunch: &str, dinner: &str) -> Self {
        Self {
            breakfast: breakfast.to_string(),
            lunch: lunch.to_string(),
            dinner: dinner.to_string(),
        }
    }

    /// Single-line rendering embedded in the structuring prompt.
    pub fn describe(&self) -> String {
        format!(
            "Breakfast: {}, Lunch: {}, Dinner: {}",
            self.breakfast, self.lunch, self.dinner
        )
    }
}

/// One medicine on a family member's schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub medicine: String,
    pub dosage: String,
    #[serde(default)]
    pub times: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ScheduleEntry {
    pub fn new(medicine: &str, dosage: &str, times: &[String]) -> Self {
        Self {
            medicine: medicine.to_string(),
            dosage: dosage.to_string(),
            times: times.to_vec(),
            extra: Map::new(),
        }
    }
}
