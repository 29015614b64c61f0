use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::Prospect;

/// What came back from one HTTP POST.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryResult {
    pub status_code: u16,
    pub body: String,
    pub elapsed: Duration,
}

impl DeliveryResult {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Only an exact 200 confirms a pending prospect.
    pub fn is_accepted(&self) -> bool {
        self.status_code == 200
    }
}

/// Per-record result of a bulk send. Transport failures carry
/// `status_code == 0` and an error message instead of a body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    pub record_id: String,
    pub status_code: u16,
    pub response_text: String,
    /// Seconds for the last attempt.
    pub response_time: f64,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// One synthetic lead planned by the bulk harness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRecord {
    pub record_id: String,
    pub user_email: String,
    pub user_id: i64,
    pub team_id: i64,
    pub sequence_number: usize,
    pub contact: Prospect,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignedUser {
    pub id: i64,
    #[serde(default)]
    pub email: String,
}

/// A prospect as returned by the validation API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProspectRecord {
    pub id: i64,
    pub business_entity_id: i64,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub assigned_to: Option<i64>,
    pub assigned_user: AssignedUser,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(skip)]
    pub raw: Value,
}

impl ProspectRecord {
    pub fn matches_pattern(&self, pattern: &str) -> bool {
        let pattern = pattern.to_lowercase();
        [&self.first_name, &self.last_name, &self.full_name]
            .iter()
            .any(|name| name.to_lowercase().contains(&pattern))
    }
}

/// Outcome of comparing one record with the user it should belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AssignmentCheck {
    pub user_email_match: bool,
    pub user_id_match: bool,
    pub team_id_match: bool,
    pub assigned_to_match: bool,
}

impl AssignmentCheck {
    pub fn is_correct(&self) -> bool {
        self.user_email_match && self.user_id_match && self.team_id_match && self.assigned_to_match
    }
}
