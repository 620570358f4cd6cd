//! Vault vocabulary and the result shapes handed to persistence.
//!
//! [`VaultType`] is the eight-member destination vocabulary used by the
//! extraction workflow. It is independent of the classifier's
//! [`crate::classifier::Domain`] and there is no conversion between them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod payload;
pub mod schema;

pub use payload::{add_email_to_vault, build_payload};
pub use schema::{
    schema_description, ExtractedAppointment, ExtractedBill, ExtractedDoctor, ExtractedInsurance,
    ExtractedMedicalHistoryEntry, ExtractedMedication, HealthcareVaultSchema,
};

/// Destination vault for a processed message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VaultType {
    /// Identity documents, addresses, personal details.
    PersonalInfo,
    /// Appointments, results, prescriptions, providers.
    Healthcare,
    /// Logins, subscriptions, online services.
    DigitalAccounts,
    /// Master instructions for the account holder's estate.
    KeyMasterDirectives,
    /// Contracts, deeds, court matters.
    Legal,
    /// General correspondence; the fallback vault.
    #[default]
    Communications,
    /// Funeral wishes, final arrangements.
    EndOfLife,
    /// Bills, statements, payments.
    Financial,
}

impl VaultType {
    /// All vault types in declaration order.
    pub const ALL: [VaultType; 8] = [
        VaultType::PersonalInfo,
        VaultType::Healthcare,
        VaultType::DigitalAccounts,
        VaultType::KeyMasterDirectives,
        VaultType::Legal,
        VaultType::Communications,
        VaultType::EndOfLife,
        VaultType::Financial,
    ];

    /// Snake-case wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PersonalInfo => "personal_info",
            Self::Healthcare => "healthcare",
            Self::DigitalAccounts => "digital_accounts",
            Self::KeyMasterDirectives => "key_master_directives",
            Self::Legal => "legal",
            Self::Communications => "communications",
            Self::EndOfLife => "end_of_life",
            Self::Financial => "financial",
        }
    }

    /// Comma-separated vocabulary for prompts.
    pub fn vocabulary() -> String {
        Self::ALL
            .iter()
            .map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for VaultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for strings outside the vault vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown vault type {0:?}")]
pub struct UnknownVaultType(pub String);

impl FromStr for VaultType {
    type Err = UnknownVaultType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        if wanted == "comms" {
            return Ok(Self::Communications);
        }
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == wanted)
            .ok_or_else(|| UnknownVaultType(s.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// Extraction results
// ---------------------------------------------------------------------------

/// Structured data extracted for a vault.
///
/// Healthcare data that passed strict schema validation is carried as the
/// typed record; everything else stays an open key/value map. Serializes as
/// a plain JSON object either way.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExtractedData {
    /// Validated healthcare record.
    Healthcare(Box<HealthcareVaultSchema>),
    /// Untyped data for every other case.
    Generic(Map<String, Value>),
}

impl Default for ExtractedData {
    fn default() -> Self {
        Self::Generic(Map::new())
    }
}

impl ExtractedData {
    /// Whether no data was extracted.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Healthcare(record) => record.is_empty(),
            Self::Generic(map) => map.is_empty(),
        }
    }

    /// The data as a JSON object.
    pub fn to_map(&self) -> Map<String, Value> {
        match self {
            Self::Generic(map) => map.clone(),
            Self::Healthcare(record) => match serde_json::to_value(record) {
                Ok(Value::Object(map)) => map,
                _ => Map::new(),
            },
        }
    }

    /// Look up one top-level field.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self {
            Self::Generic(map) => map.get(key).cloned(),
            Self::Healthcare(_) => self.to_map().remove(key),
        }
    }
}

/// Category of a suggested follow-up action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Add something to a calendar.
    Calendar,
    /// Set a reminder.
    Reminder,
    /// Update a contact record.
    UpdateContact,
    /// Pay a bill.
    Payment,
    /// Anything else.
    General,
}

/// Action priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Needs attention now.
    High,
    /// Normal.
    Medium,
    /// Whenever.
    Low,
}

/// A follow-up action suggested for the message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedAction {
    /// Inferred action category.
    pub action_type: ActionType,
    /// Human-readable description.
    pub description: String,
    /// Action parameters.
    #[serde(default)]
    pub params: Map<String, Value>,
    /// Optional priority.
    pub priority: Option<Priority>,
    /// Optional ISO-8601 due date.
    pub due_date: Option<String>,
}

/// Structured output of the extraction workflow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VaultExtraction {
    /// Destination vault.
    pub vault_type: VaultType,
    /// Heuristic confidence in `[0, 1]`.
    pub confidence: f64,
    /// Schema-shaped extracted data.
    pub extracted_data: ExtractedData,
    /// Follow-up actions.
    pub suggested_actions: Vec<SuggestedAction>,
    /// Free-text reasoning or diagnostics.
    pub reasoning: Option<String>,
    /// Additional vaults the message also belongs to.
    pub multiple_vaults: Option<Vec<VaultType>>,
}

/// Complete workflow response.
///
/// `extraction` is always present, even when `errors` is not empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentResponse {
    /// The extraction (a safe default on failure).
    pub extraction: VaultExtraction,
    /// Wall-clock seconds spent in the workflow.
    pub processing_time: Option<f64>,
    /// Capabilities invoked, in order.
    pub tools_used: Vec<String>,
    /// Faults that aborted the workflow.
    pub errors: Vec<String>,
    /// Degradations that did not abort it.
    pub warnings: Vec<String>,
}

/// Storable payload for one message.
///
/// `vault_type` is whatever label the caller routed the message to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultAddResult {
    /// Caller-supplied vault label.
    pub vault_type: String,
    /// Serialized message.
    pub data: Map<String, Value>,
    /// Empty unless building the payload failed.
    #[serde(default)]
    pub errors: Vec<String>,
    /// Seconds spent building the payload.
    pub processing_time_s: Option<f64>,
}
