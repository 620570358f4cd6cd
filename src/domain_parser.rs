//! Record-level parsing of a message within one classifier domain.
//!
//! Where the [`crate::agent`] workflow produces a single vault-shaped object,
//! the [`DomainParser`] asks the reasoning engine for every record the
//! message holds, each tagged with the schema it follows:
//!
//! ```json
//! {"results": [{"ExtractedAppointment": {"date": "2024-06-03", "provider": "Dr. Patel"}}]}
//! ```
//!
//! The conversation is owned by the caller, so several messages can be
//! parsed in one session and the engine sees the earlier turns.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::classifier::Domain;
use crate::config::WorkflowConfig;
use crate::email::EmailInput;
use crate::extract::extract_json;
use crate::providers::{self, Conversation, LlmProvider, ProviderError, StopReason};
use crate::vault::{
    ExtractedAppointment, ExtractedBill, ExtractedDoctor, ExtractedInsurance,
    ExtractedMedicalHistoryEntry, ExtractedMedication, HealthcareVaultSchema,
};

const DOMAIN_SYSTEM_PROMPT: &str = "\
You read email and pull out every record it contains.
The assistant turn before each message lists the record schemas you may use.
Reply with a JSON object and nothing else, shaped as
{\"results\": [{\"<SchemaName>\": {<fields>}}]}
with one entry per record. Include only fields the message supports and
every field marked required. If the message holds no records, reply
{\"results\": []}.";

/// One parsed record, tagged on the wire by its schema name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DomainRecord {
    /// A scheduled appointment.
    #[serde(rename = "ExtractedAppointment")]
    Appointment(ExtractedAppointment),
    /// A doctor.
    #[serde(rename = "ExtractedDoctor")]
    Doctor(ExtractedDoctor),
    /// A health insurance plan.
    #[serde(rename = "ExtractedInsurance")]
    Insurance(ExtractedInsurance),
    /// A medication or treatment.
    #[serde(rename = "ExtractedMedication")]
    Medication(ExtractedMedication),
    /// A medical history entry.
    #[serde(rename = "ExtractedMedicalHistoryEntry")]
    MedicalHistory(ExtractedMedicalHistoryEntry),
    /// A bill or invoice.
    #[serde(rename = "ExtractedBill")]
    Bill(ExtractedBill),
    /// A whole healthcare vault record.
    #[serde(rename = "HealthcareVaultSchema")]
    Healthcare(Box<HealthcareVaultSchema>),
}

impl DomainRecord {
    /// The schema name this record is tagged with.
    pub fn schema_name(&self) -> &'static str {
        match self {
            Self::Appointment(_) => "ExtractedAppointment",
            Self::Doctor(_) => "ExtractedDoctor",
            Self::Insurance(_) => "ExtractedInsurance",
            Self::Medication(_) => "ExtractedMedication",
            Self::MedicalHistory(_) => "ExtractedMedicalHistoryEntry",
            Self::Bill(_) => "ExtractedBill",
            Self::Healthcare(_) => "HealthcareVaultSchema",
        }
    }
}

/// Domain parsing errors.
#[derive(Debug, thiserror::Error)]
pub enum DomainParseError {
    /// The reasoning engine failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// The reply held no JSON object.
    #[error("invalid JSON response: {0}")]
    InvalidJson(String),
    /// The reply object has no `results` key.
    #[error("JSON response does not contain a 'results' key")]
    MissingResults,
    /// `results` is present but not a list.
    #[error("'results' must be a list")]
    ResultsNotList,
    /// An entry does not convert into a known record.
    #[error("result {index} does not match a known schema: {source}")]
    Record {
        /// Position in `results`.
        index: usize,
        /// Conversion failure.
        source: serde_json::Error,
    },
}

/// Parse a reply into typed records.
///
/// The reply should be a bare JSON object; an object embedded in prose is
/// accepted too. Every entry of `results` must be a single-key object
/// naming a known schema. One bad entry fails the whole reply.
///
/// # Errors
///
/// See [`DomainParseError`]; provider faults never come from here.
pub fn parse_results(text: &str) -> Result<Vec<DomainRecord>, DomainParseError> {
    let mut object = match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(map)) => map,
        Ok(_) => return Err(DomainParseError::MissingResults),
        Err(e) => extract_json(text).ok_or_else(|| DomainParseError::InvalidJson(e.to_string()))?,
    };

    let entries = match object.remove("results") {
        Some(Value::Array(entries)) => entries,
        Some(_) => return Err(DomainParseError::ResultsNotList),
        None => return Err(DomainParseError::MissingResults),
    };

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            serde_json::from_value(entry).map_err(|source| DomainParseError::Record { index, source })
        })
        .collect()
}

const APPOINTMENT_SCHEMA: &str = "\
ExtractedAppointment:
  date: ISO date string (required)
  time: time of day
  provider: provider or organizer name (required)
  location: location or address
  appointment_type: kind of appointment
  duration: minutes, integer
  notes: free-form notes";

const BILL_SCHEMA: &str = "\
ExtractedBill:
  amount: number (required)
  currency: ISO currency code, default USD
  due_date: ISO date string (required)
  vendor: who issued the bill (required)
  account_number: customer account number
  invoice_number: invoice number";

const MEDICAL_SCHEMAS: &str = "\
ExtractedDoctor:
  doctor_name: full name (required)
  type: specialty or category
  location: practice location
  date: last visit or record date
ExtractedInsurance:
  type_of_health_insurance: PPO, HMO, EPO... (required)
  coverage_type: Individual, Family, Dental, Vision... (required)
  last_updated: date
ExtractedMedication:
  name_of_medicine: medication name (required)
  treatment_name: associated treatment
  purpose: reason for the medication
  duration: how long it is taken
  date: start or prescription date
ExtractedMedicalHistoryEntry:
  date: date of the event (required)
  disease: condition or disease (required)
  description: additional details";

/// The record schemas offered to the engine for `domain`.
pub fn domain_schema_prompt(domain: Domain) -> String {
    let mut prompt = format!("Record schemas for the {domain} domain.\n\n{APPOINTMENT_SCHEMA}\n{BILL_SCHEMA}");
    if domain == Domain::Medical {
        prompt.push('\n');
        prompt.push_str(MEDICAL_SCHEMAS);
    }
    prompt
}

/// Parses messages into domain records over a caller-owned conversation.
pub struct DomainParser {
    provider: Arc<dyn LlmProvider>,
    max_tokens: Option<u32>,
    timeout: Option<Duration>,
}

impl fmt::Debug for DomainParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainParser")
            .field("model", &self.provider.model_id())
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl DomainParser {
    /// Create a parser with no token limit or deadline.
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            max_tokens: None,
            timeout: None,
        }
    }

    /// Create a parser that shares the workflow's limits.
    pub fn with_config(provider: Arc<dyn LlmProvider>, config: &WorkflowConfig) -> Self {
        Self {
            provider,
            max_tokens: config.max_tokens,
            timeout: config.request_timeout(),
        }
    }

    /// A fresh conversation primed with the parsing instructions.
    pub fn conversation() -> Conversation {
        Conversation::new(Some(DOMAIN_SYSTEM_PROMPT.to_owned()))
    }

    /// Parse one message against `domain`'s record schemas.
    ///
    /// Appends the schema list (assistant turn), the message text (user
    /// turn) and, on success, the engine's reply to `conversation`.
    ///
    /// # Errors
    ///
    /// [`DomainParseError::Provider`] when the engine call fails, in which
    /// case the schema and message turns stay in the conversation; the
    /// other variants when the reply is malformed.
    pub async fn parse_email(
        &self,
        conversation: &mut Conversation,
        email: &EmailInput,
        domain: Domain,
    ) -> Result<Vec<DomainRecord>, DomainParseError> {
        conversation.push_assistant(domain_schema_prompt(domain));
        conversation.push_user(email.to_text());

        let response =
            providers::send(self.provider.as_ref(), conversation, self.max_tokens, self.timeout)
                .await?;
        debug!(
            %domain,
            model = %response.model,
            output_tokens = response.usage.output_tokens,
            "domain parse response received"
        );
        if response.stop_reason == StopReason::MaxTokens {
            warn!(%domain, "domain parse reply cut off at the token limit");
        }

        let records = parse_results(&response.text)?;
        info!(%domain, records = records.len(), "message parsed");
        Ok(records)
    }
}
