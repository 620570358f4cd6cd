//! Healthcare vault records and the textual schemas used in prompts.

use std::borrow::Cow;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::VaultType;

/// `null` is accepted wherever a list or record is optional.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A medical appointment. `date` and `provider` are required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedAppointment {
    /// ISO date string.
    pub date: String,
    /// Time of day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    /// Provider name.
    pub provider: String,
    /// Location or address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Kind of appointment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointment_type: Option<String>,
    /// Duration in minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    /// Free-form notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Fields outside the record's schema.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A doctor record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedDoctor {
    /// Full name of the doctor.
    pub doctor_name: String,
    /// Specialty or category.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Practice location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Record date, last visit, or appointment date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// Serial number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Fields outside the record's schema.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A health insurance record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedInsurance {
    /// Plan type (PPO, HMO, EPO).
    pub type_of_health_insurance: String,
    /// Scope (Individual, Family, Dental, Vision).
    pub coverage_type: String,
    /// When the record was last updated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    /// Serial number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Fields outside the record's schema.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A medication or treatment record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedMedication {
    /// Name of the medication.
    pub name_of_medicine: String,
    /// Associated treatment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub treatment_name: Option<String>,
    /// Reason for the medication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    /// How long it is taken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    /// Start or prescription date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// Serial number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Fields outside the record's schema.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A medical history or emergency alert entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedMedicalHistoryEntry {
    /// Date of the event.
    pub date: String,
    /// Condition or disease.
    pub disease: String,
    /// Additional details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Serial number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Fields outside the record's schema.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A bill or invoice. `amount`, `due_date` and `vendor` are required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedBill {
    /// Amount due.
    pub amount: f64,
    /// ISO currency code.
    #[serde(default = "default_currency")]
    pub currency: String,
    /// ISO date string.
    pub due_date: String,
    /// Who issued the bill.
    pub vendor: String,
    /// Customer account number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
    /// Invoice number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
    /// Fields outside the record's schema.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_currency() -> String {
    "USD".to_owned()
}

/// Healthcare vault record.
///
/// Every section is optional; typed sections enforce their own required
/// fields. Keys outside the schema are kept in `extra`, at every level.
/// Absent and empty sections are omitted when serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthcareVaultSchema {
    /// Appointments and scheduled visits.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub appointments: Vec<ExtractedAppointment>,
    /// Lab and diagnostic results.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub test_results: Vec<Map<String, Value>>,
    /// Prescriptions and pharmacy information.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub prescriptions: Vec<Map<String, Value>>,
    /// Providers and facilities.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub providers: Vec<Map<String, Value>>,
    /// Insurance claim or coverage details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insurance: Option<Map<String, Value>>,
    /// Referenced medical records.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub medical_records: Vec<Map<String, Value>>,
    /// Medical bills.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub bills: Vec<Map<String, Value>>,
    /// Conditions or diagnoses mentioned.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<String>,
    /// Additional notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Doctor records.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub doctors: Vec<ExtractedDoctor>,
    /// Insurance records.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub insurance_records: Vec<ExtractedInsurance>,
    /// Medications and treatments.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub medications: Vec<ExtractedMedication>,
    /// Medical history and emergency alerts.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub medical_history: Vec<ExtractedMedicalHistoryEntry>,
    /// Fields outside the schema.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HealthcareVaultSchema {
    /// Strictly validate an extracted object against the schema.
    ///
    /// # Errors
    ///
    /// Returns the deserialization error describing the first schema fault.
    pub fn validate(data: &Map<String, Value>) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(data.clone()))
    }

    /// Whether the record holds no information at all.
    pub fn is_empty(&self) -> bool {
        self.appointments.is_empty()
            && self.test_results.is_empty()
            && self.prescriptions.is_empty()
            && self.providers.is_empty()
            && self.insurance.is_none()
            && self.medical_records.is_empty()
            && self.bills.is_empty()
            && self.conditions.is_empty()
            && self.notes.is_none()
            && self.doctors.is_empty()
            && self.insurance_records.is_empty()
            && self.medications.is_empty()
            && self.medical_history.is_empty()
            && self.extra.is_empty()
    }
}

const HEALTHCARE_SCHEMA: &str = r#"The healthcare vault schema expects a JSON object with the following structure:

{
  "appointments": [
    {
      "date": "ISO date string (required)",
      "time": "Time string (optional)",
      "provider": "Provider name (required)",
      "location": "Location/address (optional)",
      "appointment_type": "Type of appointment (optional)",
      "duration": "Duration in minutes (optional)",
      "notes": "Additional notes (optional)"
    }
  ],
  "test_results": [
    {
      "test_name": "Name of test",
      "date": "Date of test",
      "results": "Test results or summary",
      "provider": "Provider who ordered test"
    }
  ],
  "prescriptions": [
    {
      "medication": "Medication name",
      "dosage": "Dosage information",
      "prescribing_provider": "Provider name",
      "pharmacy": "Pharmacy information",
      "refill_date": "Refill date if applicable"
    }
  ],
  "providers": [
    {
      "name": "Provider name",
      "specialty": "Medical specialty",
      "contact": "Contact information",
      "facility": "Medical facility or practice"
    }
  ],
  "insurance": {
    "provider": "Insurance company name",
    "policy_number": "Policy number",
    "claim_number": "Claim number if applicable",
    "status": "Claim or coverage status"
  },
  "medical_records": [
    {
      "type": "Type of record",
      "date": "Date of record",
      "provider": "Provider or facility",
      "summary": "Brief summary"
    }
  ],
  "bills": [
    {
      "amount": "Bill amount",
      "due_date": "Due date",
      "provider": "Billing provider",
      "service": "Service description",
      "account_number": "Account number"
    }
  ],
  "doctors": [
    {
      "doctor_name": "Full name (required)",
      "type": "Specialty (optional)",
      "location": "Practice location (optional)",
      "date": "Last visit or record date (optional)"
    }
  ],
  "insurance_records": [
    {
      "type_of_health_insurance": "PPO, HMO, EPO... (required)",
      "coverage_type": "Individual, Family, Dental, Vision... (required)",
      "last_updated": "Date (optional)"
    }
  ],
  "medications": [
    {
      "name_of_medicine": "Medication name (required)",
      "treatment_name": "Treatment (optional)",
      "purpose": "Reason (optional)",
      "duration": "How long (optional)",
      "date": "Start date (optional)"
    }
  ],
  "medical_history": [
    {
      "date": "Date (required)",
      "disease": "Condition (required)",
      "description": "Details (optional)"
    }
  ],
  "conditions": ["List of health conditions or diagnoses mentioned"],
  "notes": "Any additional healthcare-related notes"
}

All fields are optional except where marked as required. Extract only the information that is present in the email."#;

/// Textual schema for a vault type, embedded verbatim in prompts.
pub fn schema_description(vault_type: VaultType) -> Cow<'static, str> {
    match vault_type {
        VaultType::Healthcare => Cow::Borrowed(HEALTHCARE_SCHEMA),
        other => Cow::Owned(format!(
            "Extract structured data for the {other} vault. Return a JSON object with \
             relevant fields based on the email content."
        )),
    }
}
