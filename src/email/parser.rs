//! Message normalization: loose JSON documents in, [`EmailInput`] out.

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, warn};

use super::{extract_text_content, Attachment, EmailAddress, EmailError, EmailInput, EmailMetadata};

/// Keys that may carry the mailbox in an address object, in lookup order.
const ADDRESS_KEYS: &[&str] = &["address", "email", "emailAddress"];

/// Keys that may carry the display name in an address object, in lookup order.
const NAME_KEYS: &[&str] = &["name", "displayName"];

/// Naive datetime layouts accepted for `received_at` (interpreted as UTC).
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Normalize any supported address representation.
///
/// # Errors
///
/// Returns [`EmailError`] for objects without an address key, values that
/// are neither strings nor objects, and malformed mailboxes.
pub fn normalize_address(value: &Value) -> Result<EmailAddress, EmailError> {
    match value {
        Value::String(raw) => EmailAddress::parse(raw),
        Value::Object(map) => {
            let address = ADDRESS_KEYS
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str))
                .filter(|a| !a.trim().is_empty())
                .ok_or_else(|| {
                    EmailError::UnsupportedAddress(format!(
                        "cannot extract email address from {value}"
                    ))
                })?;
            let name = NAME_KEYS
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str));
            EmailAddress::new(address, name)
        }
        other => Err(EmailError::UnsupportedAddress(other.to_string())),
    }
}

/// Parse `received_at` as RFC 3339, falling back to a naive UTC datetime.
///
/// # Errors
///
/// Returns [`EmailError::InvalidTimestamp`] if no layout matches.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<FixedOffset>, EmailError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts);
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(raw, layout).ok())
        .map(|naive| naive.and_utc().fixed_offset())
        .ok_or_else(|| EmailError::InvalidTimestamp(raw.to_owned()))
}

/// Build a normalized message from a JSON document.
///
/// HTML bodies are reduced to plain text.
///
/// # Errors
///
/// Returns [`EmailError::Invalid`] for missing required fields or any
/// malformed address/timestamp.
pub fn parse_email(document: Value) -> Result<EmailInput, EmailError> {
    let mut email: EmailInput = serde_json::from_value(document).map_err(|e| {
        warn!(error = %e, "email validation failed");
        EmailError::Invalid(e.to_string())
    })?;
    email.body = extract_text_content(&email.body);
    debug!(subject = %email.subject, "parsed email");
    Ok(email)
}

/// [`parse_email`] for a raw JSON string.
///
/// # Errors
///
/// Returns [`EmailError::Invalid`] if the text is not JSON or the document
/// is not a valid message.
pub fn parse_email_str(text: &str) -> Result<EmailInput, EmailError> {
    let document: Value =
        serde_json::from_str(text).map_err(|e| EmailError::Invalid(e.to_string()))?;
    parse_email(document)
}

/// Check that a parsed message carries usable content.
///
/// Requires a non-blank subject and body and at least one recipient.
pub fn validate_email(email: &EmailInput) -> bool {
    if email.subject.trim().is_empty() {
        warn!("email missing subject");
        return false;
    }
    if email.body.trim().is_empty() {
        warn!("email missing body");
        return false;
    }
    if email.to_address.is_empty() {
        warn!("email has no recipients");
        return false;
    }
    true
}

/// Render a message as the text block embedded in reasoning-engine prompts.
pub fn format_email_for_llm(email: &EmailInput) -> String {
    let to = email
        .to_address
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Subject: {}\nFrom: {}\nTo: {}\nDate: {}\n\n{}",
        email.subject,
        email.from_address,
        to,
        email.received_at.to_rfc3339(),
        email.body
    )
}

// ---------------------------------------------------------------------------
// serde helpers
// ---------------------------------------------------------------------------

/// Accept a single address, a list of addresses, or `null`.
pub(crate) fn address_list<'de, D>(deserializer: D) -> Result<Vec<EmailAddress>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let items = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(single) => vec![single],
    };
    items
        .iter()
        .map(|item| normalize_address(item).map_err(D::Error::custom))
        .collect()
}

pub(crate) fn timestamp<'de, D>(deserializer: D) -> Result<DateTime<FixedOffset>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(D::Error::custom)
}

/// Objects become [`EmailMetadata`]; anything else is dropped.
pub(crate) fn lenient_metadata<'de, D>(deserializer: D) -> Result<Option<EmailMetadata>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        Some(value @ Value::Object(_)) => serde_json::from_value(value)
            .map(Some)
            .map_err(D::Error::custom),
        _ => Ok(None),
    }
}

pub(crate) fn attachment_list<'de, D>(deserializer: D) -> Result<Vec<Attachment>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Attachment>>::deserialize(deserializer)?.unwrap_or_default())
}
