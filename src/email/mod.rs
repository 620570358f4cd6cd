//! Normalized email model.
//!
//! Every inbound message is converted into an [`EmailInput`] before it
//! reaches the classifier or the workflow. Address fields are always
//! [`EmailAddress`] values past this boundary; the loose shapes accepted on
//! the wire (`"Name <a@b>"`, bare strings, `{email, displayName}` objects,
//! single values where lists are expected) are resolved during
//! deserialization in [`parser`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

pub mod html;
pub mod parser;

pub use html::extract_text_content;
pub use parser::{format_email_for_llm, parse_email, parse_email_str, validate_email};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Input faults raised while normalizing a message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EmailError {
    /// An address value could not be interpreted.
    #[error("invalid email address {0:?}")]
    InvalidAddress(String),
    /// An address was supplied in a shape we do not understand.
    #[error("unsupported address format: {0}")]
    UnsupportedAddress(String),
    /// The received timestamp is not RFC 3339 or a naive ISO-8601 datetime.
    #[error("invalid received_at timestamp {0:?}")]
    InvalidTimestamp(String),
    /// The message document is malformed or missing a required field.
    #[error("failed to parse email: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Addresses
// ---------------------------------------------------------------------------

/// A mailbox address with an optional display name.
///
/// Construct through [`EmailAddress::new`] / [`EmailAddress::parse`], which
/// reject strings that are not shaped like `local@domain`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value")]
pub struct EmailAddress {
    address: String,
    name: Option<String>,
}

impl EmailAddress {
    /// Create an address, validating its `local@domain` shape.
    ///
    /// # Errors
    ///
    /// Returns [`EmailError::InvalidAddress`] if `address` is not a plausible
    /// mailbox.
    pub fn new(address: &str, name: Option<&str>) -> Result<Self, EmailError> {
        let address = address.trim();
        if !is_plausible_address(address) {
            return Err(EmailError::InvalidAddress(address.to_owned()));
        }
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_owned);
        Ok(Self {
            address: address.to_owned(),
            name,
        })
    }

    /// Parse `"Display Name <addr@example.com>"` or a bare address.
    ///
    /// Quotes around the display name are stripped.
    ///
    /// # Errors
    ///
    /// Returns [`EmailError::InvalidAddress`] if the address part is invalid.
    pub fn parse(raw: &str) -> Result<Self, EmailError> {
        if let (Some(open), Some(close)) = (raw.find('<'), raw.find('>')) {
            if open < close {
                let name = raw[..open].trim().trim_matches(|c| c == '"' || c == '\'');
                let address = &raw[open.saturating_add(1)..close];
                return Self::new(address, Some(name));
            }
        }
        Self::new(raw, None)
    }

    /// The mailbox address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The display name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} <{}>", self.address),
            None => f.write_str(&self.address),
        }
    }
}

impl TryFrom<serde_json::Value> for EmailAddress {
    type Error = EmailError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        parser::normalize_address(&value)
    }
}

fn is_plausible_address(address: &str) -> bool {
    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && !address.chars().any(char::is_whitespace)
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Optional message metadata (ids, thread, headers, labels).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailMetadata {
    /// `Message-ID` header.
    pub message_id: Option<String>,
    /// `In-Reply-To` header.
    pub in_reply_to: Option<String>,
    /// `References` chain.
    pub references: Vec<String>,
    /// Arbitrary additional headers.
    pub headers: BTreeMap<String, serde_json::Value>,
    /// Provider thread identifier.
    pub thread_id: Option<String>,
    /// Provider labels or folders.
    pub labels: Vec<String>,
}

/// Attachment descriptor as supplied by the ingestion layer.
pub type Attachment = serde_json::Map<String, serde_json::Value>;

/// A normalized inbound email.
///
/// Built once per message and only read afterwards: the classifier and the
/// workflow take it by shared reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailInput {
    /// Sender.
    pub from_address: EmailAddress,
    /// Primary recipients.
    #[serde(deserialize_with = "parser::address_list")]
    pub to_address: Vec<EmailAddress>,
    /// Subject line.
    pub subject: String,
    /// Plain-text body (HTML already stripped).
    pub body: String,
    /// When the message was received.
    #[serde(deserialize_with = "parser::timestamp")]
    pub received_at: DateTime<FixedOffset>,
    /// Optional metadata; non-object values are dropped.
    #[serde(default, deserialize_with = "parser::lenient_metadata")]
    pub metadata: Option<EmailMetadata>,
    /// Attachment descriptors.
    #[serde(default, deserialize_with = "parser::attachment_list")]
    pub attachments: Vec<Attachment>,
    /// Carbon-copy recipients.
    #[serde(default, deserialize_with = "parser::address_list")]
    pub cc: Vec<EmailAddress>,
    /// Blind carbon-copy recipients.
    #[serde(default, deserialize_with = "parser::address_list")]
    pub bcc: Vec<EmailAddress>,
}

impl EmailInput {
    /// Create a message with no cc/bcc, metadata, or attachments.
    pub fn new(
        from_address: EmailAddress,
        to_address: Vec<EmailAddress>,
        subject: impl Into<String>,
        body: impl Into<String>,
        received_at: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            from_address,
            to_address,
            subject: subject.into(),
            body: body.into(),
            received_at,
            metadata: None,
            attachments: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
        }
    }

    /// Flatten the message into the text blob used for embedding.
    ///
    /// Stable for identical inputs: subject, sender, blank line, body.
    pub fn to_text(&self) -> String {
        format!(
            "Subject: {}\nFrom: {}\n\n{}",
            self.subject, self.from_address, self.body
        )
    }
}
