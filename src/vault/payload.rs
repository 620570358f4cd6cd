//! Vault payload builder.
//!
//! Serializes a normalized message into the storable record. Independent of
//! classification: the caller already knows where the record goes.

use std::time::Instant;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error};

use super::VaultAddResult;
use crate::email::{Attachment, EmailAddress, EmailInput, EmailMetadata};

/// Borrowed view of the stored shape.
#[derive(Serialize)]
struct VaultPayload<'a> {
    from_address: &'a EmailAddress,
    to_address: &'a [EmailAddress],
    subject: &'a str,
    body: &'a str,
    received_at: String,
    cc: &'a [EmailAddress],
    bcc: &'a [EmailAddress],
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a EmailMetadata>,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    attachments: &'a [Attachment],
}

/// Serialize a message into a plain JSON object.
///
/// Pure and deterministic: equal messages produce byte-identical output.
/// The timestamp is rendered as RFC 3339; `metadata` and `attachments`
/// appear only when present.
///
/// # Errors
///
/// Returns the serializer error if a metadata value cannot be represented.
pub fn build_payload(email: &EmailInput) -> Result<Map<String, Value>, serde_json::Error> {
    let view = VaultPayload {
        from_address: &email.from_address,
        to_address: &email.to_address,
        subject: &email.subject,
        body: &email.body,
        received_at: email.received_at.to_rfc3339(),
        cc: &email.cc,
        bcc: &email.bcc,
        metadata: email.metadata.as_ref(),
        attachments: &email.attachments,
    };
    match serde_json::to_value(view)? {
        Value::Object(map) => Ok(map),
        other => Err(serde::ser::Error::custom(format!(
            "payload serialized to non-object {other}"
        ))),
    }
}

/// Build the storable record for a message already routed to `vault_type`.
///
/// Never fails: a serialization fault yields empty `data` and an entry in
/// `errors`. Persistence is the caller's concern.
pub fn add_email_to_vault(email: &EmailInput, vault_type: &str) -> VaultAddResult {
    let start = Instant::now();
    let mut errors = Vec::new();

    let data = match build_payload(email) {
        Ok(data) => data,
        Err(e) => {
            error!(error = %e, vault_type, "failed to build vault payload");
            errors.push(e.to_string());
            Map::new()
        }
    };

    let elapsed = start.elapsed().as_secs_f64();
    debug!(vault_type, elapsed_s = elapsed, "built vault payload");

    VaultAddResult {
        vault_type: vault_type.to_owned(),
        data,
        errors,
        processing_time_s: Some(elapsed),
    }
}
