//! Prompt text for each workflow stage.
//!
//! Every prompt embeds the message as rendered by
//! [`crate::email::format_email_for_llm`].

use serde_json::{Map, Value};

use crate::vault::{schema_description, VaultType};

/// System prompt shared by all stages.
pub const SYSTEM_PROMPT: &str = "You are an assistant that files emails into a personal \
information vault. Follow the requested output format exactly and only report information \
present in the email.";

/// Classify prompt: the message plus the closed vault vocabulary.
pub fn classify_prompt(formatted_email: &str) -> String {
    format!(
        "Classify this email into exactly one vault type.\n\n\
         Available vault types: {vocabulary}\n\n\
         Email:\n{formatted_email}\n\n\
         Respond with a JSON object:\n\
         {{\"vault_type\": \"<one of the vault types>\", \"confidence\": <0.0-1.0>, \
         \"reasoning\": \"<brief explanation>\", \"multiple_vaults\": [<other vault types, if any>]}}",
        vocabulary = VaultType::vocabulary(),
    )
}

/// Extract prompt: the vault's schema description plus the message.
pub fn extract_prompt(vault_type: VaultType, formatted_email: &str) -> String {
    format!(
        "Extract structured data from this email for the {vault_type} vault.\n\n\
         {schema}\n\n\
         Email:\n{formatted_email}\n\n\
         Return the extracted data as a single JSON object. After the JSON, list any \
         follow-up tasks as bullet points under a line reading \"Suggested actions:\".",
        schema = schema_description(vault_type),
    )
}

/// Validate prompt: the extracted data checked against the schema description.
pub fn validate_prompt(vault_type: VaultType, data: &Map<String, Value>) -> String {
    let rendered = serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_owned());
    format!(
        "Validate the following data extracted for the {vault_type} vault.\n\n\
         {schema}\n\n\
         Extracted data:\n{rendered}\n\n\
         Respond with a JSON object:\n\
         {{\"validation_passed\": true|false, \"validation_errors\": [\"...\"], \
         \"reasoning\": \"<brief explanation>\"}}",
        schema = schema_description(vault_type),
    )
}
