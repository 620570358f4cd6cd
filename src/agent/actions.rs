//! Conversion of free-text action descriptions into typed actions.
//!
//! Action types are inferred by keyword matching on the lowercased
//! description rather than by another engine round-trip, so the Finalize
//! stage stays deterministic.

use serde_json::Map;

use crate::vault::{ActionType, SuggestedAction};

/// Keyword groups in priority order. First group with a hit wins.
const ACTION_KEYWORDS: &[(ActionType, &[&str])] = &[
    (
        ActionType::Calendar,
        &["calendar", "schedule", "appointment", "meeting"],
    ),
    (ActionType::Reminder, &["reminder", "remind"]),
    (ActionType::UpdateContact, &["contact", "update"]),
    (ActionType::Payment, &["bill", "payment", "pay"]),
];

/// Infer the action type of a description.
///
/// Priority order:
/// 1. calendar  2. reminder  3. update_contact  4. payment  5. general
pub fn infer_action_type(description: &str) -> ActionType {
    let lower = description.to_lowercase();
    ACTION_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map_or(ActionType::General, |(action_type, _)| *action_type)
}

/// Build typed actions from their descriptions, preserving order.
pub fn to_suggested_actions(descriptions: &[String]) -> Vec<SuggestedAction> {
    descriptions
        .iter()
        .map(|description| SuggestedAction {
            action_type: infer_action_type(description),
            description: description.clone(),
            params: Map::new(),
            priority: None,
            due_date: None,
        })
        .collect()
}
