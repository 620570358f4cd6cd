//! Extraction/validation workflow.
//!
//! [`AgentWorkflow`] drives a message through four fixed stages against a
//! reasoning engine ([`crate::providers::LlmProvider`]):
//!
//! 1. **Classify** picks a [`crate::vault::VaultType`].
//! 2. **Extract** asks for schema-shaped data and suggested actions.
//! 3. **Validate** checks the data, strictly for healthcare, otherwise via the engine.
//! 4. **Finalize** types the actions and scores confidence.
//!
//! Stages run strictly in sequence; separate messages may run concurrently
//! via [`AgentWorkflow::process_many`].

use std::fmt;

use crate::providers::ProviderError;

pub mod actions;
pub mod prompts;
pub mod workflow;

pub use actions::infer_action_type;
pub use workflow::AgentWorkflow;

/// A workflow stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowStage {
    /// Choose the vault type.
    Classify,
    /// Extract structured data.
    Extract,
    /// Validate the extracted data.
    Validate,
    /// Assemble the final result.
    Finalize,
}

impl WorkflowStage {
    /// All stages in execution order.
    pub const ALL: [WorkflowStage; 4] = [
        WorkflowStage::Classify,
        WorkflowStage::Extract,
        WorkflowStage::Validate,
        WorkflowStage::Finalize,
    ];

    /// Lowercase stage name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Classify => "classify",
            Self::Extract => "extract",
            Self::Validate => "validate",
            Self::Finalize => "finalize",
        }
    }
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reasoning-engine fault that aborted a stage.
#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed: {source}")]
pub struct WorkflowError {
    /// Stage that was running.
    pub stage: WorkflowStage,
    /// Underlying provider fault.
    #[source]
    pub source: ProviderError,
}
