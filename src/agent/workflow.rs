//! The extraction workflow: Classify → Extract → Validate → Finalize.
//!
//! Each stage issues at most one reasoning-engine request through a fresh,
//! caller-owned [`Conversation`] and awaits it before the next stage starts.
//! Unusable responses degrade the result (warnings, lower confidence); only
//! a failed engine call aborts the run, and even then the caller receives a
//! complete [`AgentResponse`].

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::actions::to_suggested_actions;
use super::prompts::{classify_prompt, extract_prompt, validate_prompt, SYSTEM_PROMPT};
use super::{WorkflowError, WorkflowStage};
use crate::config::WorkflowConfig;
use crate::email::{format_email_for_llm, EmailInput};
use crate::extract::{actions_from_json, extract_json, extract_suggested_actions};
use crate::providers::{self, Conversation, LlmProvider, StopReason};
use crate::vault::{
    AgentResponse, ExtractedData, HealthcareVaultSchema, VaultExtraction, VaultType,
};

/// Drives messages through the extraction workflow.
///
/// Cheap to clone: the provider is shared behind an [`Arc`]. Instances hold
/// no per-message state, so clones may run concurrently.
#[derive(Clone)]
pub struct AgentWorkflow {
    provider: Arc<dyn LlmProvider>,
    config: WorkflowConfig,
}

impl std::fmt::Debug for AgentWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentWorkflow")
            .field("model", &self.provider.model_id())
            .field("config", &self.config)
            .finish()
    }
}

/// Per-run state threaded through the stages.
#[derive(Debug, Default)]
struct RunState {
    tools_used: Vec<String>,
    warnings: Vec<String>,
    diagnostics: Vec<String>,
}

/// Classify stage output.
#[derive(Debug)]
struct Classification {
    vault_type: VaultType,
    confidence: f64,
    multiple_vaults: Option<Vec<VaultType>>,
}

/// Extract stage output.
#[derive(Debug, Default)]
struct Extraction {
    data: Map<String, Value>,
    actions: Vec<String>,
}

/// Validate stage output.
#[derive(Debug)]
struct Validation {
    passed: bool,
    record: Option<HealthcareVaultSchema>,
}

impl AgentWorkflow {
    /// Create a workflow over a reasoning engine with default tuning.
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self::with_config(provider, WorkflowConfig::default())
    }

    /// Create a workflow with explicit tuning.
    pub fn with_config(provider: Arc<dyn LlmProvider>, config: WorkflowConfig) -> Self {
        Self { provider, config }
    }

    /// The active tuning.
    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Process one message, awaiting each engine call in turn.
    ///
    /// Never fails: engine faults are recorded in `errors` and a default
    /// extraction is returned.
    pub async fn process_email_async(&self, email: &EmailInput) -> AgentResponse {
        let run_id = Uuid::new_v4();
        let span = info_span!("workflow", %run_id, subject = %email.subject);
        self.run_instrumented(email).instrument(span).await
    }

    /// Process one message from blocking code.
    ///
    /// The async path runs to completion on a dedicated worker thread with
    /// its own single-threaded runtime, so calling this from inside a running
    /// Tokio runtime does not nest schedulers. Blocks the calling thread.
    pub fn process_email(&self, email: &EmailInput) -> AgentResponse {
        let started = Instant::now();
        let workflow = self.clone();
        let email = email.clone();

        let spawned = std::thread::Builder::new()
            .name("mailvault-workflow".to_owned())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()?;
                Ok::<_, std::io::Error>(runtime.block_on(workflow.process_email_async(&email)))
            });

        let outcome = match spawned {
            Ok(handle) => match handle.join() {
                Ok(Ok(response)) => return response,
                Ok(Err(e)) => format!("failed to start workflow runtime: {e}"),
                Err(_) => "workflow worker panicked".to_owned(),
            },
            Err(e) => format!("failed to spawn workflow worker: {e}"),
        };
        error!(error = %outcome, "blocking workflow call failed");
        failed_response(outcome, Vec::new(), Vec::new(), Some(started))
    }

    /// Process independent messages concurrently.
    ///
    /// At most `concurrency` workflows run at once. Responses are returned
    /// in input order.
    pub async fn process_many(&self, emails: Vec<EmailInput>) -> Vec<AgentResponse> {
        let total = emails.len();
        let limit = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for (index, email) in emails.into_iter().enumerate() {
            let workflow = self.clone();
            let limit = Arc::clone(&limit);
            tasks.spawn(async move {
                let _permit = limit.acquire_owned().await.ok();
                (index, workflow.process_email_async(&email).await)
            });
        }

        let mut slots: Vec<Option<AgentResponse>> = (0..total).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, response)) => {
                    if let Some(slot) = slots.get_mut(index) {
                        *slot = Some(response);
                    }
                }
                Err(e) => error!(error = %e, "workflow task failed to complete"),
            }
        }

        info!(count = total, "batch processed");
        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    failed_response(
                        "workflow task did not complete".to_owned(),
                        Vec::new(),
                        Vec::new(),
                        None,
                    )
                })
            })
            .collect()
    }

    async fn run_instrumented(&self, email: &EmailInput) -> AgentResponse {
        let started = Instant::now();
        let mut state = RunState::default();

        match self.run(email, &mut state).await {
            Ok(extraction) => {
                let processing_time = started.elapsed().as_secs_f64();
                info!(
                    vault_type = %extraction.vault_type,
                    confidence = extraction.confidence,
                    warnings = state.warnings.len(),
                    elapsed_s = processing_time,
                    "workflow finished"
                );
                AgentResponse {
                    extraction,
                    processing_time: Some(processing_time),
                    tools_used: state.tools_used,
                    errors: Vec::new(),
                    warnings: state.warnings,
                }
            }
            Err(e) => {
                error!(stage = %e.stage, error = %e, "workflow failed");
                failed_response(
                    e.to_string(),
                    state.tools_used,
                    state.warnings,
                    Some(started),
                )
            }
        }
    }

    async fn run(
        &self,
        email: &EmailInput,
        state: &mut RunState,
    ) -> Result<VaultExtraction, WorkflowError> {
        let formatted = format_email_for_llm(email);

        let classification = self.classify(&formatted, state).await?;
        let extraction = self
            .extract(classification.vault_type, &formatted, state)
            .await?;
        let validation = self
            .validate(classification.vault_type, &extraction.data, state)
            .await?;

        Ok(self.finalize(classification, extraction, validation, state))
    }

    /// Send one single-turn prompt to the engine.
    async fn ask(
        &self,
        stage: WorkflowStage,
        prompt: String,
        state: &mut RunState,
    ) -> Result<String, WorkflowError> {
        let mut conversation = Conversation::new(Some(SYSTEM_PROMPT.to_owned()));
        conversation.push_user(prompt);

        let started = Instant::now();
        let response = providers::send(
            self.provider.as_ref(),
            &mut conversation,
            self.config.max_tokens,
            self.config.request_timeout(),
        )
        .await
        .map_err(|source| WorkflowError { stage, source })?;

        state.tools_used.push(format!("llm:{stage}"));
        debug!(
            %stage,
            model = %response.model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "stage response received"
        );
        if response.stop_reason == StopReason::MaxTokens {
            warn!(%stage, "reply cut off at the token limit");
            state
                .warnings
                .push(format!("{stage} response was cut off at the token limit"));
        }
        Ok(response.text)
    }

    async fn classify(
        &self,
        formatted_email: &str,
        state: &mut RunState,
    ) -> Result<Classification, WorkflowError> {
        let response = self
            .ask(
                WorkflowStage::Classify,
                classify_prompt(formatted_email),
                state,
            )
            .await?;
        let parsed = parse_or_note(WorkflowStage::Classify, &response, state);

        let declared = parsed
            .get("vault_type")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<VaultType>().ok());

        let vault_type = match declared {
            Some(vault_type) => vault_type,
            None => {
                let scanned = scan_vocabulary(&response);
                state.warnings.push(match scanned {
                    Some(found) => format!(
                        "classification response had no usable vault_type; matched {found} in response text"
                    ),
                    None => format!(
                        "classification response had no usable vault_type; defaulting to {}",
                        VaultType::default()
                    ),
                });
                scanned.unwrap_or_default()
            }
        };

        let confidence = parsed
            .get("confidence")
            .and_then(Value::as_f64)
            .map_or(self.config.default_confidence, |c| c.clamp(0.0, 1.0));

        let multiple_vaults = parsed
            .get("multiple_vaults")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .filter_map(|s| s.parse::<VaultType>().ok())
                    .filter(|v| *v != vault_type)
                    .collect::<Vec<_>>()
            })
            .filter(|vaults| !vaults.is_empty());

        let mut note = format!("classified as {vault_type} (confidence {confidence:.2})");
        if let Some(reasoning) = parsed.get("reasoning").and_then(Value::as_str) {
            note.push_str(": ");
            note.push_str(reasoning.trim());
        }
        state.diagnostics.push(note);

        info!(%vault_type, confidence, "email classified");
        Ok(Classification {
            vault_type,
            confidence,
            multiple_vaults,
        })
    }

    async fn extract(
        &self,
        vault_type: VaultType,
        formatted_email: &str,
        state: &mut RunState,
    ) -> Result<Extraction, WorkflowError> {
        let response = self
            .ask(
                WorkflowStage::Extract,
                extract_prompt(vault_type, formatted_email),
                state,
            )
            .await?;

        let mut data = match extract_json(&response) {
            Some(data) => data,
            None => {
                state
                    .warnings
                    .push("no structured data found in extraction response".to_owned());
                note_unparsed(WorkflowStage::Extract, &response, state);
                Map::new()
            }
        };

        let actions = data
            .remove("suggested_actions")
            .and_then(|value| actions_from_json(&value))
            .unwrap_or_else(|| extract_suggested_actions(&response));

        debug!(
            %vault_type,
            fields = data.len(),
            actions = actions.len(),
            "extraction parsed"
        );
        Ok(Extraction { data, actions })
    }

    async fn validate(
        &self,
        vault_type: VaultType,
        data: &Map<String, Value>,
        state: &mut RunState,
    ) -> Result<Validation, WorkflowError> {
        if vault_type == VaultType::Healthcare && !data.is_empty() {
            match HealthcareVaultSchema::validate(data) {
                Ok(record) => {
                    state.tools_used.push("schema:healthcare".to_owned());
                    debug!("healthcare data passed schema validation");
                    return Ok(Validation {
                        passed: true,
                        record: Some(record),
                    });
                }
                Err(e) => {
                    warn!(error = %e, "healthcare schema validation failed, asking engine");
                    state
                        .warnings
                        .push(format!("healthcare schema validation failed: {e}"));
                }
            }
        }

        let response = self
            .ask(
                WorkflowStage::Validate,
                validate_prompt(vault_type, data),
                state,
            )
            .await?;
        let parsed = parse_or_note(WorkflowStage::Validate, &response, state);

        if let Some(errors) = parsed.get("validation_errors").and_then(Value::as_array) {
            state.warnings.extend(
                errors
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|e| format!("validation: {e}")),
            );
        }

        let passed = match parsed.get("validation_passed").and_then(Value::as_bool) {
            Some(passed) => passed,
            None => {
                debug!("no validation verdict in response, using data presence");
                !data.is_empty()
            }
        };

        Ok(Validation {
            passed,
            record: None,
        })
    }

    fn finalize(
        &self,
        classification: Classification,
        extraction: Extraction,
        validation: Validation,
        state: &mut RunState,
    ) -> VaultExtraction {
        let confidence = self.score(!extraction.data.is_empty(), validation.passed);
        debug!(
            stage = %WorkflowStage::Finalize,
            classify_confidence = classification.confidence,
            confidence,
            validation_passed = validation.passed,
            "finalizing extraction"
        );

        let extracted_data = match validation.record {
            Some(record) => ExtractedData::Healthcare(Box::new(record)),
            None => ExtractedData::Generic(extraction.data),
        };

        let reasoning = if state.diagnostics.is_empty() {
            None
        } else {
            Some(state.diagnostics.join("\n"))
        };

        VaultExtraction {
            vault_type: classification.vault_type,
            confidence,
            extracted_data,
            suggested_actions: to_suggested_actions(&extraction.actions),
            reasoning,
            multiple_vaults: classification.multiple_vaults,
        }
    }

    /// Heuristic confidence: base, raised once data exists, plus a capped
    /// bonus for passing validation. Never lowered along the way.
    fn score(&self, has_data: bool, validation_passed: bool) -> f64 {
        let mut confidence = self.config.base_confidence;
        if has_data {
            confidence = confidence.max(self.config.extracted_confidence);
        }
        if validation_passed {
            confidence = (confidence + self.config.validation_bonus)
                .min(1.0)
                .max(confidence);
        }
        confidence
    }
}

/// First vault type named anywhere in `text`, in vocabulary order.
fn scan_vocabulary(text: &str) -> Option<VaultType> {
    let lower = text.to_lowercase();
    VaultType::ALL
        .into_iter()
        .find(|v| lower.contains(v.as_str()))
}

/// Keep the full text of a response that held no JSON object.
fn note_unparsed(stage: WorkflowStage, response: &str, state: &mut RunState) {
    state
        .diagnostics
        .push(format!("unparsed {stage} response: {response}"));
}

fn parse_or_note(
    stage: WorkflowStage,
    response: &str,
    state: &mut RunState,
) -> Map<String, Value> {
    extract_json(response).unwrap_or_else(|| {
        note_unparsed(stage, response, state);
        Map::new()
    })
}

/// The safe default returned when the workflow cannot complete.
fn failed_response(
    reason: String,
    tools_used: Vec<String>,
    warnings: Vec<String>,
    started: Option<Instant>,
) -> AgentResponse {
    AgentResponse {
        extraction: VaultExtraction {
            vault_type: VaultType::default(),
            confidence: 0.0,
            extracted_data: ExtractedData::default(),
            suggested_actions: Vec::new(),
            reasoning: Some(format!("workflow failed: {reason}")),
            multiple_vaults: None,
        },
        processing_time: started.map(|s| s.elapsed().as_secs_f64()),
        tools_used,
        errors: vec![reason],
        warnings,
    }
}
