//! Reasoning-engine provider abstraction.
//!
//! Defines the [`LlmProvider`] trait, the caller-owned [`Conversation`]
//! state passed into each call, and the request/response types shared by
//! provider implementations.
//!
//! One HTTP provider is implemented: [`ollama::OllamaProvider`] (Ollama
//! `/api/chat`). Tests and embedders of the library plug in their own.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub mod ollama;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// Conversation participant role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System message.
    System,
    /// Human user message.
    User,
    /// Assistant (LLM) message.
    Assistant,
}

/// A message in a conversation with an LLM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message author.
    pub role: Role,
    /// Plain text content.
    pub content: String,
}

impl Message {
    /// A user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
        }
    }

    /// An assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
        }
    }
}

/// Conversation state owned by the caller.
///
/// Providers never keep turns between calls; whoever wants multi-turn
/// context builds it here and passes it in explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    system: Option<String>,
    messages: Vec<Message>,
}

impl Conversation {
    /// Start an empty conversation with an optional system prompt.
    pub fn new(system: Option<String>) -> Self {
        Self {
            system,
            messages: Vec::new(),
        }
    }

    /// Append a user turn.
    pub fn push_user(&mut self, text: impl Into<String>) {
        self.messages.push(Message::user(text));
    }

    /// Append an assistant turn.
    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.messages.push(Message::assistant(text));
    }

    /// The system prompt, if any.
    pub fn system(&self) -> Option<&str> {
        self.system.as_deref()
    }

    /// Turns recorded so far.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Text of the most recent assistant turn.
    pub fn last_reply(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }

    /// Snapshot the conversation into a provider request.
    pub fn to_request(&self, max_tokens: Option<u32>) -> CompletionRequest {
        CompletionRequest {
            messages: self.messages.clone(),
            system: self.system.clone(),
            max_tokens,
        }
    }
}

// ---------------------------------------------------------------------------
// Request / Response
// ---------------------------------------------------------------------------

/// A request to an LLM provider for a completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Conversation history including the latest user message.
    pub messages: Vec<Message>,
    /// System prompt (injected before messages).
    pub system: Option<String>,
    /// Maximum tokens in the response.
    pub max_tokens: Option<u32>,
}

/// The reason a completion stopped generating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Normal end of turn.
    EndTurn,
    /// Max token limit reached.
    MaxTokens,
    /// A stop sequence was hit.
    StopSequence,
    /// Provider-specific other reason.
    Other(String),
}

/// Usage statistics for a completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsageStats {
    /// Tokens used in the prompt/input.
    pub input_tokens: u32,
    /// Tokens generated in the response.
    pub output_tokens: u32,
}

/// The response from an LLM provider.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Response text.
    pub text: String,
    /// Why the model stopped.
    pub stop_reason: StopReason,
    /// Token usage.
    pub usage: UsageStats,
    /// The model identifier that served this response.
    pub model: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by model providers.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// HTTP transport failure.
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Response did not match expected schema.
    #[error("provider response parse error: {0}")]
    Parse(String),
    /// Upstream provider responded with an error status.
    #[error("provider returned non-success status {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },
    /// Provider cannot satisfy the request with current configuration.
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    /// The call exceeded the caller's deadline.
    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

/// Check HTTP response status and return body text or a structured error.
///
/// # Errors
///
/// Returns `ProviderError::Request` on transport failure, `ProviderError::HttpStatus` on non-2xx.
pub async fn check_http_response(response: reqwest::Response) -> Result<String, ProviderError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ProviderError::HttpStatus {
            status: status.as_u16(),
            body: sanitize_http_error_body(&body),
        });
    }
    Ok(body)
}

fn sanitize_http_error_body(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut sanitized = collapsed;
    for pattern in [r"sk-[A-Za-z0-9_\-]{20,}", r"Bearer\s+[A-Za-z0-9._\-]{16,}"] {
        if let Ok(regex) = Regex::new(pattern) {
            sanitized = regex.replace_all(&sanitized, "[REDACTED]").into_owned();
        }
    }

    const MAX_ERROR_BODY_CHARS: usize = 256;
    if sanitized.chars().count() > MAX_ERROR_BODY_CHARS {
        let shortened = sanitized
            .chars()
            .take(MAX_ERROR_BODY_CHARS)
            .collect::<String>();
        return format!("{shortened}...[truncated]");
    }

    sanitized
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Core LLM provider interface.
///
/// Implementations must be `Send + Sync` so a workflow holding one can run
/// on any runtime worker and be cloned into concurrent tasks.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Request a completion from the LLM.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on API, network, or parse failure.
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError>;

    /// The model identifier string this provider is instantiated for.
    fn model_id(&self) -> &str;
}

/// Send the conversation's pending turn and record the reply in it.
///
/// Returns the full response so callers can inspect usage and the stop
/// reason. When `timeout` is set the call is abandoned after that long and
/// reported as [`ProviderError::Timeout`].
///
/// # Errors
///
/// Propagates the provider's error; the conversation is left unchanged.
pub async fn send(
    provider: &dyn LlmProvider,
    conversation: &mut Conversation,
    max_tokens: Option<u32>,
    timeout: Option<Duration>,
) -> Result<CompletionResponse, ProviderError> {
    let request = conversation.to_request(max_tokens);
    let response = match timeout {
        Some(limit) => tokio::time::timeout(limit, provider.complete(request))
            .await
            .map_err(|_| ProviderError::Timeout(limit))??,
        None => provider.complete(request).await?,
    };
    conversation.push_assistant(response.text.clone());
    Ok(response)
}

// ---------------------------------------------------------------------------
// Utility
// ---------------------------------------------------------------------------

/// Parse a provider string like `"ollama/qwen3:4b"` into components.
///
/// Returns `(provider_name, model_name)`.
///
/// # Errors
///
/// Returns an error if the string has no `/` separator or either side is empty.
pub fn parse_provider_string(s: &str) -> anyhow::Result<(&str, &str)> {
    let (provider, model) = s.split_once('/').ok_or_else(|| {
        anyhow::anyhow!("invalid provider string: {s:?}, expected format 'provider/model'")
    })?;
    if provider.is_empty() || model.is_empty() {
        anyhow::bail!("invalid provider string: {s:?}, both provider and model must be non-empty");
    }
    Ok((provider, model))
}
