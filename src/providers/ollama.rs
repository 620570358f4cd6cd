//! Reasoning engine backed by a local Ollama server (`/api/chat`).
//!
//! Requests are non-streaming: the workflow needs the whole reply before it
//! can look for structured data in it.

use serde::{Deserialize, Serialize};

use super::{
    check_http_response, CompletionRequest, CompletionResponse, LlmProvider, ProviderError, Role,
    StopReason, UsageStats,
};

/// Default Ollama API base URL.
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Chat request body.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct ChatRequest {
    /// Model name as known to the server.
    pub model: String,
    /// System prompt first, then the conversation turns.
    pub messages: Vec<ChatMessage>,
    /// Always `false`.
    pub stream: bool,
    /// Sampling and length controls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<ChatOptions>,
}

/// One chat turn on the wire.
#[doc(hidden)]
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    /// "system", "user" or "assistant".
    pub role: String,
    /// Turn text.
    pub content: String,
}

/// Generation options; omitted entirely when nothing is set.
#[doc(hidden)]
#[derive(Debug, Default, Serialize)]
pub struct ChatOptions {
    /// Response token limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl ChatOptions {
    fn is_unset(&self) -> bool {
        self.num_predict.is_none() && self.temperature.is_none()
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatReply,
    model: String,
    done_reason: Option<String>,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

/// Ollama chat provider.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    model_spec: String,
    /// Model name passed to Ollama.
    #[doc(hidden)]
    pub model: String,
    /// Server base URL without a trailing slash.
    #[doc(hidden)]
    pub base_url: String,
    temperature: Option<f32>,
    client: reqwest::Client,
}

impl OllamaProvider {
    /// Create a provider for `model_name`, reported as `model_spec`.
    pub fn new(model_spec: String, model_name: String) -> Self {
        Self {
            model_spec,
            model: model_name,
            base_url: DEFAULT_OLLAMA_URL.to_owned(),
            temperature: None,
            client: reqwest::Client::new(),
        }
    }

    /// Point the provider at a different Ollama server.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_owned();
        self
    }

    /// Fix the sampling temperature for every request.
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Build the wire request for a completion.
    #[doc(hidden)]
    pub fn build_request(&self, request: &CompletionRequest) -> ChatRequest {
        let system = request.system.iter().map(|text| ChatMessage {
            role: "system".to_owned(),
            content: text.clone(),
        });
        let turns = request.messages.iter().map(|msg| ChatMessage {
            role: match msg.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            }
            .to_owned(),
            content: msg.content.clone(),
        });

        let options = ChatOptions {
            num_predict: request.max_tokens,
            temperature: self.temperature,
        };

        ChatRequest {
            model: self.model.clone(),
            messages: system.chain(turns).collect(),
            stream: false,
            options: (!options.is_unset()).then_some(options),
        }
    }

    /// Confirm the server answers and has the configured model pulled.
    ///
    /// # Errors
    ///
    /// [`ProviderError::Unavailable`] when the model is missing; transport,
    /// status and parse failures otherwise.
    pub async fn check_model(&self) -> Result<(), ProviderError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.client.get(&url).send().await?;
        let body = check_http_response(response).await?;
        if model_listed(&body, &self.model)? {
            Ok(())
        } else {
            Err(ProviderError::Unavailable(format!(
                "model {} is not pulled on {}",
                self.model, self.base_url
            )))
        }
    }
}

/// Whether an `/api/tags` body lists `model`. An untagged name matches
/// its `:latest` entry.
///
/// # Errors
///
/// Returns `ProviderError::Parse` if the body is not a tags listing.
#[doc(hidden)]
pub fn model_listed(body: &str, model: &str) -> Result<bool, ProviderError> {
    let tags: TagsResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;
    let latest = format!("{model}:latest");
    Ok(tags
        .models
        .iter()
        .any(|entry| entry.name == model || entry.name == latest))
}

/// Parse a chat response body.
///
/// # Errors
///
/// Returns `ProviderError::Parse` if the body cannot be deserialized.
#[doc(hidden)]
pub fn parse_response(body: &str) -> Result<CompletionResponse, ProviderError> {
    let resp: ChatResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;

    let stop_reason = match resp.done_reason.as_deref() {
        None | Some("stop") => StopReason::EndTurn,
        Some("length") => StopReason::MaxTokens,
        Some(other) => StopReason::Other(other.to_owned()),
    };

    Ok(CompletionResponse {
        text: resp.message.content,
        stop_reason,
        usage: UsageStats {
            input_tokens: resp.prompt_eval_count.unwrap_or(0),
            output_tokens: resp.eval_count.unwrap_or(0),
        },
        model: resp.model,
    })
}

#[async_trait::async_trait]
impl LlmProvider for OllamaProvider {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&self.build_request(&request))
            .send()
            .await?;

        let body = check_http_response(response).await?;
        parse_response(&body)
    }

    fn model_id(&self) -> &str {
        &self.model_spec
    }
}
