//! Embedding generation trait and Ollama implementation.
//!
//! The [`Embedder`] trait abstracts over embedding providers. The default
//! implementation [`OllamaEmbedder`] calls the Ollama `/api/embed` endpoint,
//! which accepts a whole batch of inputs in one request.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::providers::ollama::DEFAULT_OLLAMA_URL;

/// Core embedding generation interface.
///
/// All implementations must be `Send + Sync` so a classifier holding one can
/// be shared across tasks.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate one embedding vector per input text, in input order.
    ///
    /// This is a single round trip to the provider regardless of batch size.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider is unreachable, the request fails,
    /// or the response does not contain one vector per input.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedderError>;

    /// Generate an embedding vector for a single text.
    ///
    /// # Errors
    ///
    /// Same as [`Embedder::embed_batch`].
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        self.embed_batch(&[text.to_owned()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbedderError::Parse("empty embeddings array".to_owned()))
    }

    /// Returns the dimensionality of the embedding vectors produced.
    fn dimensions(&self) -> usize;
}

/// Errors from embedding generation.
#[derive(Debug, thiserror::Error)]
pub enum EmbedderError {
    /// HTTP transport failure.
    #[error("embedder request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Response did not match expected format.
    #[error("embedder response parse error: {0}")]
    Parse(String),

    /// Provider is unavailable.
    #[error("embedder unavailable: {0}")]
    Unavailable(String),

    /// A vector came back with the wrong number of components.
    #[error("embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch {
        /// Configured dimensionality.
        expected: usize,
        /// Length of the returned vector.
        actual: usize,
    },
}

/// Ollama-based embedder using the `/api/embed` endpoint.
pub struct OllamaEmbedder {
    model: String,
    client: reqwest::Client,
    base_url: String,
    dims: usize,
}

impl std::fmt::Debug for OllamaEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaEmbedder")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("dims", &self.dims)
            .finish()
    }
}

impl OllamaEmbedder {
    /// Create an Ollama embedder for the given model.
    ///
    /// `dims` is the expected dimensionality of embeddings (384 for
    /// all-minilm). Vectors of any other length are rejected.
    pub fn new(model: &str, dims: usize) -> Self {
        Self::with_base_url(model, DEFAULT_OLLAMA_URL, dims)
    }

    /// Create an Ollama embedder with a custom base URL.
    pub fn with_base_url(model: &str, base_url: &str, dims: usize) -> Self {
        Self {
            model: model.to_owned(),
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            dims,
        }
    }

    /// Build the request body for the embed endpoint.
    #[doc(hidden)]
    pub fn build_request(&self, texts: &[String]) -> OllamaEmbedRequest {
        OllamaEmbedRequest {
            model: self.model.clone(),
            input: texts.to_vec(),
        }
    }

    /// Parse an `/api/embed` response body, checking count and dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`EmbedderError::Parse`] on malformed JSON or a count
    /// mismatch, [`EmbedderError::DimensionMismatch`] on a wrong-length
    /// vector.
    #[doc(hidden)]
    pub fn parse_response(
        &self,
        body: &str,
        expected_count: usize,
    ) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let parsed: OllamaEmbedResponse =
            serde_json::from_str(body).map_err(|e| EmbedderError::Parse(e.to_string()))?;

        if parsed.embeddings.len() != expected_count {
            return Err(EmbedderError::Parse(format!(
                "expected {expected_count} embeddings, got {}",
                parsed.embeddings.len()
            )));
        }
        if let Some(bad) = parsed.embeddings.iter().find(|v| v.len() != self.dims) {
            return Err(EmbedderError::DimensionMismatch {
                expected: self.dims,
                actual: bad.len(),
            });
        }
        Ok(parsed.embeddings)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/embed", self.base_url);
        let body = self.build_request(texts);

        let response = self.client.post(&url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(EmbedderError::Unavailable(format!(
                "ollama returned {status}: {body_text}"
            )));
        }

        let payload = response.text().await?;
        self.parse_response(&payload, texts.len())
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Request body for Ollama `/api/embed`.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct OllamaEmbedRequest {
    /// Model name.
    pub model: String,
    /// Input texts to embed.
    pub input: Vec<String>,
}

/// Response body from Ollama `/api/embed`.
#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    /// Array of embedding vectors (one per input).
    embeddings: Vec<Vec<f32>>,
}
