//! Ollama embedder wire format and failure tests.

use mailvault::embedding::{Embedder, EmbedderError, OllamaEmbedder};
use mailvault::providers::ollama::DEFAULT_OLLAMA_URL;
use serde_json::json;

fn texts(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

#[test]
fn embedder_reports_dimensions() {
    let embedder = OllamaEmbedder::new("all-minilm", 384);
    assert_eq!(embedder.dimensions(), 384);
}

#[test]
fn debug_output_names_model_and_url() {
    let embedder = OllamaEmbedder::with_base_url("all-minilm", "http://embed.local:11434/", 3);
    let debug = format!("{embedder:?}");
    assert!(debug.contains("all-minilm"));
    assert!(debug.contains("http://embed.local:11434"));
    assert!(!debug.contains("11434/"));

    let default = format!("{:?}", OllamaEmbedder::new("m", 3));
    assert!(default.contains(DEFAULT_OLLAMA_URL));
}

#[test]
fn request_carries_whole_batch() {
    let embedder = OllamaEmbedder::new("all-minilm", 3);
    let batch = texts(&["email text", "healthcare", "legal"]);
    let body = serde_json::to_value(embedder.build_request(&batch)).expect("serialize");
    assert_eq!(body["model"], json!("all-minilm"));
    assert_eq!(body["input"], json!(["email text", "healthcare", "legal"]));
}

#[test]
fn response_with_matching_count_and_dims() {
    let embedder = OllamaEmbedder::new("m", 3);
    let body = json!({"embeddings": [[0.1, 0.2, 0.3], [0.0, 1.0, 0.0]]}).to_string();
    let vectors = embedder.parse_response(&body, 2).expect("should parse");
    assert_eq!(vectors.len(), 2);
    assert_eq!(vectors[1], vec![0.0, 1.0, 0.0]);
}

#[test]
fn response_with_wrong_count_is_rejected() {
    let embedder = OllamaEmbedder::new("m", 3);
    let body = json!({"embeddings": [[0.1, 0.2, 0.3]]}).to_string();
    let err = embedder.parse_response(&body, 2).expect_err("count mismatch");
    assert!(matches!(err, EmbedderError::Parse(_)));
}

#[test]
fn response_with_wrong_dimensions_is_rejected() {
    let embedder = OllamaEmbedder::new("m", 3);
    let body = json!({"embeddings": [[0.1, 0.2, 0.3], [0.5, 0.5]]}).to_string();
    let err = embedder.parse_response(&body, 2).expect_err("dimension mismatch");
    assert!(matches!(
        err,
        EmbedderError::DimensionMismatch {
            expected: 3,
            actual: 2
        }
    ));
}

#[test]
fn malformed_response_is_rejected() {
    let embedder = OllamaEmbedder::new("m", 3);
    assert!(matches!(
        embedder.parse_response("{\"data\": []}", 1),
        Err(EmbedderError::Parse(_))
    ));
}

#[tokio::test]
async fn empty_batch_skips_the_network() {
    let embedder = OllamaEmbedder::with_base_url("m", "http://127.0.0.1:1", 3);
    let vectors = embedder.embed_batch(&[]).await.expect("empty batch");
    assert!(vectors.is_empty());
}

#[tokio::test]
async fn unreachable_server_reports_error() {
    let embedder = OllamaEmbedder::with_base_url("m", "http://127.0.0.1:1", 3);
    assert!(embedder.embed("hello").await.is_err());
    assert!(embedder.embed_batch(&texts(&["a", "b"])).await.is_err());
}
