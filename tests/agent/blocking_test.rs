//! Blocking entry point and concurrent batch driver tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;

use mailvault::agent::AgentWorkflow;
use mailvault::config::WorkflowConfig;
use mailvault::email::{EmailAddress, EmailInput};
use mailvault::providers::{
    CompletionRequest, CompletionResponse, LlmProvider, ProviderError, StopReason, UsageStats,
};
use mailvault::vault::VaultType;

/// Classifies each message by the vault name in its subject line and
/// tracks how many calls are in flight at once.
#[derive(Default)]
struct SubjectRouter {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    delay_ms: u64,
}

fn subject_in(prompt: &str) -> String {
    prompt
        .lines()
        .find_map(|line| line.strip_prefix("Subject: "))
        .unwrap_or_default()
        .trim()
        .to_owned()
}

#[async_trait]
impl LlmProvider for SubjectRouter {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        self.peak.fetch_max(now, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }

        let prompt = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let text = if prompt.to_lowercase().contains("classify") {
            format!(r#"{{"vault_type": "{}", "confidence": 0.8}}"#, subject_in(&prompt))
        } else if prompt.starts_with("Validate") {
            r#"{"validation_passed": true}"#.to_owned()
        } else {
            r#"{"note": "extracted"}"#.to_owned()
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(CompletionResponse {
            text,
            stop_reason: StopReason::EndTurn,
            usage: UsageStats::default(),
            model: "mock".to_owned(),
        })
    }

    fn model_id(&self) -> &str {
        "mock/router"
    }
}

fn email(subject: &str) -> EmailInput {
    EmailInput::new(
        EmailAddress::new("sender@example.com", None).expect("valid"),
        vec![EmailAddress::new("me@example.com", None).expect("valid")],
        subject,
        "body text",
        DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").expect("valid timestamp"),
    )
}

#[test]
fn blocking_call_without_runtime() {
    let workflow = AgentWorkflow::new(Arc::new(SubjectRouter::default()));
    let response = workflow.process_email(&email("financial"));
    assert!(response.errors.is_empty());
    assert_eq!(response.extraction.vault_type, VaultType::Financial);
    assert!((response.extraction.confidence - 0.85).abs() < 1e-9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn blocking_call_inside_multi_thread_runtime() {
    let workflow = AgentWorkflow::new(Arc::new(SubjectRouter::default()));
    let response = workflow.process_email(&email("legal"));
    assert!(response.errors.is_empty());
    assert_eq!(response.extraction.vault_type, VaultType::Legal);
}

#[tokio::test]
async fn blocking_call_inside_current_thread_runtime() {
    let workflow = AgentWorkflow::new(Arc::new(SubjectRouter::default()));
    let response = workflow.process_email(&email("end_of_life"));
    assert!(response.errors.is_empty());
    assert_eq!(response.extraction.vault_type, VaultType::EndOfLife);
}

#[tokio::test]
async fn blocking_and_async_paths_agree() {
    let workflow = AgentWorkflow::new(Arc::new(SubjectRouter::default()));
    let message = email("healthcare");
    let blocking = workflow.process_email(&message);
    let awaited = workflow.process_email_async(&message).await;
    assert_eq!(blocking.extraction, awaited.extraction);
    assert_eq!(blocking.tools_used, awaited.tools_used);
}

#[tokio::test]
async fn batch_preserves_input_order() {
    let workflow = AgentWorkflow::new(Arc::new(SubjectRouter::default()));
    let subjects = [
        "legal",
        "financial",
        "healthcare",
        "personal_info",
        "digital_accounts",
        "communications",
    ];
    let emails: Vec<EmailInput> = subjects.iter().map(|s| email(s)).collect();

    let responses = workflow.process_many(emails).await;

    let got: Vec<&str> = responses
        .iter()
        .map(|r| r.extraction.vault_type.as_str())
        .collect();
    assert_eq!(got, subjects);
}

#[tokio::test(start_paused = true)]
async fn batch_respects_concurrency_limit() {
    let router = Arc::new(SubjectRouter {
        delay_ms: 50,
        ..SubjectRouter::default()
    });
    let config = WorkflowConfig {
        concurrency: 2,
        ..WorkflowConfig::default()
    };
    let workflow = AgentWorkflow::with_config(router.clone(), config);
    let emails: Vec<EmailInput> = (0..6).map(|_| email("financial")).collect();

    let responses = workflow.process_many(emails).await;

    assert_eq!(responses.len(), 6);
    assert!(responses.iter().all(|r| r.errors.is_empty()));
    let peak = router.peak.load(Ordering::SeqCst);
    assert!((1..=2).contains(&peak), "peak in-flight calls was {peak}");
}

#[tokio::test]
async fn empty_batch_returns_nothing() {
    let workflow = AgentWorkflow::new(Arc::new(SubjectRouter::default()));
    assert!(workflow.process_many(Vec::new()).await.is_empty());
}
