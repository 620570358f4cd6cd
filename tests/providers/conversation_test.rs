//! Conversation state and `send` helper tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use mailvault::providers::{
    parse_provider_string, send, CompletionRequest, CompletionResponse, Conversation,
    LlmProvider, ProviderError, Role, StopReason, UsageStats,
};

/// Echoes the last user turn and records every request it sees.
#[derive(Default)]
struct EchoProvider {
    seen: Mutex<Vec<CompletionRequest>>,
}

#[async_trait]
impl LlmProvider for EchoProvider {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let last = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.seen.lock().expect("lock").push(request);
        Ok(CompletionResponse {
            text: format!("echo: {last}"),
            stop_reason: StopReason::EndTurn,
            usage: UsageStats {
                input_tokens: 12,
                output_tokens: 3,
            },
            model: "echo".to_owned(),
        })
    }

    fn model_id(&self) -> &str {
        "mock/echo"
    }
}

struct DownProvider;

#[async_trait]
impl LlmProvider for DownProvider {
    async fn complete(
        &self,
        _request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        Err(ProviderError::Unavailable("engine offline".to_owned()))
    }

    fn model_id(&self) -> &str {
        "mock/down"
    }
}

struct SlowProvider;

#[async_trait]
impl LlmProvider for SlowProvider {
    async fn complete(
        &self,
        _request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        tokio::time::sleep(Duration::from_secs(120)).await;
        Err(ProviderError::Parse("unreachable".to_owned()))
    }

    fn model_id(&self) -> &str {
        "mock/slow"
    }
}

#[test]
fn conversation_tracks_turns() {
    let mut conv = Conversation::new(Some("system text".to_owned()));
    assert_eq!(conv.system(), Some("system text"));
    assert!(conv.last_reply().is_none());

    conv.push_user("first");
    conv.push_assistant("reply one");
    conv.push_user("second");

    assert_eq!(conv.messages().len(), 3);
    assert_eq!(conv.messages()[0].role, Role::User);
    assert_eq!(conv.last_reply(), Some("reply one"));
}

#[test]
fn to_request_snapshots_state() {
    let mut conv = Conversation::new(Some("sys".to_owned()));
    conv.push_user("hello");

    let request = conv.to_request(Some(256));
    assert_eq!(request.system.as_deref(), Some("sys"));
    assert_eq!(request.messages.len(), 1);
    assert_eq!(request.max_tokens, Some(256));

    conv.push_assistant("later");
    assert_eq!(request.messages.len(), 1);
}

#[tokio::test]
async fn send_appends_reply() {
    let provider = EchoProvider::default();
    let mut conv = Conversation::new(None);
    conv.push_user("ping");

    let response = send(&provider, &mut conv, Some(64), None)
        .await
        .expect("send should succeed");

    assert_eq!(response.text, "echo: ping");
    assert_eq!(response.model, "echo");
    assert_eq!(response.usage.input_tokens, 12);
    assert_eq!(response.usage.output_tokens, 3);
    assert_eq!(response.stop_reason, StopReason::EndTurn);
    assert_eq!(conv.messages().len(), 2);
    assert_eq!(conv.last_reply(), Some("echo: ping"));

    let seen = provider.seen.lock().expect("lock");
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].max_tokens, Some(64));
}

#[tokio::test]
async fn providers_do_not_share_state_between_conversations() {
    let provider = EchoProvider::default();

    let mut first = Conversation::new(None);
    first.push_user("one");
    send(&provider, &mut first, None, None).await.expect("first");

    let mut second = Conversation::new(None);
    second.push_user("two");
    send(&provider, &mut second, None, None).await.expect("second");

    let seen = provider.seen.lock().expect("lock");
    assert_eq!(seen[1].messages.len(), 1);
    assert_eq!(seen[1].messages[0].content, "two");
}

#[tokio::test]
async fn failed_send_leaves_conversation_unchanged() {
    let mut conv = Conversation::new(None);
    conv.push_user("ping");
    let before = conv.clone();

    let err = send(&DownProvider, &mut conv, None, None)
        .await
        .expect_err("provider is down");

    assert!(matches!(err, ProviderError::Unavailable(_)));
    assert_eq!(conv, before);
}

#[tokio::test(start_paused = true)]
async fn send_times_out() {
    let mut conv = Conversation::new(None);
    conv.push_user("ping");

    let err = send(&SlowProvider, &mut conv, None, Some(Duration::from_secs(5)))
        .await
        .expect_err("should time out");

    assert!(matches!(err, ProviderError::Timeout(d) if d == Duration::from_secs(5)));
    assert!(conv.last_reply().is_none());
}

#[test]
fn provider_string_parsing() {
    let (provider, model) = parse_provider_string("ollama/qwen3:4b").expect("valid");
    assert_eq!(provider, "ollama");
    assert_eq!(model, "qwen3:4b");

    assert!(parse_provider_string("qwen3").is_err());
    assert!(parse_provider_string("/model").is_err());
    assert!(parse_provider_string("ollama/").is_err());
}
