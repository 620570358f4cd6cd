//! Domain parsing over a caller-owned conversation.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;

use mailvault::classifier::Domain;
use mailvault::config::WorkflowConfig;
use mailvault::domain_parser::{DomainParseError, DomainParser, DomainRecord};
use mailvault::email::{EmailAddress, EmailInput};
use mailvault::providers::{
    CompletionRequest, CompletionResponse, LlmProvider, ProviderError, Role, StopReason,
    UsageStats,
};

/// Replays canned replies in order and records every request.
struct QueueProvider {
    replies: Mutex<Vec<String>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl QueueProvider {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().rev().map(|r| (*r).to_owned()).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().expect("lock").clone()
    }
}

#[async_trait]
impl LlmProvider for QueueProvider {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        self.requests.lock().expect("lock").push(request);
        let text = self
            .replies
            .lock()
            .expect("lock")
            .pop()
            .ok_or_else(|| ProviderError::Unavailable("no more replies".to_owned()))?;
        Ok(CompletionResponse {
            text,
            stop_reason: StopReason::EndTurn,
            usage: UsageStats::default(),
            model: "mock".to_owned(),
        })
    }

    fn model_id(&self) -> &str {
        "mock/queue"
    }
}

/// Never answers.
struct StalledProvider;

#[async_trait]
impl LlmProvider for StalledProvider {
    async fn complete(
        &self,
        _request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        std::future::pending().await
    }

    fn model_id(&self) -> &str {
        "mock/stalled"
    }
}

fn email(subject: &str, body: &str) -> EmailInput {
    EmailInput::new(
        EmailAddress::new("frontdesk@clinic.example", Some("Riverside Clinic")).expect("valid"),
        vec![EmailAddress::new("patient@example.com", None).expect("valid")],
        subject,
        body,
        DateTime::parse_from_rfc3339("2024-06-01T09:00:00Z").expect("valid timestamp"),
    )
}

const APPOINTMENT_REPLY: &str = r#"{"results": [
    {"ExtractedAppointment": {"date": "2024-06-03", "provider": "Dr. Patel", "location": "Riverside Clinic"}},
    {"ExtractedDoctor": {"doctor_name": "Dr. Patel", "type": "Cardiology"}}
]}"#;

const BILL_REPLY: &str =
    r#"{"results": [{"ExtractedBill": {"amount": 40.0, "due_date": "2024-06-30", "vendor": "Riverside Clinic"}}]}"#;

#[tokio::test]
async fn message_is_parsed_into_records() {
    let provider = Arc::new(QueueProvider::new(&[APPOINTMENT_REPLY]));
    let parser = DomainParser::new(provider.clone());
    let mut conversation = DomainParser::conversation();
    let message = email("Appointment", "See Dr. Patel (cardiology) on June 3.");

    let records = parser
        .parse_email(&mut conversation, &message, Domain::Medical)
        .await
        .expect("should parse");

    assert_eq!(records.len(), 2);
    assert!(matches!(&records[0], DomainRecord::Appointment(a) if a.date == "2024-06-03"));
    assert!(matches!(&records[1], DomainRecord::Doctor(d) if d.kind.as_deref() == Some("Cardiology")));

    let roles: Vec<Role> = conversation.messages().iter().map(|m| m.role).collect();
    assert_eq!(roles, [Role::Assistant, Role::User, Role::Assistant]);
    assert!(conversation.messages()[0].content.contains("ExtractedMedication:"));
    assert_eq!(conversation.messages()[1].content, message.to_text());
    assert_eq!(conversation.last_reply(), Some(APPOINTMENT_REPLY));
    assert!(conversation.system().is_some_and(|s| s.contains("results")));
}

#[tokio::test]
async fn later_messages_see_earlier_turns() {
    let provider = Arc::new(QueueProvider::new(&[APPOINTMENT_REPLY, BILL_REPLY]));
    let parser = DomainParser::new(provider.clone());
    let mut conversation = DomainParser::conversation();

    parser
        .parse_email(&mut conversation, &email("Appointment", "June 3 with Dr. Patel."), Domain::Medical)
        .await
        .expect("first message");
    let records = parser
        .parse_email(&mut conversation, &email("Invoice", "You owe $40 by June 30."), Domain::Personal)
        .await
        .expect("second message");
    assert!(matches!(&records[0], DomainRecord::Bill(b) if b.vendor == "Riverside Clinic"));

    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].messages.len(), 2);
    assert_eq!(requests[1].messages.len(), 5);
    assert_eq!(requests[1].messages[2].content, APPOINTMENT_REPLY);
    assert!(requests[1].messages[3].content.contains("personal domain"));
    assert!(!requests[1].messages[3].content.contains("ExtractedDoctor:"));
    assert_eq!(conversation.messages().len(), 6);
}

#[tokio::test]
async fn malformed_reply_is_an_error() {
    let provider = Arc::new(QueueProvider::new(&[r#"{"appointments": []}"#]));
    let parser = DomainParser::new(provider);
    let mut conversation = DomainParser::conversation();

    let err = parser
        .parse_email(&mut conversation, &email("Hello", "Just saying hi."), Domain::Other)
        .await
        .expect_err("no results key");
    assert!(matches!(err, DomainParseError::MissingResults));
    // The reply is still part of the session.
    assert_eq!(conversation.last_reply(), Some(r#"{"appointments": []}"#));
}

#[tokio::test]
async fn engine_failure_is_reported() {
    let provider = Arc::new(QueueProvider::new(&[]));
    let parser = DomainParser::new(provider);
    let mut conversation = DomainParser::conversation();

    let err = parser
        .parse_email(&mut conversation, &email("Hello", "Just saying hi."), Domain::Legal)
        .await
        .expect_err("engine has no reply");
    assert!(matches!(err, DomainParseError::Provider(ProviderError::Unavailable(_))));
    assert_eq!(conversation.last_reply().map(|r| r.contains("legal domain")), Some(true));
}

#[tokio::test(start_paused = true)]
async fn configured_deadline_applies() {
    let config = WorkflowConfig {
        request_timeout_secs: Some(5),
        ..WorkflowConfig::default()
    };
    let parser = DomainParser::with_config(Arc::new(StalledProvider), &config);
    let mut conversation = DomainParser::conversation();

    let err = parser
        .parse_email(&mut conversation, &email("Hello", "Just saying hi."), Domain::Education)
        .await
        .expect_err("should time out");
    assert!(matches!(
        err,
        DomainParseError::Provider(ProviderError::Timeout(limit)) if limit == Duration::from_secs(5)
    ));
}
