//! Domain classifier tests with a deterministic keyword embedder.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::DateTime;

use mailvault::classifier::{process_email_to_vault, ClassifierError, Domain, DomainClassifier};
use mailvault::email::{EmailAddress, EmailInput};
use mailvault::embedding::{Embedder, EmbedderError};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// One dimension per keyword group; each component counts keyword hits.
const KEYWORD_GROUPS: &[&[&str]] = &[
    &["school", "student", "tuition"],
    &["doctor", "appointment", "prescription", "clinic"],
    &["attorney", "court", "contract", "lawyer"],
    &["family", "friend", "birthday"],
    &["newsletter", "notification", "alert"],
];

#[derive(Default)]
struct KeywordEmbedder {
    calls: AtomicUsize,
    batch_sizes: Mutex<Vec<usize>>,
}

fn keyword_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    KEYWORD_GROUPS
        .iter()
        .map(|group| {
            let hits: usize = group.iter().map(|k| lower.matches(k).count()).sum();
            f32::from(u16::try_from(hits).unwrap_or(u16::MAX))
        })
        .collect()
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.batch_sizes
            .lock()
            .expect("lock should not be poisoned")
            .push(texts.len());
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }

    fn dimensions(&self) -> usize {
        KEYWORD_GROUPS.len()
    }
}

/// Succeeds for the prototypes, then fails every later call.
#[derive(Default)]
struct FlakyEmbedder {
    calls: AtomicUsize,
}

#[async_trait]
impl Embedder for FlakyEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Ok(texts.iter().map(|t| keyword_vector(t)).collect());
        }
        Err(EmbedderError::Unavailable("model unloaded".to_owned()))
    }

    fn dimensions(&self) -> usize {
        KEYWORD_GROUPS.len()
    }
}

/// Drops the last vector of every batch.
struct ShortEmbedder;

#[async_trait]
impl Embedder for ShortEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let mut vectors: Vec<Vec<f32>> = texts.iter().map(|t| keyword_vector(t)).collect();
        vectors.pop();
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        KEYWORD_GROUPS.len()
    }
}

fn email(subject: &str, body: &str) -> EmailInput {
    EmailInput::new(
        EmailAddress::new("sender@example.com", None).expect("valid sender"),
        vec![EmailAddress::new("me@example.com", None).expect("valid recipient")],
        subject,
        body,
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z").expect("valid timestamp"),
    )
}

fn assert_confidence_is_max(result: &mailvault::classifier::ClassificationResult) {
    let max = result
        .all_scores
        .values()
        .copied()
        .fold(f32::NEG_INFINITY, f32::max);
    assert_eq!(result.confidence, max);
    assert_eq!(result.all_scores.get(&result.category), Some(&max));
    for score in result.all_scores.values() {
        assert!((-1.0..=1.0).contains(score));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn construction_embeds_prototypes_once() {
    let embedder = Arc::new(KeywordEmbedder::default());
    let classifier = DomainClassifier::new(embedder.clone())
        .await
        .expect("classifier should build");

    assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    assert_eq!(classifier.categories(), &Domain::ALL);
    assert_eq!(classifier.category_matrix().len(), 5);
}

#[tokio::test]
async fn empty_batch_skips_embedder() {
    let embedder = Arc::new(KeywordEmbedder::default());
    let classifier = DomainClassifier::new(embedder.clone())
        .await
        .expect("classifier should build");

    let results = classifier.classify(&[]).await.expect("should classify");
    assert!(results.is_empty());
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 1, "only the prototype call");
}

#[tokio::test]
async fn batch_uses_one_call_and_preserves_order() {
    let embedder = Arc::new(KeywordEmbedder::default());
    let classifier = DomainClassifier::new(embedder.clone())
        .await
        .expect("classifier should build");

    let emails = vec![
        email("Court date", "Your attorney sent the contract."),
        email("Checkup", "Doctor appointment and a new prescription."),
        email("Party", "Family birthday this weekend, bring a friend."),
        email("Semester", "Student tuition is due at school."),
    ];
    let results = classifier.classify(&emails).await.expect("should classify");

    assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        *embedder.batch_sizes.lock().expect("lock"),
        vec![5, 4],
        "prototypes then one batch for all emails"
    );

    let categories: Vec<Domain> = results.iter().map(|r| r.category).collect();
    assert_eq!(
        categories,
        vec![Domain::Legal, Domain::Medical, Domain::Personal, Domain::Education]
    );
    for result in &results {
        assert_confidence_is_max(result);
        assert_eq!(result.all_scores.len(), 5);
    }
}

#[tokio::test]
async fn ties_go_to_first_declared_category() {
    let classifier = DomainClassifier::new(Arc::new(KeywordEmbedder::default()))
        .await
        .expect("classifier should build");

    // No keywords: zero vector, every score is 0.0.
    let results = classifier
        .classify(&[email("Hello", "Nothing to see here.")])
        .await
        .expect("should classify");
    assert_eq!(results[0].category, Domain::Education);
    assert_eq!(results[0].confidence, 0.0);
    assert_confidence_is_max(&results[0]);
}

#[tokio::test]
async fn custom_categories_keep_declaration_order() {
    let classifier = DomainClassifier::with_categories(
        Arc::new(KeywordEmbedder::default()),
        vec![
            (Domain::Other, "doctor clinic".to_owned()),
            (Domain::Medical, "doctor clinic".to_owned()),
        ],
    )
    .await
    .expect("classifier should build");

    let results = classifier
        .classify(&[email("Visit", "See the doctor")])
        .await
        .expect("should classify");
    assert_eq!(results[0].category, Domain::Other);
    assert_eq!(results[0].all_scores.len(), 2);
}

#[tokio::test]
async fn rejects_empty_and_duplicate_categories() {
    let empty =
        DomainClassifier::with_categories(Arc::new(KeywordEmbedder::default()), vec![]).await;
    assert!(matches!(empty, Err(ClassifierError::NoCategories)));

    let duplicate = DomainClassifier::with_categories(
        Arc::new(KeywordEmbedder::default()),
        vec![
            (Domain::Legal, "court".to_owned()),
            (Domain::Legal, "contract".to_owned()),
        ],
    )
    .await;
    assert!(matches!(
        duplicate,
        Err(ClassifierError::DuplicateCategory(Domain::Legal))
    ));
}

#[tokio::test]
async fn embedding_failure_fails_whole_batch() {
    let classifier = DomainClassifier::new(Arc::new(FlakyEmbedder::default()))
        .await
        .expect("prototype call succeeds");

    let result = classifier
        .classify(&[email("a", "doctor"), email("b", "court")])
        .await;
    assert!(matches!(result, Err(ClassifierError::Embedding(_))));
}

#[tokio::test]
async fn row_count_mismatch_is_an_error() {
    let result = DomainClassifier::new(Arc::new(ShortEmbedder)).await;
    assert!(matches!(
        result,
        Err(ClassifierError::RowCountMismatch {
            expected: 5,
            actual: 4
        })
    ));
}

#[tokio::test]
async fn process_email_to_vault_labels_payload_with_category() {
    let classifier = DomainClassifier::new(Arc::new(KeywordEmbedder::default()))
        .await
        .expect("classifier should build");
    let message = email("Results", "Your doctor shared lab results at the clinic.");

    let (classification, stored) = process_email_to_vault(&message, &classifier)
        .await
        .expect("should process");

    assert_eq!(classification.category, Domain::Medical);
    assert_eq!(stored.vault_type, "medical");
    assert!(stored.errors.is_empty());
    assert_eq!(
        stored.data.get("subject").and_then(|v| v.as_str()),
        Some("Results")
    );
}

#[test]
fn classification_result_serializes_lowercase_names() {
    let result = mailvault::classifier::ClassificationResult {
        category: Domain::Legal,
        confidence: 0.5,
        all_scores: [(Domain::Legal, 0.5), (Domain::Other, 0.25)]
            .into_iter()
            .collect(),
    };
    let value = serde_json::to_value(&result).expect("should serialize");
    assert_eq!(value["category"], "legal");
    assert_eq!(value["all_scores"]["other"], 0.25);
}
