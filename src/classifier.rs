//! Semantic domain classifier.
//!
//! Each category is described by a short prototype text. The prototypes are
//! embedded once when the classifier is built; classifying a batch of emails
//! costs exactly one further embedding call, after which every email vector
//! is scored against every prototype by cosine similarity.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::email::EmailInput;
use crate::embedding::{Embedder, EmbedderError};
use crate::vault::{add_email_to_vault, VaultAddResult};

/// Coarse domain vocabulary used by the embedding classifier.
///
/// Independent of [`crate::vault::VaultType`]; the two are never converted
/// into each other. Variant order is declaration order and decides ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    /// Schools, universities, transcripts, enrollment.
    Education,
    /// Providers, appointments, prescriptions, results.
    Medical,
    /// Attorneys, contracts, deeds, court documents.
    Legal,
    /// Family, friends, personal correspondence.
    Personal,
    /// Newsletters, notifications, everything else.
    Other,
}

impl Domain {
    /// All domains in declaration order.
    pub const ALL: [Domain; 5] = [
        Domain::Education,
        Domain::Medical,
        Domain::Legal,
        Domain::Personal,
        Domain::Other,
    ];

    /// Lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Education => "education",
            Self::Medical => "medical",
            Self::Legal => "legal",
            Self::Personal => "personal",
            Self::Other => "other",
        }
    }

    /// Default prototype text embedded for this domain.
    pub fn description(self) -> &'static str {
        match self {
            Self::Education => {
                "Educational institutions, universities, colleges, schools, \
                 academic courses, degrees, diplomas, certifications, transcripts, \
                 student records, enrollment, tuition, learning platforms, \
                 educational materials, professors, academic advisors"
            }
            Self::Medical => {
                "Healthcare providers, doctors, physicians, hospitals, clinics, \
                 medical appointments, prescriptions, medications, health insurance, \
                 lab results, test results, medical records, patient portal, \
                 wellness programs, vaccines, treatments, diagnoses"
            }
            Self::Legal => {
                "Legal services, attorneys, lawyers, law firms, court documents, \
                 contracts, agreements, property deeds, titles, wills, trusts, \
                 legal notices, compliance, regulatory matters, litigation, \
                 legal counsel, notary, patents, trademarks"
            }
            Self::Personal => {
                "Personal correspondence, family members, friends, relatives, \
                 personal interests, hobbies, leisure activities, personal projects, \
                 casual communication, catch-ups, personal updates, birthday wishes, \
                 personal invitations, private matters"
            }
            Self::Other => {
                "General correspondence, miscellaneous emails, newsletters, \
                 notifications, automated messages, system alerts, \
                 uncategorized content that doesn't fit specific categories"
            }
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = ClassifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|d| d.as_str() == wanted)
            .ok_or_else(|| ClassifierError::UnknownCategory(s.to_owned()))
    }
}

/// Classifier errors. Embedding failures are fatal for the whole batch.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    /// The embedding capability failed.
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedderError),
    /// A classifier needs at least one category.
    #[error("classifier requires at least one category")]
    NoCategories,
    /// The same category was declared twice.
    #[error("category {0} declared more than once")]
    DuplicateCategory(Domain),
    /// The embedder returned a different number of vectors than inputs.
    #[error("embedder returned {actual} vectors for {expected} inputs")]
    RowCountMismatch {
        /// Number of inputs sent.
        expected: usize,
        /// Number of vectors received.
        actual: usize,
    },
    /// A category name did not match the vocabulary.
    #[error("unknown category {0:?}")]
    UnknownCategory(String),
}

/// Result of classifying one email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Best-scoring category (first declared wins ties).
    pub category: Domain,
    /// Score of `category`; always the maximum of `all_scores`.
    pub confidence: f32,
    /// Cosine similarity against every category, in `[-1, 1]`.
    pub all_scores: BTreeMap<Domain, f32>,
}

/// Embedding-based email categorizer.
///
/// The category matrix is computed once in the constructor and only read
/// afterwards, so a classifier can be shared behind an `Arc` freely.
pub struct DomainClassifier {
    embedder: Arc<dyn Embedder>,
    categories: Vec<Domain>,
    matrix: Vec<Vec<f32>>,
}

impl fmt::Debug for DomainClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainClassifier")
            .field("categories", &self.categories)
            .field("dimensions", &self.embedder.dimensions())
            .finish()
    }
}

impl DomainClassifier {
    /// Build a classifier over the five default domains.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifierError::Embedding`] if the prototypes cannot be
    /// embedded.
    pub async fn new(embedder: Arc<dyn Embedder>) -> Result<Self, ClassifierError> {
        let categories = Domain::ALL
            .into_iter()
            .map(|d| (d, d.description().to_owned()))
            .collect();
        Self::with_categories(embedder, categories).await
    }

    /// Build a classifier from explicit `(category, prototype text)` pairs.
    ///
    /// Declaration order is preserved and decides ties.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty or duplicated category set, or when
    /// embedding the prototypes fails.
    pub async fn with_categories(
        embedder: Arc<dyn Embedder>,
        categories: Vec<(Domain, String)>,
    ) -> Result<Self, ClassifierError> {
        if categories.is_empty() {
            return Err(ClassifierError::NoCategories);
        }
        let mut names: Vec<Domain> = Vec::with_capacity(categories.len());
        for (domain, _) in &categories {
            if names.contains(domain) {
                return Err(ClassifierError::DuplicateCategory(*domain));
            }
            names.push(*domain);
        }

        let descriptions: Vec<String> = categories.into_iter().map(|(_, text)| text).collect();
        let matrix = embedder.embed_batch(&descriptions).await?;
        if matrix.len() != names.len() {
            return Err(ClassifierError::RowCountMismatch {
                expected: names.len(),
                actual: matrix.len(),
            });
        }

        info!(categories = names.len(), "domain classifier ready");
        Ok(Self {
            embedder,
            categories: names,
            matrix,
        })
    }

    /// Categories in declaration order.
    pub fn categories(&self) -> &[Domain] {
        &self.categories
    }

    /// The cached prototype embeddings, one row per category.
    pub fn category_matrix(&self) -> &[Vec<f32>] {
        &self.matrix
    }

    /// Classify a batch of emails with a single embedding call.
    ///
    /// Output order matches input order. An empty batch returns immediately
    /// without touching the embedder.
    ///
    /// # Errors
    ///
    /// Any embedding failure fails the whole batch; no partial results.
    pub async fn classify(
        &self,
        emails: &[EmailInput],
    ) -> Result<Vec<ClassificationResult>, ClassifierError> {
        if emails.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = emails.iter().map(EmailInput::to_text).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() != emails.len() {
            return Err(ClassifierError::RowCountMismatch {
                expected: emails.len(),
                actual: vectors.len(),
            });
        }

        let results: Vec<ClassificationResult> =
            vectors.iter().map(|v| self.score(v)).collect();
        debug!(count = results.len(), "classified email batch");
        Ok(results)
    }

    fn score(&self, vector: &[f32]) -> ClassificationResult {
        let mut all_scores = BTreeMap::new();
        let mut best: Option<(Domain, f32)> = None;

        for (domain, prototype) in self.categories.iter().zip(&self.matrix) {
            let score = cosine_similarity(vector, prototype);
            all_scores.insert(*domain, score);
            // Strict comparison keeps the first declared category on ties.
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((*domain, score));
            }
        }

        let (category, confidence) = best.unwrap_or((Domain::Other, 0.0));
        ClassificationResult {
            category,
            confidence,
            all_scores,
        }
    }
}

/// Cosine similarity of two vectors; `0.0` for mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Classify one email and build its vault payload under the predicted
/// category name.
///
/// # Errors
///
/// Returns an error if classification fails.
pub async fn process_email_to_vault(
    email: &EmailInput,
    classifier: &DomainClassifier,
) -> anyhow::Result<(ClassificationResult, VaultAddResult)> {
    let classification = classifier
        .classify(std::slice::from_ref(email))
        .await
        .context("failed to classify email")?
        .into_iter()
        .next()
        .context("classifier returned no result")?;

    let vault_result = add_email_to_vault(email, classification.category.as_str());
    Ok((classification, vault_result))
}
