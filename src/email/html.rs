//! Plain-text extraction for HTML email bodies.
//!
//! Deliberately simple: strip non-content blocks and tags, decode the
//! handful of entities mail clients actually emit, collapse whitespace.

use std::sync::OnceLock;

use regex::Regex;

/// Blocks whose content is never user-visible text.
const SKIPPED_BLOCKS: &[&str] = &[
    r"(?is)<script\b.*?</script\s*>",
    r"(?is)<style\b.*?</style\s*>",
    r"(?is)<head\b.*?</head\s*>",
];

const TAG_PATTERN: &str = r"(?s)<[^>]*>";

const ENTITIES: &[(&str, &str)] = &[
    ("&nbsp;", " "),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&apos;", "'"),
    ("&amp;", "&"),
];

fn block_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        SKIPPED_BLOCKS
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect()
    })
}

fn tag_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(TAG_PATTERN).ok()).as_ref()
}

/// Whether a body should be treated as HTML.
pub fn looks_like_html(body: &str) -> bool {
    let lower = body.to_lowercase();
    lower.contains("<html") || lower.contains("<body") || lower.contains("<div")
}

/// Extract plain text from an email body.
///
/// HTML bodies are reduced to their visible text on a single line;
/// plain-text bodies are only trimmed.
pub fn extract_text_content(body: &str) -> String {
    if body.is_empty() {
        return String::new();
    }
    if !looks_like_html(body) {
        return body.trim().to_owned();
    }

    let mut text = body.to_owned();
    for pattern in block_patterns() {
        text = pattern.replace_all(&text, " ").into_owned();
    }
    if let Some(tags) = tag_pattern() {
        text = tags.replace_all(&text, " ").into_owned();
    }
    // `&amp;` is decoded last so `&amp;lt;` stays a literal `&lt;`.
    for (entity, replacement) in ENTITIES {
        text = text.replace(entity, replacement);
    }

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
