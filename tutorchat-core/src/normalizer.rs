use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::model::ExpertiseLevel;

/// Clean user-entered text before it is sent or persisted:
/// Unicode NFC normalization + BOM strip + CRLF -> LF + trim.
pub fn clean_outgoing(s: &str) -> String {
    let mut t = s.nfc().collect::<String>();
    if t.starts_with('\u{FEFF}') {
        t.remove(0);
    }
    if t.contains("\r\n") {
        t = t.replace("\r\n", "\n");
    }
    t.trim().to_string()
}

/// Conversation title from the first user message: first 50 characters plus
/// an ellipsis when truncated.
pub fn derive_title(first_message: &str) -> String {
    let mut chars = first_message.chars();
    let head: String = chars.by_ref().take(50).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

// Expertise level the backend sets inline, e.g. "USER LEVEL SET: [Expert]".
static LEVEL_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)USER LEVEL SET:\s*\[?(Novice|Intermediate|Expert)\]?").unwrap());

// Inline calibration request, e.g. `CALIBRATION_REQUEST: {"topic":"heaps"}`.
static CALIBRATION_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"CALIBRATION_REQUEST:\s*(\{[^}]+\})").unwrap());

/// Assistant text with backend control tags removed, plus whatever the tags
/// carried.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedResponse {
    pub content: String,
    pub detected_level: Option<ExpertiseLevel>,
    pub calibration_topic: Option<String>,
}

/// Strip the expertise-level and calibration tags from a finalized assistant
/// response so the stored content is clean. Both tags are removed whether or
/// not their payload is usable; the calibration topic is only reported when
/// its JSON parses.
pub fn strip_response_tags(content: &str) -> CleanedResponse {
    let detected_level = LEVEL_TAG
        .captures(content)
        .and_then(|c| c.get(1))
        .and_then(|m| ExpertiseLevel::parse(m.as_str()));
    let calibration_topic = CALIBRATION_TAG
        .captures(content)
        .and_then(|c| c.get(1))
        .and_then(|m| serde_json::from_str::<serde_json::Value>(m.as_str()).ok())
        .and_then(|v| v.get("topic").and_then(|t| t.as_str()).map(str::to_string));

    let without_level = LEVEL_TAG.replace_all(content, "");
    let without_both = CALIBRATION_TAG.replace_all(&without_level, "");
    CleanedResponse {
        content: without_both.trim().to_string(),
        detected_level,
        calibration_topic,
    }
}
