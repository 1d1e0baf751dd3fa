use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Tutoring persona the backend is asked to adopt for a conversation.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Balanced,
    Study,
    Professor,
    Socratic,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Balanced => "balanced",
            Mode::Study => "study",
            Mode::Professor => "professor",
            Mode::Socratic => "socratic",
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "balanced" => Ok(Mode::Balanced),
            "study" => Ok(Mode::Study),
            "professor" => Ok(Mode::Professor),
            "socratic" => Ok(Mode::Socratic),
            other => Err(format!("unknown mode '{other}'")),
        }
    }
}

/// Self-reported (or backend-detected) familiarity of the user with the course
/// material. The Professor flow sends it with each turn and the backend may
/// override it via a tag in the response text.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ExpertiseLevel {
    Novice,
    Intermediate,
    Expert,
}

impl ExpertiseLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpertiseLevel::Novice => "Novice",
            ExpertiseLevel::Intermediate => "Intermediate",
            ExpertiseLevel::Expert => "Expert",
        }
    }

    /// Case-insensitive parse, matching how the tag is scraped from response
    /// text.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "novice" => Some(ExpertiseLevel::Novice),
            "intermediate" => Some(ExpertiseLevel::Intermediate),
            "expert" => Some(ExpertiseLevel::Expert),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct SourceMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

/// A citation attached to an assistant response, pointing at retrieved course
/// material. Immutable once received.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Source {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SourceMetadata>,
}

impl Source {
    /// Display identity: two sources with the same `(title, class_name)` are
    /// shown once.
    pub fn dedup_key(&self) -> (Option<&str>, Option<&str>) {
        let meta = self.metadata.as_ref();
        (
            meta.and_then(|m| m.title.as_deref()),
            meta.and_then(|m| m.class_name.as_deref()),
        )
    }
}

/// Conversation metadata as held by the persistence layer. The chat core never
/// mutates these fields itself; it only appends messages and lets the store
/// touch `updated_at_ms`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub class_id: String,
    pub mode: Mode,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub archived: bool,
    pub updated_at_ms: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewConversation {
    pub title: String,
    pub class_id: String,
    pub mode: Mode,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Source>>,
    pub created_at_ms: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub sources: Option<Vec<Source>>,
}

/// UI-visible view of the in-flight assistant message. Each content delta
/// replaces the previously displayed snapshot; it never appends to it.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftSnapshot {
    pub content: String,
    pub sources: Vec<Source>,
}

/// Everything a finished turn produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub conversation: Conversation,
    pub user_message: StoredMessage,
    pub assistant_message: StoredMessage,
    /// Level the backend set via a response tag, if any.
    pub detected_level: Option<ExpertiseLevel>,
    /// Topic the backend asked to calibrate on, if any.
    pub calibration_topic: Option<String>,
}
