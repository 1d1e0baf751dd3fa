//! Folds stream events into the single in-flight assistant message.
//!
//! Contract:
//! - `accumulated` text only ever grows; no event shrinks or reorders it.
//! - `sources` is write-once: the first non-empty payload wins, later ones
//!   are dropped.
//! - An `ErrorSignal` aborts the fold; nothing from the draft survives it.
//! - Finalizing a draft whose text is whitespace-only is the distinct
//!   "no content" failure.

use crate::error::{CoreResult, TutorChatError};
use crate::model::{DraftSnapshot, Source};
use crate::sse::StreamEvent;

/// What applying one event tells the drive loop to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Keep reading. `true` when the visible snapshot changed.
    Continue(bool),
    /// Explicit terminator seen; stop reading and finalize.
    Done,
}

/// Mutable accumulator owned by exactly one in-flight turn.
#[derive(Debug, Default)]
pub struct MessageDraft {
    accumulated: String,
    sources: Vec<Source>,
}

impl MessageDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: StreamEvent) -> CoreResult<Step> {
        match event {
            StreamEvent::ContentDelta(text) => {
                self.accumulated.push_str(&text);
                Ok(Step::Continue(true))
            }
            StreamEvent::SourcesPayload(sources) => {
                if self.sources.is_empty() {
                    self.sources = sources;
                    Ok(Step::Continue(true))
                } else {
                    Ok(Step::Continue(false))
                }
            }
            StreamEvent::ErrorSignal(message) => Err(TutorChatError::Stream { message }),
            StreamEvent::StreamEnd => Ok(Step::Done),
            StreamEvent::Ignorable => Ok(Step::Continue(false)),
        }
    }

    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    pub fn has_content(&self) -> bool {
        !self.accumulated.trim().is_empty()
    }

    /// Current UI-visible state. Sources are de-duplicated for display only;
    /// the draft keeps the originals.
    pub fn snapshot(&self) -> DraftSnapshot {
        DraftSnapshot {
            content: self.accumulated.clone(),
            sources: dedup_sources(&self.sources),
        }
    }

    /// Consume the draft at end of stream. Whitespace-only text means the
    /// backend sent nothing usable.
    pub fn finalize(self) -> CoreResult<FinalDraft> {
        if self.accumulated.trim().is_empty() {
            return Err(TutorChatError::EmptyContent);
        }
        Ok(FinalDraft {
            content: self.accumulated,
            sources: self.sources,
        })
    }
}

/// The draft after a successful stream, ready for persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalDraft {
    pub content: String,
    pub sources: Vec<Source>,
}

/// Collapse duplicate citations by `(title, class_name)`, keeping first
/// occurrence order.
pub fn dedup_sources(sources: &[Source]) -> Vec<Source> {
    let mut seen: Vec<(Option<&str>, Option<&str>)> = Vec::new();
    let mut out = Vec::new();
    for src in sources {
        let key = src.dedup_key();
        if !seen.contains(&key) {
            seen.push(key);
            out.push(src.clone());
        }
    }
    out
}
