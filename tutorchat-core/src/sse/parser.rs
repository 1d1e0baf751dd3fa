//! Classification of decoded lines into typed stream events.
//!
//! Contract:
//! - Comments (`: ...`), blank lines, and lines without the `data: ` prefix
//!   carry no information and classify as `Ignorable`.
//! - `data: [DONE]` terminates the stream.
//! - Any other `data:` payload must be a JSON object. A payload that fails to
//!   parse is NOT malformed: it was cut at a chunk boundary, and the caller
//!   must re-queue the raw line and retry after the next read. That split is a
//!   first-class outcome (`NeedsMoreData`), not an error.
//! - One payload can yield both a `SourcesPayload` and a `ContentDelta`.

use serde_json::Value;

use crate::model::Source;

/// What one decoded line contributes to the in-flight turn.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A fragment of assistant text to append.
    ContentDelta(String),
    /// Citations for this turn; only the first non-empty payload counts.
    SourcesPayload(Vec<Source>),
    /// Terminal: the backend reported a failure mid-stream.
    ErrorSignal(String),
    /// Terminal: explicit `[DONE]` sentinel.
    StreamEnd,
    /// Keep-alive, comment, blank line, or a payload with nothing we extract.
    Ignorable,
}

impl StreamEvent {
    /// Returns true if this event terminates the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ErrorSignal(_) | Self::StreamEnd)
    }
}

/// Result of classifying one line.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// The line was understood; zero or more events in payload order.
    Parsed(Vec<StreamEvent>),
    /// The JSON payload was split across chunk boundaries. The raw line must
    /// be re-queued in front of the pending bytes and parsed again later.
    NeedsMoreData(String),
}

pub fn parse_line(line: &str) -> ParseOutcome {
    if line.starts_with(':') || line.trim().is_empty() {
        return ParseOutcome::Parsed(vec![StreamEvent::Ignorable]);
    }
    let Some(payload) = line.strip_prefix("data: ") else {
        return ParseOutcome::Parsed(vec![StreamEvent::Ignorable]);
    };
    let payload = payload.trim();
    if payload == "[DONE]" {
        return ParseOutcome::Parsed(vec![StreamEvent::StreamEnd]);
    }

    let value: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(_) => return ParseOutcome::NeedsMoreData(line.to_string()),
    };

    if let Some(msg) = value
        .get("error")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
    {
        return ParseOutcome::Parsed(vec![StreamEvent::ErrorSignal(msg.to_string())]);
    }

    let mut events = Vec::new();
    if let Some(raw) = value
        .get("sources")
        .and_then(Value::as_array)
        .filter(|a| !a.is_empty())
    {
        let sources: Vec<Source> = raw
            .iter()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect();
        if !sources.is_empty() {
            events.push(StreamEvent::SourcesPayload(sources));
        }
    }
    if let Some(text) = extract_content(&value) {
        events.push(StreamEvent::ContentDelta(text));
    }
    if events.is_empty() {
        events.push(StreamEvent::Ignorable);
    }
    ParseOutcome::Parsed(events)
}

/// Content fragment lookup. The precedence is backend-specific and
/// load-bearing; reordering it could silently drop content from a
/// differently-shaped payload.
fn extract_content(value: &Value) -> Option<String> {
    let delta = value
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty());
    let picked = delta
        .or_else(|| {
            value
                .get("content")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
        })
        .or_else(|| {
            value
                .get("text")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
        })?;
    Some(picked.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(line: &str) -> StreamEvent {
        match parse_line(line) {
            ParseOutcome::Parsed(mut evs) => {
                assert_eq!(evs.len(), 1, "expected one event for {line:?}");
                evs.pop().unwrap()
            }
            other => panic!("expected Parsed, got {other:?}"),
        }
    }

    #[test]
    fn comments_blanks_and_foreign_lines_are_ignorable() {
        assert_eq!(single(": keep-alive"), StreamEvent::Ignorable);
        assert_eq!(single(""), StreamEvent::Ignorable);
        assert_eq!(single("   "), StreamEvent::Ignorable);
        assert_eq!(single("event: message"), StreamEvent::Ignorable);
        assert_eq!(single("data:no-space"), StreamEvent::Ignorable);
    }

    #[test]
    fn done_sentinel_terminates() {
        assert_eq!(single("data: [DONE]"), StreamEvent::StreamEnd);
        assert!(single("data: [DONE]").is_terminal());
        // whitespace around the sentinel is tolerated
        assert_eq!(single("data:  [DONE] "), StreamEvent::StreamEnd);
    }

    #[test]
    fn split_json_is_needs_more_data_not_error() {
        let line = "data: {\"content\":\"hel";
        assert_eq!(
            parse_line(line),
            ParseOutcome::NeedsMoreData(line.to_string())
        );
    }

    #[test]
    fn error_field_is_terminal_signal() {
        let ev = single(r#"data: {"error":"boom"}"#);
        assert_eq!(ev, StreamEvent::ErrorSignal("boom".to_string()));
        assert!(ev.is_terminal());
    }

    #[test]
    fn empty_error_field_is_not_a_signal() {
        assert_eq!(single(r#"data: {"error":""}"#), StreamEvent::Ignorable);
    }

    #[test]
    fn content_precedence_choices_then_content_then_text() {
        let ev = single(r#"data: {"choices":[{"delta":{"content":"a"}}],"content":"b","text":"c"}"#);
        assert_eq!(ev, StreamEvent::ContentDelta("a".to_string()));

        let ev = single(r#"data: {"content":"b","text":"c"}"#);
        assert_eq!(ev, StreamEvent::ContentDelta("b".to_string()));

        let ev = single(r#"data: {"text":"c"}"#);
        assert_eq!(ev, StreamEvent::ContentDelta("c".to_string()));
    }

    #[test]
    fn empty_delta_falls_through_to_next_field() {
        let ev = single(r#"data: {"choices":[{"delta":{"content":""}}],"content":"b"}"#);
        assert_eq!(ev, StreamEvent::ContentDelta("b".to_string()));
    }

    #[test]
    fn object_without_content_fields_is_ignorable() {
        assert_eq!(
            single(r#"data: {"choices":[{"finish_reason":"stop"}]}"#),
            StreamEvent::Ignorable
        );
    }

    #[test]
    fn sources_and_content_in_one_payload_yield_two_events() {
        let line = r#"data: {"sources":[{"content":"excerpt","metadata":{"title":"W1"}}],"content":"Hi"}"#;
        match parse_line(line) {
            ParseOutcome::Parsed(evs) => {
                assert_eq!(evs.len(), 2);
                assert!(matches!(&evs[0], StreamEvent::SourcesPayload(s) if s.len() == 1));
                assert_eq!(evs[1], StreamEvent::ContentDelta("Hi".to_string()));
            }
            other => panic!("expected Parsed, got {other:?}"),
        }
    }

    #[test]
    fn empty_sources_array_is_ignorable() {
        assert_eq!(single(r#"data: {"sources":[]}"#), StreamEvent::Ignorable);
    }

    #[test]
    fn reparsing_a_rejoined_split_matches_the_unsplit_event() {
        let full = r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#;
        let unsplit = parse_line(full);
        // Cut at every byte of the payload; each prefix must come back as
        // NeedsMoreData carrying the raw line, and rejoining must reproduce
        // the original event.
        for cut in 7..full.len() {
            let prefix = &full[..cut];
            if !full.is_char_boundary(cut) {
                continue;
            }
            match parse_line(prefix) {
                ParseOutcome::NeedsMoreData(raw) => {
                    let rejoined = format!("{}{}", raw, &full[cut..]);
                    assert_eq!(parse_line(&rejoined), unsplit, "cut at {cut}");
                }
                ParseOutcome::Parsed(evs) => {
                    // Only the full line may parse.
                    assert_eq!(prefix, full, "premature parse at {cut}: {evs:?}");
                }
            }
        }
    }
}
