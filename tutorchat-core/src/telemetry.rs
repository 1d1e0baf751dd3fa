//! Turn-level telemetry.
//! By default, nothing is emitted unless a sink is installed via
//! `set_telemetry_sink`.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

/// Implement this to receive telemetry events.
///
/// Requirements:
/// - Implementations must be thread-safe (`Send + Sync`) and `'static`.
/// - `record_turn` **may** be called from any thread; implementations should
///   avoid panicking.
/// - Keep overhead minimal; this runs at the end of every turn.
pub trait TelemetrySink: Send + Sync + 'static {
    fn record_turn(&self, log: TurnLog);
}

static TELEMETRY_SINK: OnceCell<Arc<dyn TelemetrySink>> = OnceCell::new();

// In tests, gate emission to only the calling test thread to avoid cross-test
// interference.
#[cfg(test)]
thread_local! {
    static TEST_CAPTURE: std::cell::Cell<bool> = const { std::cell::Cell::new(false) };
}

/// Install a global telemetry sink. Returns `false` if a sink is already
/// installed.
///
/// This is a write-once global for the process lifetime (backed by
/// `OnceCell`). If you need to clear captured data in tests, clear it in your
/// sink implementation.
pub fn set_telemetry_sink(sink: Arc<dyn TelemetrySink>) -> bool {
    TELEMETRY_SINK.set(sink).is_ok()
}

/// Emit a turn record if a sink is installed. Crate-visible by design.
#[inline]
pub(crate) fn emit_turn(log: TurnLog) {
    #[cfg(test)]
    {
        if !TEST_CAPTURE.with(|c| c.get()) {
            return;
        }
    }
    if let Some(sink) = TELEMETRY_SINK.get() {
        sink.record_turn(log);
    }
}

#[cfg(test)]
/// Test-only helper: enable or disable capture for the current test thread.
pub fn test_set_capture_enabled(enabled: bool) {
    TEST_CAPTURE.with(|c| c.set(enabled));
}

/// One record per finished turn, success or failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TurnLog {
    /// Flow name, e.g. "tutor", "professor".
    pub flow: Option<String>,

    /// Conversation the turn was persisted into, when one exists.
    pub conversation_id: Option<String>,

    /// Caller-supplied session correlation id.
    pub session_id: Option<String>,

    /// Submit-to-finish time in milliseconds.
    pub latency_ms: Option<u64>,

    /// Characters of persisted assistant text.
    pub content_chars: Option<u32>,

    /// Citations attached to the persisted message.
    pub source_count: Option<u32>,

    /// "persisted" on success, otherwise the error kind.
    pub outcome: Option<String>,
}

impl TurnLog {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn flow(mut self, flow: &str) -> Self {
        self.flow = Some(flow.to_string());
        self
    }
    pub fn conversation_id_opt(mut self, id: Option<&str>) -> Self {
        self.conversation_id = id.map(str::to_string);
        self
    }
    pub fn session_id(mut self, id: &str) -> Self {
        self.session_id = Some(id.to_string());
        self
    }
    pub fn latency_ms(mut self, ms: u64) -> Self {
        self.latency_ms = Some(ms);
        self
    }
    pub fn content_chars(mut self, chars: u32) -> Self {
        self.content_chars = Some(chars);
        self
    }
    pub fn source_count(mut self, count: u32) -> Self {
        self.source_count = Some(count);
        self
    }
    pub fn outcome(mut self, outcome: &str) -> Self {
        self.outcome = Some(outcome.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;
    use std::sync::Mutex;

    static CAPTURED: Lazy<Mutex<Vec<TurnLog>>> = Lazy::new(|| Mutex::new(Vec::new()));

    struct TestSink;
    impl TelemetrySink for TestSink {
        fn record_turn(&self, log: TurnLog) {
            CAPTURED.lock().unwrap().push(log);
        }
    }

    #[test]
    fn emit_reaches_installed_sink_when_capture_enabled() {
        let _ = set_telemetry_sink(Arc::new(TestSink));
        test_set_capture_enabled(true);
        CAPTURED.lock().unwrap().clear();

        emit_turn(
            TurnLog::new()
                .flow("tutor")
                .session_id("s-1")
                .latency_ms(42)
                .outcome("persisted"),
        );

        let logs = CAPTURED.lock().unwrap().clone();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].flow.as_deref(), Some("tutor"));
        assert_eq!(logs[0].outcome.as_deref(), Some("persisted"));
        test_set_capture_enabled(false);
    }

    #[test]
    fn builder_fills_all_fields() {
        let log = TurnLog::new()
            .flow("professor")
            .conversation_id_opt(Some("c-1"))
            .session_id("s-2")
            .latency_ms(7)
            .content_chars(120)
            .source_count(3)
            .outcome("empty_content");
        assert_eq!(log.conversation_id.as_deref(), Some("c-1"));
        assert_eq!(log.content_chars, Some(120));
        assert_eq!(log.source_count, Some(3));
    }
}
