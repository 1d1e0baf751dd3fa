//! Pure helpers for the conversation history listing.

use chrono::{DateTime, Utc};

use crate::model::Conversation;

/// Sidebar ordering: archived conversations are hidden, pinned ones float to
/// the top, everything else is most-recently-updated first.
pub fn sidebar_order(mut conversations: Vec<Conversation>) -> Vec<Conversation> {
    conversations.retain(|c| !c.archived);
    conversations.sort_by(|a, b| {
        b.pinned
            .cmp(&a.pinned)
            .then(b.updated_at_ms.cmp(&a.updated_at_ms))
    });
    conversations
}

/// Human label for a conversation's last activity, relative to `now_ms`.
pub fn relative_label(now_ms: i64, then_ms: i64) -> String {
    const DAY_MS: i64 = 24 * 60 * 60 * 1000;
    let diff_days = (now_ms - then_ms).max(0) / DAY_MS;
    match diff_days {
        0 => "Today".to_string(),
        1 => "Yesterday".to_string(),
        d if d < 7 => format!("{d} days ago"),
        _ => DateTime::<Utc>::from_timestamp_millis(then_ms)
            .map(|dt| dt.format("%b %-d, %Y").to_string())
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Mode;

    fn conv(id: &str, updated_at_ms: i64, pinned: bool, archived: bool) -> Conversation {
        Conversation {
            id: id.to_string(),
            title: id.to_string(),
            class_id: "cs101".to_string(),
            mode: Mode::Balanced,
            pinned,
            archived,
            updated_at_ms,
        }
    }

    #[test]
    fn recent_first_with_pinned_on_top() {
        let ordered = sidebar_order(vec![
            conv("old", 100, false, false),
            conv("new", 300, false, false),
            conv("pinned-old", 50, true, false),
            conv("mid", 200, false, false),
        ]);
        let ids: Vec<&str> = ordered.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["pinned-old", "new", "mid", "old"]);
    }

    #[test]
    fn archived_conversations_are_hidden() {
        let ordered = sidebar_order(vec![
            conv("keep", 100, false, false),
            conv("gone", 200, false, true),
        ]);
        assert_eq!(ordered.len(), 1);
        assert_eq!(ordered[0].id, "keep");
    }

    #[test]
    fn relative_labels() {
        const DAY_MS: i64 = 24 * 60 * 60 * 1000;
        let now = 1_700_000_000_000;
        assert_eq!(relative_label(now, now), "Today");
        assert_eq!(relative_label(now, now - DAY_MS), "Yesterday");
        assert_eq!(relative_label(now, now - 3 * DAY_MS), "3 days ago");
        // Beyond a week: absolute date. 2023-11-14 minus 10 days.
        assert_eq!(relative_label(now, now - 10 * DAY_MS), "Nov 4, 2023");
    }

    #[test]
    fn future_timestamps_clamp_to_today() {
        let now = 1_700_000_000_000;
        assert_eq!(relative_label(now, now + 5_000), "Today");
    }
}
