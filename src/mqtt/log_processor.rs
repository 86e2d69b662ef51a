//! Derives the displayed message list from the raw log.
//!
//! The derivation is a pure function of the log and a [`ViewFilter`], applied
//! in four stages that each preserve the relative order of what survives:
//!
//! 1. topic filter (case-sensitive substring, empty keeps everything)
//! 2. sliding duplicate suppression keyed on topic + payload + retained flag
//! 3. display cap, dropping the oldest entries
//! 4. classification of each surviving entry by protocol message type

use std::collections::HashMap;

use chrono::{DateTime, Duration, Local};

use super::message_manager::LogEntry;
use crate::protocol::{classify, Classification};

pub const DEFAULT_DUPLICATE_WINDOW_MS: i64 = 2000;
pub const DEFAULT_DISPLAY_CAP: usize = 150;

/// Consumer-side view settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewFilter {
    pub topic_filter: String,
    pub suppress_duplicates: bool,
    /// Repeats closer together than this collapse into the first one
    pub duplicate_window: Duration,
    pub display_cap: Option<usize>,
}

impl Default for ViewFilter {
    fn default() -> Self {
        Self {
            topic_filter: String::new(),
            suppress_duplicates: true,
            duplicate_window: Duration::milliseconds(DEFAULT_DUPLICATE_WINDOW_MS),
            display_cap: Some(DEFAULT_DISPLAY_CAP),
        }
    }
}

impl ViewFilter {
    /// Case-sensitive substring match, an empty filter matches every topic.
    pub fn matches_topic(&self, topic: &str) -> bool {
        self.topic_filter.is_empty() || topic.contains(&self.topic_filter)
    }
}

/// Sliding duplicate detector keyed on topic, payload and retained flag.
///
/// Remembers when each key was last kept; a repeat is kept again only once
/// more than `window` has passed since then.
#[derive(Debug, Clone)]
pub struct DuplicateWindow {
    window: Duration,
    last_kept: HashMap<(String, String, bool), DateTime<Local>>,
}

impl DuplicateWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_kept: HashMap::new(),
        }
    }

    /// Returns whether `entry` is kept, recording it when it is.
    pub fn admit(&mut self, entry: &LogEntry) -> bool {
        let key = (
            entry.topic().to_string(),
            entry.raw_payload().to_string(),
            entry.retained(),
        );
        let at = entry.received_at();
        let duplicate = self
            .last_kept
            .get(&key)
            .is_some_and(|previous| at - *previous <= self.window);
        if !duplicate {
            self.last_kept.insert(key, at);
        }
        !duplicate
    }
}

/// A log entry that survived filtering, with its classification.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayedMessage<'a> {
    pub entry: &'a LogEntry,
    pub classification: Classification,
}

impl DisplayedMessage<'_> {
    pub fn render(&self) -> String {
        let retained = if self.entry.retained() { " [retained]" } else { "" };
        let broadcast = match &self.classification {
            Classification::Protocol(message) if message.is_broadcast() => " [broadcast]",
            _ => "",
        };
        format!(
            "{} [{}] {}{}{}\n{}",
            self.entry.received_at().format("%H:%M:%S"),
            self.classification.label(),
            self.entry.topic(),
            broadcast,
            retained,
            self.entry.pretty_payload()
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogView<'a> {
    pub entries: Vec<DisplayedMessage<'a>>,
    /// Raw log length
    pub total: usize,
    /// Entries matching the topic filter
    pub matched: usize,
    pub suppressed_duplicates: usize,
    pub truncated: usize,
}

impl LogView<'_> {
    pub fn summary(&self) -> String {
        let mut summary = format!("{} of {} messages", self.entries.len(), self.total);
        if self.suppressed_duplicates > 0 {
            summary.push_str(&format!(
                " ({} duplicates filtered out)",
                self.suppressed_duplicates
            ));
        }
        if self.truncated > 0 {
            summary.push_str(&format!(" ({} older hidden)", self.truncated));
        }
        summary
    }
}

/// Builds the display list for `log` under `filter`.
pub fn process<'a>(log: &'a [LogEntry], filter: &ViewFilter) -> LogView<'a> {
    let matching: Vec<&LogEntry> = log
        .iter()
        .filter(|entry| filter.matches_topic(entry.topic()))
        .collect();
    let matched = matching.len();

    let mut kept: Vec<&LogEntry> = if filter.suppress_duplicates {
        let mut duplicates = DuplicateWindow::new(filter.duplicate_window);
        matching
            .into_iter()
            .filter(|&entry| duplicates.admit(entry))
            .collect()
    } else {
        matching
    };
    let suppressed_duplicates = matched - kept.len();

    let mut truncated = 0;
    if let Some(cap) = filter.display_cap {
        if kept.len() > cap {
            truncated = kept.len() - cap;
            kept.drain(..truncated);
        }
    }

    let entries = kept
        .into_iter()
        .map(|entry| DisplayedMessage {
            entry,
            classification: classify(entry.parsed()),
        })
        .collect();

    LogView {
        entries,
        total: log.len(),
        matched,
        suppressed_duplicates,
        truncated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MessageKind;

    fn at(base: DateTime<Local>, offset_ms: i64) -> DateTime<Local> {
        base + Duration::milliseconds(offset_ms)
    }

    fn entry(topic: &str, payload: &str, retained: bool, received_at: DateTime<Local>) -> LogEntry {
        LogEntry::new(topic, payload, retained, received_at)
    }

    fn payloads<'a>(view: &'a LogView<'a>) -> Vec<&'a str> {
        view.entries.iter().map(|shown| shown.entry.raw_payload()).collect()
    }

    #[test]
    fn repeats_inside_the_window_collapse() {
        let t0 = Local::now();
        let log = vec![
            entry("a/b", "same", false, t0),
            entry("a/b", "same", false, at(t0, 500)),
            entry("a/b", "same", false, at(t0, 2100)),
        ];
        let view = process(&log, &ViewFilter::default());

        assert_eq!(view.entries.len(), 2);
        assert_eq!(view.entries[0].entry.received_at(), t0);
        assert_eq!(view.entries[1].entry.received_at(), at(t0, 2100));
        assert_eq!(view.suppressed_duplicates, 1);
        assert_eq!(view.summary(), "2 of 3 messages (1 duplicates filtered out)");
    }

    #[test]
    fn window_is_measured_from_last_kept_entry() {
        let t0 = Local::now();
        // 1500 is dropped, so 2500 is compared against 0 and kept
        let log = vec![
            entry("a", "x", false, t0),
            entry("a", "x", false, at(t0, 1500)),
            entry("a", "x", false, at(t0, 2500)),
            entry("a", "x", false, at(t0, 4000)),
        ];
        let view = process(&log, &ViewFilter::default());
        let stamps: Vec<_> = view.entries.iter().map(|e| e.entry.received_at()).collect();
        assert_eq!(stamps, vec![t0, at(t0, 2500)]);
    }

    #[test]
    fn exactly_at_the_threshold_is_still_a_duplicate() {
        let t0 = Local::now();
        let log = vec![entry("a", "x", false, t0), entry("a", "x", false, at(t0, 2000))];
        assert_eq!(process(&log, &ViewFilter::default()).entries.len(), 1);
    }

    #[test]
    fn retained_and_live_copies_never_collapse() {
        let t0 = Local::now();
        let log = vec![
            entry("a/b", "same", true, t0),
            entry("a/b", "same", false, at(t0, 10)),
        ];
        let view = process(&log, &ViewFilter::default());
        assert_eq!(view.entries.len(), 2);
        assert!(view.entries[0].entry.retained());
        assert!(!view.entries[1].entry.retained());
    }

    #[test]
    fn different_topics_or_payloads_are_distinct() {
        let t0 = Local::now();
        let log = vec![
            entry("a", "x", false, t0),
            entry("b", "x", false, t0),
            entry("a", "y", false, t0),
        ];
        assert_eq!(process(&log, &ViewFilter::default()).entries.len(), 3);
    }

    #[test]
    fn suppression_can_be_disabled() {
        let t0 = Local::now();
        let log = vec![entry("a", "x", false, t0), entry("a", "x", false, at(t0, 1))];
        let filter = ViewFilter {
            suppress_duplicates: false,
            ..ViewFilter::default()
        };
        let view = process(&log, &filter);
        assert_eq!(view.entries.len(), 2);
        assert_eq!(view.suppressed_duplicates, 0);
    }

    #[test]
    fn custom_window_is_honoured() {
        let t0 = Local::now();
        let log = vec![entry("a", "x", false, t0), entry("a", "x", false, at(t0, 600))];
        let filter = ViewFilter {
            duplicate_window: Duration::milliseconds(500),
            ..ViewFilter::default()
        };
        assert_eq!(process(&log, &filter).entries.len(), 2);
    }

    #[test]
    fn topic_filter_is_case_sensitive_substring() {
        let t0 = Local::now();
        let log = vec![
            entry("thatsapp/publictest/global", "1", false, t0),
            entry("thatsapp/publictest/bob/messages", "2", false, t0),
            entry("other/Global", "3", false, t0),
        ];
        let filter = ViewFilter {
            topic_filter: "global".into(),
            ..ViewFilter::default()
        };
        let view = process(&log, &filter);
        assert_eq!(payloads(&view), vec!["1"]);
        assert_eq!(view.matched, 1);
        assert_eq!(view.total, 3);
    }

    #[test]
    fn cap_keeps_the_most_recent_in_order() {
        let t0 = Local::now();
        let log: Vec<_> = (0..200)
            .map(|i| entry("a", &i.to_string(), false, at(t0, i)))
            .collect();
        let filter = ViewFilter {
            display_cap: Some(150),
            ..ViewFilter::default()
        };
        let view = process(&log, &filter);

        assert_eq!(view.entries.len(), 150);
        assert_eq!(view.truncated, 50);
        let expected: Vec<String> = (50..200).map(|i| i.to_string()).collect();
        assert_eq!(payloads(&view), expected);
    }

    #[test]
    fn no_cap_keeps_everything() {
        let t0 = Local::now();
        let log: Vec<_> = (0..300)
            .map(|i| entry("a", &i.to_string(), false, t0))
            .collect();
        let filter = ViewFilter {
            display_cap: None,
            ..ViewFilter::default()
        };
        assert_eq!(process(&log, &filter).entries.len(), 300);
    }

    #[test]
    fn output_is_an_ordered_subset_of_the_log() {
        let t0 = Local::now();
        let log: Vec<_> = (0..40)
            .map(|i| {
                let topic = if i % 3 == 0 { "x/1" } else { "y/2" };
                entry(topic, &(i % 4).to_string(), i % 2 == 0, at(t0, i * 300))
            })
            .collect();
        let filter = ViewFilter {
            topic_filter: "/".into(),
            display_cap: Some(10),
            ..ViewFilter::default()
        };
        let view = process(&log, &filter);
        assert!(view.entries.len() <= log.len());

        let positions: Vec<usize> = view
            .entries
            .iter()
            .map(|shown| log.iter().position(|e| std::ptr::eq(e, shown.entry)).unwrap())
            .collect();
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn entries_are_classified() {
        let t0 = Local::now();
        let log = vec![
            entry("a/b", r#"{"type":"TEXT","payload":"hi"}"#, false, t0),
            entry("a/b", r#"{"hello":"world"}"#, false, t0),
            entry("a/b", "plain words", false, t0),
        ];
        let view = process(&log, &ViewFilter::default());
        assert_eq!(view.entries[0].classification.kind(), Some(MessageKind::Text));
        assert_eq!(view.entries[1].classification, Classification::OpaqueJson);
        assert_eq!(view.entries[2].classification, Classification::RawText);
        assert!(view.entries[0].render().contains("[TEXT] a/b\n"));
    }

    #[test]
    fn broadcast_messages_are_marked() {
        let t0 = Local::now();
        let log = vec![
            entry("t/global", r#"{"type":"ONLINE_POLL","recipientId":""}"#, true, t0),
            entry("t/bob/messages", r#"{"type":"TEXT","recipientId":"bob"}"#, false, t0),
        ];
        let view = process(&log, &ViewFilter::default());
        assert!(view.entries[0]
            .render()
            .contains("[ONLINE_POLL] t/global [broadcast] [retained]\n"));
        assert!(!view.entries[1].render().contains("[broadcast]"));
    }

    #[test]
    fn duplicate_window_admits_incrementally() {
        let t0 = Local::now();
        let mut window = DuplicateWindow::new(Duration::milliseconds(2000));
        assert!(window.admit(&entry("a", "x", false, t0)));
        assert!(!window.admit(&entry("a", "x", false, at(t0, 1500))));
        assert!(window.admit(&entry("a", "x", true, at(t0, 1500))));
        assert!(window.admit(&entry("a", "x", false, at(t0, 2500))));
    }

    #[test]
    fn processing_is_deterministic() {
        let t0 = Local::now();
        let log = vec![
            entry("a", "x", false, t0),
            entry("a", "x", false, at(t0, 100)),
            entry("b", "{}", true, at(t0, 200)),
        ];
        let filter = ViewFilter::default();
        assert_eq!(process(&log, &filter), process(&log, &filter));
    }
}
