use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::log_processor::ViewFilter;
use super::wire::ConnectOptions;

/// Tuning knobs of the session engine, stored in the `[session]` config table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Identical messages closer together than this are shown once
    pub duplicate_window_ms: u64,
    /// Maximum number of displayed messages, 0 shows everything
    pub display_cap: usize,
    pub connect_timeout_secs: u64,
    pub keep_alive_secs: u64,
    /// Let the wire client re-dial after a dropped connection
    pub reconnect: bool,
    /// Treat the console like a page served over https: `ws://` is dialled as `wss://`
    pub secure_context: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            duplicate_window_ms: 2000,
            display_cap: 150,
            connect_timeout_secs: 30,
            keep_alive_secs: 30,
            reconnect: true,
            secure_context: false,
        }
    }
}

impl SessionSettings {
    pub fn connect_options(&self, use_tls: bool) -> ConnectOptions {
        ConnectOptions {
            use_tls,
            reconnect: self.reconnect,
            timeout: Duration::from_secs(self.connect_timeout_secs),
            keep_alive: Duration::from_secs(self.keep_alive_secs),
        }
    }

    pub fn view_filter(&self, topic_filter: &str, suppress_duplicates: bool) -> ViewFilter {
        ViewFilter {
            topic_filter: topic_filter.to_string(),
            suppress_duplicates,
            duplicate_window: i64::try_from(self.duplicate_window_ms)
                .ok()
                .and_then(chrono::Duration::try_milliseconds)
                .unwrap_or(chrono::Duration::MAX),
            display_cap: (self.display_cap > 0).then_some(self.display_cap),
        }
    }
}
