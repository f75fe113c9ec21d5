//! Scan debouncer
//!
//! A camera decoder emits the same code many times per second while the label
//! stays in frame. Only the first decode of a code within the window counts.

use std::time::Duration;
use tokio::time::Instant;

/// Default repeat window
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(1000);

/// Remembers the last accepted code and when it was accepted
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    last: Option<(String, Instant)>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    /// Accept `code` unless it repeats the last accepted code within the window
    ///
    /// A rejected decode does not extend the window.
    pub fn accept(&mut self, code: &str, now: Instant) -> bool {
        if let Some((last_code, last_time)) = &self.last {
            if last_code == code && now.saturating_duration_since(*last_time) < self.window {
                return false;
            }
        }
        self.last = Some((code.to_string(), now));
        true
    }

    pub fn last_code(&self) -> Option<&str> {
        self.last.as_ref().map(|(code, _)| code.as_str())
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}
