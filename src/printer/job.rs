//! # Print Jobs

use std::time::Duration;

/// Default feed/cut distance appended after a payload.
pub const DEFAULT_FEED_DISTANCE: u32 = 500;

/// A formatted receipt plus its feed/cut distance.
///
/// Jobs are built per call and consumed by one flush; a retry re-issues the
/// same job rather than a stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintJob {
    text: String,
    feed_distance: u32,
}

impl PrintJob {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            feed_distance: DEFAULT_FEED_DISTANCE,
        }
    }

    pub fn with_feed_distance(mut self, feed_distance: u32) -> Self {
        self.feed_distance = feed_distance;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn feed_distance(&self) -> u32 {
        self.feed_distance
    }

    /// Extra settle time the printer needs to feed and cut.
    pub fn feed_delay(&self) -> Duration {
        Duration::from_millis(u64::from(self.feed_distance))
    }
}
