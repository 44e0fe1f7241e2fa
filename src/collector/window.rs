//! Collection window tracking.

use chrono::{DateTime, Utc};

use crate::fetcher::CollectionWindow;

/// Hands out consecutive, non-overlapping windows.
///
/// Each window starts where the previous one ended. The end is clamped so
/// that a backwards clock step yields an empty window rather than an overlap.
#[derive(Debug, Clone)]
pub struct WindowTracker {
    last_end: DateTime<Utc>,
}

impl WindowTracker {
    /// Start tracking from `start`, the beginning of the first window.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { last_end: start }
    }

    pub fn last_end(&self) -> DateTime<Utc> {
        self.last_end
    }

    /// Close the current window at `now` and open the next one.
    pub fn advance(&mut self, now: DateTime<Utc>) -> CollectionWindow {
        let till = now.max(self.last_end);
        let window = CollectionWindow::new(self.last_end, till);
        self.last_end = till;
        window
    }
}
