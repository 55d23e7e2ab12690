//! Per-process retry bookkeeping for failed deliveries.

use crate::message::Message;
use std::collections::HashMap;
use std::fmt;

/// Composite key identifying one message's delivery history.
///
/// Derived from exchange ++ queue ++ route key ++ message id. Used only as a
/// map key; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RetryMark(String);

impl RetryMark {
    /// Derive the mark for a delivered message
    pub fn of(message: &Message) -> Self {
        Self(format!(
            "{}{}{}{}",
            message.exchange(),
            message.queue(),
            message.route_key(),
            message.id()
        ))
    }

    /// Get the mark as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RetryMark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process-local mapping from retry mark to failure count.
///
/// State is owned by the consumer loop that created it and is not shared
/// across worker processes: counts reset when a worker restarts or when a
/// different worker handles retries of the same logical message. That is
/// the at-least-once trade-off this client makes.
#[derive(Debug, Default)]
pub struct RetryTracker {
    counts: HashMap<RetryMark, u32>,
}

impl RetryTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one failure observation for a mark.
    ///
    /// Returns the number of failures seen *before* this one (0 for an
    /// unseen mark) and increments the stored count as a side effect, so
    /// every observation both reports the count-so-far and advances state
    /// for the next observation.
    pub fn observe(&mut self, mark: &RetryMark) -> u32 {
        let count = self.counts.entry(mark.clone()).or_insert(0);
        let prior = *count;
        *count += 1;
        prior
    }

    /// Current failure count for a mark without advancing it
    pub fn count(&self, mark: &RetryMark) -> u32 {
        self.counts.get(mark).copied().unwrap_or(0)
    }

    /// Remove a mark after a terminal disposition.
    ///
    /// Clearing a mark that was never set is a no-op.
    pub fn clear(&mut self, mark: &RetryMark) {
        self.counts.remove(mark);
    }

    /// Number of marks currently tracked
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Check whether no marks are tracked
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
