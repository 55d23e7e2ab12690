//! Event sink: the injected logging collaborator.
//!
//! Drivers report retry notices, terminal dead-letter records, and consumer
//! errors through an [`EventSink`] rather than a concrete logger, so tests
//! can observe dispositions and production wires everything into `tracing`.

use crate::message::Message;
use chrono::{DateTime, Utc};
use std::sync::Mutex;

/// Terminal failure record for a message that exhausted its retry budget
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetter {
    pub exchange: String,
    pub queue: String,
    pub route_key: String,
    pub message_id: String,
    pub body: String,
    pub occurred_at: DateTime<Utc>,
}

impl DeadLetter {
    /// Build the record for a message at the moment of dead-lettering
    pub fn record(message: &Message) -> Self {
        Self {
            exchange: message.exchange().to_string(),
            queue: message.queue().to_string(),
            route_key: message.route_key().to_string(),
            message_id: message.id().to_string(),
            body: message.body_text().into_owned(),
            occurred_at: Utc::now(),
        }
    }
}

/// Leveled sink for consumer lifecycle events
pub trait EventSink: Send + Sync {
    /// A delivery failed below the retry limit and will be retried
    fn retrying(&self, message: &Message, failures: u32);

    /// A message exhausted its retry budget and was removed
    fn dead_letter(&self, record: &DeadLetter);

    /// A transient consumer-loop error that did not stop consumption
    fn consumer_error(&self, scope: &str, detail: &str);
}

/// Production sink forwarding to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn retrying(&self, message: &Message, failures: u32) {
        tracing::info!(
            message_id = %message.id(),
            exchange = %message.exchange(),
            queue = %message.queue(),
            route_key = %message.route_key(),
            failures,
            "message processing failed, retrying"
        );
    }

    fn dead_letter(&self, record: &DeadLetter) {
        tracing::error!(
            message_id = %record.message_id,
            exchange = %record.exchange,
            queue = %record.queue,
            route_key = %record.route_key,
            body = %record.body,
            occurred_at = %record.occurred_at,
            "message processing failed, dead-lettered"
        );
    }

    fn consumer_error(&self, scope: &str, detail: &str) {
        tracing::error!(scope, detail, "consumer error");
    }
}

/// In-memory sink capturing events for assertions in tests
#[derive(Debug, Default)]
pub struct MemorySink {
    state: Mutex<MemorySinkState>,
}

#[derive(Debug, Default)]
struct MemorySinkState {
    retries: Vec<(String, u32)>,
    dead_letters: Vec<DeadLetter>,
    errors: Vec<String>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Retry notices captured so far, as (message id, failure count) pairs
    pub fn retries(&self) -> Vec<(String, u32)> {
        self.state.lock().expect("sink lock poisoned").retries.clone()
    }

    /// Dead-letter records captured so far
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state
            .lock()
            .expect("sink lock poisoned")
            .dead_letters
            .clone()
    }

    /// Consumer errors captured so far
    pub fn errors(&self) -> Vec<String> {
        self.state.lock().expect("sink lock poisoned").errors.clone()
    }
}

impl EventSink for MemorySink {
    fn retrying(&self, message: &Message, failures: u32) {
        self.state
            .lock()
            .expect("sink lock poisoned")
            .retries
            .push((message.id().to_string(), failures));
    }

    fn dead_letter(&self, record: &DeadLetter) {
        self.state
            .lock()
            .expect("sink lock poisoned")
            .dead_letters
            .push(record.clone());
    }

    fn consumer_error(&self, scope: &str, detail: &str) {
        self.state
            .lock()
            .expect("sink lock poisoned")
            .errors
            .push(format!("{scope}: {detail}"));
    }
}

#[cfg(test)]
#[path = "sink_tests.rs"]
mod tests;
