//! Consumer-side plumbing shared by all drivers: the callback contract,
//! the retry/dead-letter disposition, and the shutdown signal the consume
//! loops check each iteration.

use crate::message::Message;
use crate::retry::{RetryMark, RetryTracker};
use crate::sink::{DeadLetter, EventSink};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;

// ============================================================================
// Callback contract
// ============================================================================

/// Consumer callback: `true` acknowledges the message, anything else routes
/// it through the retry policy.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &Message) -> bool;
}

/// Adapter turning a plain `Fn(&Message) -> bool` closure into a handler
pub struct FnHandler<F>(F);

#[async_trait]
impl<F> MessageHandler for FnHandler<F>
where
    F: Fn(&Message) -> bool + Send + Sync,
{
    async fn handle(&self, message: &Message) -> bool {
        (self.0)(message)
    }
}

/// Wrap a plain closure as a shareable handler
pub fn handler_fn<F>(callback: F) -> Arc<dyn MessageHandler>
where
    F: Fn(&Message) -> bool + Send + Sync + 'static,
{
    Arc::new(FnHandler(callback))
}

// ============================================================================
// Disposition
// ============================================================================

/// What a driver must do with a delivery after the callback ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Remove the message from the underlying store
    Acknowledge,
    /// Return the message for a later delivery attempt
    Requeue,
    /// Remove the message; the terminal failure record has been emitted
    DeadLetter,
}

/// Retry/dead-letter bookkeeping wrapped around one consume loop.
///
/// Owns the injected [`RetryTracker`] and the event sink. Drivers call
/// [`dispose`](Self::dispose) once per delivery and act on the returned
/// [`Disposition`]; the worker takes care of counting, clearing, and
/// logging so both queue kinds share one policy.
pub struct ConsumerWorker {
    retry_limit: u32,
    tracker: RetryTracker,
    sink: Arc<dyn EventSink>,
}

impl ConsumerWorker {
    /// Create a worker with a fresh tracker
    pub fn new(retry_limit: u32, sink: Arc<dyn EventSink>) -> Self {
        Self::with_tracker(retry_limit, sink, RetryTracker::new())
    }

    /// Create a worker around an existing tracker (visible to tests)
    pub fn with_tracker(retry_limit: u32, sink: Arc<dyn EventSink>, tracker: RetryTracker) -> Self {
        Self {
            retry_limit,
            tracker,
            sink,
        }
    }

    /// Decide the disposition for one delivery.
    ///
    /// Success clears the retry mark and acknowledges. A failure below the
    /// retry limit emits a transient retry notice and requeues; the failure
    /// that reaches the limit clears the mark, emits the terminal
    /// dead-letter record, and removes the message. With a limit of N the
    /// N-th failed delivery dead-letters.
    pub fn dispose(&mut self, message: &Message, succeeded: bool) -> Disposition {
        let mark = RetryMark::of(message);

        if succeeded {
            self.tracker.clear(&mark);
            return Disposition::Acknowledge;
        }

        let failures = self.tracker.observe(&mark) + 1;
        if failures < self.retry_limit {
            self.sink.retrying(message, failures);
            Disposition::Requeue
        } else {
            self.tracker.clear(&mark);
            self.sink.dead_letter(&DeadLetter::record(message));
            Disposition::DeadLetter
        }
    }

    /// The configured retry limit
    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    /// The retry state, for inspection
    pub fn tracker(&self) -> &RetryTracker {
        &self.tracker
    }

    /// The event sink
    pub fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }
}

// ============================================================================
// Shutdown signal
// ============================================================================

/// Create a linked shutdown handle/signal pair.
///
/// The handle side triggers shutdown; the signal side is cloned into
/// consume loops, which check it each iteration and return cleanly once it
/// fires.
pub fn shutdown_channel() -> (ShutdownHandle, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx }, ShutdownSignal { rx })
}

/// Trigger side of the shutdown pair
#[derive(Debug)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    /// Request shutdown of every linked signal
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// Observer side of the shutdown pair.
///
/// A dropped handle counts as shutdown, so an orphaned consume loop cannot
/// run unstoppably.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Check whether shutdown has been requested.
    ///
    /// A closed channel (dropped handle) reads as shutdown.
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Wait until shutdown is requested
    pub async fn wait(&mut self) {
        if *self.rx.borrow() {
            return;
        }
        while self.rx.changed().await.is_ok() {
            if *self.rx.borrow() {
                return;
            }
        }
        // Handle dropped without an explicit trigger
    }

    /// A signal that never fires on its own (the loop runs until the
    /// process is terminated, matching brokers' long-lived workers)
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        // Leak the sender so the channel stays open for the process lifetime
        std::mem::forget(tx);
        Self { rx }
    }
}

#[cfg(test)]
#[path = "consumer_tests.rs"]
mod tests;
