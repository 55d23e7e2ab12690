//! Tests for the disposition policy and shutdown signal.

use super::*;
use crate::message::{Binding, MessageId};
use crate::sink::MemorySink;
use bytes::Bytes;

fn sample_message(id: &str) -> Message {
    let binding = Binding::parse("orders", "create", "new").unwrap();
    Message::new(MessageId::from_delivery(id), Bytes::from("payload-A"), &binding)
}

mod disposition {
    use super::*;

    /// Verify a successful delivery acknowledges and leaves no state.
    #[test]
    fn test_success_acknowledges() {
        let sink = Arc::new(MemorySink::new());
        let mut worker = ConsumerWorker::new(3, sink.clone());
        let message = sample_message("m1");

        assert_eq!(worker.dispose(&message, true), Disposition::Acknowledge);
        assert!(worker.tracker().is_empty());
        assert!(sink.retries().is_empty());
        assert!(sink.dead_letters().is_empty());
    }

    /// Verify failures below the limit requeue with a retry notice.
    #[test]
    fn test_failure_below_limit_requeues() {
        let sink = Arc::new(MemorySink::new());
        let mut worker = ConsumerWorker::new(3, sink.clone());
        let message = sample_message("m1");

        assert_eq!(worker.dispose(&message, false), Disposition::Requeue);
        assert_eq!(worker.dispose(&message, false), Disposition::Requeue);
        assert_eq!(sink.retries(), vec![("m1".to_string(), 1), ("m1".to_string(), 2)]);
        assert!(sink.dead_letters().is_empty());
    }

    /// Verify the N-th failed delivery dead-letters with limit N, emitting
    /// exactly one terminal record and clearing the mark.
    #[test]
    fn test_failure_at_limit_dead_letters() {
        let sink = Arc::new(MemorySink::new());
        let mut worker = ConsumerWorker::new(3, sink.clone());
        let message = sample_message("m1");

        worker.dispose(&message, false);
        worker.dispose(&message, false);
        assert_eq!(worker.dispose(&message, false), Disposition::DeadLetter);

        let records = sink.dead_letters();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message_id, "m1");
        assert_eq!(records[0].body, "payload-A");
        assert!(worker.tracker().is_empty());
    }

    /// Verify limit - 1 failures then success acknowledge without a
    /// dead-letter and clear the bookkeeping.
    #[test]
    fn test_retries_then_success() {
        let sink = Arc::new(MemorySink::new());
        let mut worker = ConsumerWorker::new(3, sink.clone());
        let message = sample_message("m1");

        assert_eq!(worker.dispose(&message, false), Disposition::Requeue);
        assert_eq!(worker.dispose(&message, false), Disposition::Requeue);
        assert_eq!(worker.dispose(&message, true), Disposition::Acknowledge);

        assert!(sink.dead_letters().is_empty());
        assert!(worker.tracker().is_empty());
    }

    /// Verify a dead-lettered identity starts a fresh count afterwards.
    #[test]
    fn test_count_resets_after_dead_letter() {
        let sink = Arc::new(MemorySink::new());
        let mut worker = ConsumerWorker::new(2, sink.clone());
        let message = sample_message("m1");

        worker.dispose(&message, false);
        assert_eq!(worker.dispose(&message, false), Disposition::DeadLetter);
        // Same identity delivered again later counts from zero
        assert_eq!(worker.dispose(&message, false), Disposition::Requeue);
    }

    /// Verify a limit of one dead-letters on the first failure.
    #[test]
    fn test_limit_of_one() {
        let sink = Arc::new(MemorySink::new());
        let mut worker = ConsumerWorker::new(1, sink.clone());
        let message = sample_message("m1");

        assert_eq!(worker.dispose(&message, false), Disposition::DeadLetter);
        assert!(sink.retries().is_empty());
        assert_eq!(sink.dead_letters().len(), 1);
    }

    /// Verify distinct message identities are counted independently.
    #[test]
    fn test_identities_are_independent() {
        let sink = Arc::new(MemorySink::new());
        let mut worker = ConsumerWorker::new(2, sink.clone());

        worker.dispose(&sample_message("m1"), false);
        assert_eq!(worker.dispose(&sample_message("m2"), false), Disposition::Requeue);
        assert_eq!(worker.dispose(&sample_message("m1"), false), Disposition::DeadLetter);
    }
}

mod handler {
    use super::*;

    /// Verify plain closures satisfy the callback contract.
    #[tokio::test]
    async fn test_closure_handler() {
        let handler = handler_fn(|message: &Message| message.body_text() == "payload-A");

        assert!(handler.handle(&sample_message("m1")).await);

        let binding = Binding::parse("orders", "create", "new").unwrap();
        let other = Message::new(MessageId::from_delivery("m2"), Bytes::from("other"), &binding);
        assert!(!handler.handle(&other).await);
    }
}

mod shutdown {
    use super::*;
    use std::time::Duration;

    /// Verify the signal starts untriggered and observes the handle.
    #[tokio::test]
    async fn test_trigger_observed() {
        let (handle, signal) = shutdown_channel();
        assert!(!signal.is_shutdown());

        handle.shutdown();
        assert!(signal.is_shutdown());
    }

    /// Verify wait resolves promptly once shutdown fires.
    #[tokio::test]
    async fn test_wait_resolves() {
        let (handle, mut signal) = shutdown_channel();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle.shutdown();
        });

        tokio::time::timeout(Duration::from_secs(1), signal.wait())
            .await
            .expect("wait should resolve after shutdown");
        assert!(signal.is_shutdown());
    }

    /// Verify a dropped handle counts as shutdown so loops cannot leak.
    #[tokio::test]
    async fn test_dropped_handle_resolves_wait() {
        let (handle, mut signal) = shutdown_channel();
        drop(handle);

        tokio::time::timeout(Duration::from_secs(1), signal.wait())
            .await
            .expect("wait should resolve after the handle is dropped");
        assert!(signal.is_shutdown());
    }

    /// Verify cloned signals all observe one trigger.
    #[tokio::test]
    async fn test_cloned_signals() {
        let (handle, signal) = shutdown_channel();
        let cloned = signal.clone();

        handle.shutdown();
        assert!(signal.is_shutdown());
        assert!(cloned.is_shutdown());
    }

    /// Verify the never-firing signal reports not shut down.
    #[test]
    fn test_never_signal() {
        let signal = ShutdownSignal::never();
        assert!(!signal.is_shutdown());
    }
}
