//! Tests for retry bookkeeping.

use super::*;
use crate::message::{Binding, MessageId};
use bytes::Bytes;

fn sample_message(id: &str) -> Message {
    let binding = Binding::parse("orders", "create", "new").unwrap();
    Message::new(MessageId::from_delivery(id), Bytes::from("body"), &binding)
}

/// Verify the mark concatenates exchange, queue, route key, and id.
#[test]
fn test_mark_derivation() {
    let mark = RetryMark::of(&sample_message("m1"));
    assert_eq!(mark.as_str(), "orderscreatenewm1");
}

/// Verify distinct message identities get distinct marks.
#[test]
fn test_marks_distinguish_identities() {
    let a = RetryMark::of(&sample_message("m1"));
    let b = RetryMark::of(&sample_message("m2"));
    assert_ne!(a, b);
}

/// Verify an unseen mark reports zero prior failures.
#[test]
fn test_unseen_mark_is_zero() {
    let tracker = RetryTracker::new();
    let mark = RetryMark::of(&sample_message("m1"));
    assert_eq!(tracker.count(&mark), 0);
}

/// Verify observe reports the count-so-far and advances it.
#[test]
fn test_observe_increments() {
    let mut tracker = RetryTracker::new();
    let mark = RetryMark::of(&sample_message("m1"));

    assert_eq!(tracker.observe(&mark), 0);
    assert_eq!(tracker.observe(&mark), 1);
    assert_eq!(tracker.observe(&mark), 2);
    assert_eq!(tracker.count(&mark), 3);
}

/// Verify counts are independent per mark.
#[test]
fn test_observe_is_per_mark() {
    let mut tracker = RetryTracker::new();
    let a = RetryMark::of(&sample_message("m1"));
    let b = RetryMark::of(&sample_message("m2"));

    tracker.observe(&a);
    tracker.observe(&a);
    assert_eq!(tracker.observe(&b), 0);
    assert_eq!(tracker.count(&a), 2);
    assert_eq!(tracker.count(&b), 1);
}

/// Verify clear removes the entry so absence means zero.
#[test]
fn test_clear_resets_to_zero() {
    let mut tracker = RetryTracker::new();
    let mark = RetryMark::of(&sample_message("m1"));

    tracker.observe(&mark);
    tracker.observe(&mark);
    tracker.clear(&mark);

    assert_eq!(tracker.count(&mark), 0);
    assert!(tracker.is_empty());
    assert_eq!(tracker.observe(&mark), 0);
}

/// Verify clearing a mark that was never set is a no-op.
#[test]
fn test_clear_unset_mark_is_noop() {
    let mut tracker = RetryTracker::new();
    let mark = RetryMark::of(&sample_message("m1"));

    tracker.clear(&mark);
    assert!(tracker.is_empty());
    assert_eq!(tracker.count(&mark), 0);
}

/// Verify len tracks the number of live marks.
#[test]
fn test_len() {
    let mut tracker = RetryTracker::new();
    assert_eq!(tracker.len(), 0);

    tracker.observe(&RetryMark::of(&sample_message("m1")));
    tracker.observe(&RetryMark::of(&sample_message("m2")));
    assert_eq!(tracker.len(), 2);
}
