//! Tests for the orchestrator.

use super::*;
use crate::config::MemoryConfig;
use crate::consumer::{handler_fn, shutdown_channel};
use crate::sink::MemorySink;
use std::sync::Mutex;
use std::time::Instant;

fn memory_config() -> MessageQueueConfig {
    MessageQueueConfig {
        driver: DriverKind::Memory,
        ..Default::default()
    }
}

/// Poll a predicate until it holds or the deadline passes
async fn wait_until(deadline: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let end = Instant::now() + deadline;
    while Instant::now() < end {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    predicate()
}

/// Verify the factory selects the configured driver.
#[tokio::test]
async fn test_connect_selects_memory_driver() {
    let client = MessageQueue::connect(memory_config()).await.unwrap();
    assert_eq!(client.driver_kind(), DriverKind::Memory);
    assert_eq!(client.retry_limit(), 3);
}

/// Verify an invalid configuration fails before any connection attempt.
#[tokio::test]
async fn test_connect_rejects_invalid_config() {
    let config = MessageQueueConfig {
        retry: 0,
        ..memory_config()
    };
    let error = MessageQueue::connect(config).await.unwrap_err();
    assert!(matches!(error, QueueError::Configuration(_)));
}

/// Verify publishing returns the assigned envelope.
#[tokio::test]
async fn test_queue_returns_message() {
    let client = MessageQueue::connect(memory_config()).await.unwrap();
    let message = client
        .queue("orders", "create", "new", "payload-A")
        .await
        .unwrap();

    assert_eq!(message.exchange().as_str(), "orders");
    assert_eq!(message.queue().as_str(), "create");
    assert_eq!(message.route_key().as_str(), "new");
    assert_eq!(message.body_text(), "payload-A");
    assert!(!message.id().as_str().is_empty());
}

/// Verify name validation happens at the orchestrator boundary.
#[tokio::test]
async fn test_queue_validates_names() {
    let client = MessageQueue::connect(memory_config()).await.unwrap();
    let error = client
        .queue("bad exchange", "create", "new", "payload-A")
        .await
        .unwrap_err();
    assert!(matches!(error, QueueError::Validation(_)));
}

/// Verify a consumer registered through the orchestrator receives a
/// published message and stops on shutdown.
#[tokio::test]
async fn test_publish_then_consume() {
    let mut client = MessageQueue::connect(memory_config()).await.unwrap();
    let sink = Arc::new(MemorySink::new());
    client.set_sink(sink.clone());
    let client = Arc::new(client);

    let published = client
        .queue("orders", "create", "new", "payload-A")
        .await
        .unwrap();

    let received: Arc<Mutex<Vec<(String, String)>>> = Arc::new(Mutex::new(Vec::new()));
    let seen = received.clone();
    let handler = handler_fn(move |message: &Message| {
        seen.lock()
            .expect("handler lock")
            .push((message.id().to_string(), message.body_text().into_owned()));
        true
    });

    let (shutdown, signal) = shutdown_channel();
    let consumer_client = client.clone();
    let task = tokio::spawn(async move {
        consumer_client
            .consumer(handler, "orders", "create", "new", signal)
            .await
            .expect("consumer should stop cleanly");
    });

    assert!(
        wait_until(Duration::from_secs(2), || !received
            .lock()
            .expect("handler lock")
            .is_empty())
        .await,
        "the published message should be delivered"
    );
    shutdown.shutdown();
    task.await.unwrap();

    let deliveries = received.lock().expect("handler lock").clone();
    assert_eq!(
        deliveries,
        vec![(published.id().to_string(), "payload-A".to_string())]
    );
    assert!(sink.dead_letters().is_empty());
}

/// Verify the injected sink observes dead-letters produced by a consumer
/// started through the orchestrator.
#[tokio::test]
async fn test_sink_routing() {
    let config = MessageQueueConfig {
        retry: 2,
        ..memory_config()
    };
    let mut client = MessageQueue::connect(config).await.unwrap();
    let sink = Arc::new(MemorySink::new());
    client.set_sink(sink.clone());
    let client = Arc::new(client);

    client
        .delay_queue("orders", "create", "new", "doomed", Duration::ZERO)
        .await
        .unwrap();

    let handler = handler_fn(|_: &Message| false);
    let (shutdown, signal) = shutdown_channel();
    let consumer_client = client.clone();
    let task = tokio::spawn(async move {
        consumer_client
            .delay_consumer(handler, "orders", "create", "new", signal)
            .await
            .expect("consumer should stop cleanly");
    });

    assert!(
        wait_until(Duration::from_secs(2), || !sink.dead_letters().is_empty()).await,
        "the dead-letter should reach the injected sink"
    );
    shutdown.shutdown();
    task.await.unwrap();

    let records = sink.dead_letters();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].body, "doomed");
    assert_eq!(sink.retries().len(), 1);
}

/// Verify the client can be built around an explicit driver.
#[tokio::test]
async fn test_with_driver() {
    let driver = MemoryDriver::new(MemoryConfig::default());
    let client = MessageQueue::with_driver(Box::new(driver), 5);
    assert_eq!(client.driver_kind(), DriverKind::Memory);
    assert_eq!(client.retry_limit(), 5);
}
