//! The orchestrator: driver selection and the public operation surface.

use crate::config::MessageQueueConfig;
use crate::consumer::{ConsumerWorker, MessageHandler, ShutdownSignal};
use crate::driver::{ConsumeMode, DriverKind, QueueDriver};
use crate::drivers::{AmqpDriver, MemoryDriver, RedisDriver};
use crate::error::QueueError;
use crate::message::{Binding, Message};
use crate::sink::{EventSink, TracingSink};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

/// Broker-agnostic message-queue client.
///
/// Selects a driver from configuration at startup, owns the event sink, and
/// threads the retry limit and a fresh [`crate::retry::RetryTracker`] into
/// every consumer it starts. Producers get back the published [`Message`];
/// consumers register a handler and run until their shutdown signal fires.
pub struct MessageQueue {
    driver: Box<dyn QueueDriver>,
    retry_limit: u32,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for MessageQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageQueue")
            .field("retry_limit", &self.retry_limit)
            .finish_non_exhaustive()
    }
}

impl MessageQueue {
    /// Connect the configured driver and build the client.
    ///
    /// An unreachable broker is fatal here; nothing downstream can recover
    /// from it.
    pub async fn connect(config: MessageQueueConfig) -> Result<Self, QueueError> {
        config.validate()?;

        let driver: Box<dyn QueueDriver> = match config.driver {
            DriverKind::Amqp => {
                Box::new(AmqpDriver::connect(config.connections.amqp.clone()).await?)
            }
            DriverKind::Redis => {
                Box::new(RedisDriver::connect(config.connections.redis.clone()).await?)
            }
            DriverKind::Memory => Box::new(MemoryDriver::new(config.connections.memory.clone())),
        };

        Ok(Self {
            driver,
            retry_limit: config.retry,
            sink: Arc::new(TracingSink),
        })
    }

    /// Build the client around an already-constructed driver
    pub fn with_driver(driver: Box<dyn QueueDriver>, retry_limit: u32) -> Self {
        Self {
            driver,
            retry_limit,
            sink: Arc::new(TracingSink),
        }
    }

    /// Replace the event sink the consumers report through
    pub fn set_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.sink = sink;
    }

    /// Which backend is active
    pub fn driver_kind(&self) -> DriverKind {
        self.driver.kind()
    }

    /// The configured retry limit
    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    /// Publish a message for immediate delivery
    pub async fn queue(
        &self,
        exchange: &str,
        queue: &str,
        route_key: &str,
        body: impl Into<Bytes>,
    ) -> Result<Message, QueueError> {
        let binding = Binding::parse(exchange, queue, route_key)?;
        self.driver.queue(&binding, body.into()).await
    }

    /// Publish a message visible no earlier than `now + ttl`
    pub async fn delay_queue(
        &self,
        exchange: &str,
        queue: &str,
        route_key: &str,
        body: impl Into<Bytes>,
        ttl: Duration,
    ) -> Result<Message, QueueError> {
        let binding = Binding::parse(exchange, queue, route_key)?;
        self.driver.delay_queue(&binding, body.into(), ttl).await
    }

    /// Run an immediate-queue consumer until the shutdown signal fires
    pub async fn consumer(
        &self,
        handler: Arc<dyn MessageHandler>,
        exchange: &str,
        queue: &str,
        route_key: &str,
        shutdown: ShutdownSignal,
    ) -> Result<(), QueueError> {
        self.run_consumer(handler, exchange, queue, route_key, ConsumeMode::Immediate, shutdown)
            .await
    }

    /// Run a delay-queue consumer until the shutdown signal fires
    pub async fn delay_consumer(
        &self,
        handler: Arc<dyn MessageHandler>,
        exchange: &str,
        queue: &str,
        route_key: &str,
        shutdown: ShutdownSignal,
    ) -> Result<(), QueueError> {
        self.run_consumer(handler, exchange, queue, route_key, ConsumeMode::Delayed, shutdown)
            .await
    }

    async fn run_consumer(
        &self,
        handler: Arc<dyn MessageHandler>,
        exchange: &str,
        queue: &str,
        route_key: &str,
        mode: ConsumeMode,
        shutdown: ShutdownSignal,
    ) -> Result<(), QueueError> {
        let binding = Binding::parse(exchange, queue, route_key)?;
        let mut worker = ConsumerWorker::new(self.retry_limit, self.sink.clone());
        self.driver
            .consume(&binding, mode, handler, &mut worker, shutdown)
            .await
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
