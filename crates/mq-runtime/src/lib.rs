//! # MQ Runtime
//!
//! Broker-agnostic message-queue client: producers publish immediate and
//! time-delayed messages to an exchange/queue/route-key binding, consumers
//! process them with bounded retry and dead-letter logging, against either
//! an AMQP broker or a Redis instance used as a queue substrate.
//!
//! This library provides:
//! - A driver contract with AMQP, Redis, and in-memory implementations
//! - An immutable message envelope with time-ordered id generation
//! - Per-consumer retry bookkeeping with dead-letter records through an
//!   injected event sink
//! - Cancellable consume loops driven by a shutdown signal
//!
//! ## Module Organization
//!
//! - [`message`] - Message envelope and domain identifiers
//! - [`retry`] - Retry marks and the failure tracker
//! - [`error`] - Error types for all queue operations
//! - [`config`] - Driver selection and connection settings
//! - [`sink`] - The injected logging collaborator
//! - [`consumer`] - Callback contract, disposition policy, shutdown signal
//! - [`driver`] - The driver contract
//! - [`drivers`] - AMQP, Redis, and in-memory drivers
//! - [`client`] - The `MessageQueue` orchestrator

// Module declarations
pub mod client;
pub mod config;
pub mod consumer;
pub mod driver;
pub mod drivers;
pub mod error;
pub mod message;
pub mod retry;
pub mod sink;

// Re-export commonly used types at crate root for convenience
pub use client::MessageQueue;
pub use config::{
    AmqpConfig, ConnectionSettings, LogSettings, MemoryConfig, MessageQueueConfig, RedisConfig,
};
pub use consumer::{
    handler_fn, shutdown_channel, ConsumerWorker, Disposition, FnHandler, MessageHandler,
    ShutdownHandle, ShutdownSignal,
};
pub use driver::{ConsumeMode, DriverKind, QueueDriver};
pub use drivers::{AmqpDriver, MemoryDriver, RedisDriver};
pub use error::{ConfigurationError, QueueError, ValidationError};
pub use message::{Binding, ExchangeName, Message, MessageId, QueueName, RouteKey};
pub use retry::{RetryMark, RetryTracker};
pub use sink::{DeadLetter, EventSink, MemorySink, TracingSink};
