//! Driver contract implemented by each queue backend.

use crate::consumer::{ConsumerWorker, MessageHandler, ShutdownSignal};
use crate::error::QueueError;
use crate::message::{Binding, Message};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Enumeration of supported drivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    Amqp,
    Redis,
    Memory,
}

impl DriverKind {
    /// Whether the backend delays messages natively or emulates the delay
    /// queue client-side
    pub fn native_delay(&self) -> bool {
        match self {
            Self::Amqp => true,
            Self::Redis => false,
            Self::Memory => false,
        }
    }

    /// Get the kind as a string slice
    pub fn as_str(&self) -> &str {
        match self {
            Self::Amqp => "amqp",
            Self::Redis => "redis",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which delivery path a consumer attaches to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeMode {
    /// The immediate queue
    Immediate,
    /// The delay queue
    Delayed,
}

/// Contract implemented by each queue backend.
///
/// A driver owns its broker connection and state independently; the
/// orchestrator selects one at startup and forwards every operation.
#[async_trait]
pub trait QueueDriver: Send + Sync {
    /// Publish a message for immediate delivery and return its envelope.
    ///
    /// Fails with [`QueueError::ExchangeDeclaration`] when the exchange
    /// cannot be declared or bound, and [`QueueError::Publish`] when the
    /// broker rejects the publish.
    async fn queue(&self, binding: &Binding, body: Bytes) -> Result<Message, QueueError>;

    /// Publish a message visible to consumers no earlier than `now + ttl`.
    ///
    /// Same error conditions as [`queue`](Self::queue), plus
    /// [`QueueError::QueueDeclaration`] when queue setup fails.
    async fn delay_queue(
        &self,
        binding: &Binding,
        body: Bytes,
        ttl: Duration,
    ) -> Result<Message, QueueError>;

    /// Run the receive loop for a binding, invoking the handler once per
    /// delivered message and acting on the worker's disposition.
    ///
    /// Processes one message at a time. Returns `Ok(())` once the shutdown
    /// signal fires; returns an error only for failures that make the loop
    /// unable to continue (unreachable broker, failed declarations).
    async fn consume(
        &self,
        binding: &Binding,
        mode: ConsumeMode,
        handler: Arc<dyn MessageHandler>,
        worker: &mut ConsumerWorker,
        shutdown: ShutdownSignal,
    ) -> Result<(), QueueError>;

    /// Which backend this driver speaks to
    fn kind(&self) -> DriverKind;
}
