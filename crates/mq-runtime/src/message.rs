//! Message envelope and the core domain identifiers.

use crate::error::ValidationError;
use bytes::Bytes;
use chrono::Utc;
use rand::RngExt;
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Name newtypes
// ============================================================================

/// Shared validation for exchange, queue, and route-key names.
///
/// Names travel into broker identifiers and Redis keys, so the accepted
/// alphabet is ASCII alphanumerics plus `.`, `-`, `_`.
fn validate_name(field: &str, name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if name.len() > 255 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            message: "must be 1-255 characters".to_string(),
        });
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            message: "only ASCII alphanumeric, dots, hyphens, and underscores allowed".to_string(),
        });
    }

    Ok(())
}

/// Validated exchange name: the routing entity producers publish into
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExchangeName(String);

impl ExchangeName {
    /// Create a validated exchange name
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        validate_name("exchange", &name)?;
        Ok(Self(name))
    }

    /// Get the name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExchangeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ExchangeName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Validated queue name: the durable buffer a consumer reads from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueName(String);

impl QueueName {
    /// Create a validated queue name
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        validate_name("queue", &name)?;
        Ok(Self(name))
    }

    /// Get the name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Validated route key used to match publishes to bound queues
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey(String);

impl RouteKey {
    /// Create a validated route key
    pub fn new(key: impl Into<String>) -> Result<Self, ValidationError> {
        let key = key.into();
        validate_name("route_key", &key)?;
        Ok(Self(key))
    }

    /// Get the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RouteKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

// ============================================================================
// Binding
// ============================================================================

/// The exchange/queue/route-key triple a publish or consume targets.
///
/// The triple also names the Redis storage for a logical queue:
/// `{exchange}.{queue}.{route_key}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Binding {
    exchange: ExchangeName,
    queue: QueueName,
    route_key: RouteKey,
}

impl Binding {
    /// Create a binding from already-validated names
    pub fn new(exchange: ExchangeName, queue: QueueName, route_key: RouteKey) -> Self {
        Self {
            exchange,
            queue,
            route_key,
        }
    }

    /// Create a binding from raw strings, validating each part
    pub fn parse(exchange: &str, queue: &str, route_key: &str) -> Result<Self, ValidationError> {
        Ok(Self {
            exchange: ExchangeName::new(exchange)?,
            queue: QueueName::new(queue)?,
            route_key: RouteKey::new(route_key)?,
        })
    }

    /// Get the exchange name
    pub fn exchange(&self) -> &ExchangeName {
        &self.exchange
    }

    /// Get the queue name
    pub fn queue(&self) -> &QueueName {
        &self.queue
    }

    /// Get the route key
    pub fn route_key(&self) -> &RouteKey {
        &self.route_key
    }

    /// Base key naming this logical queue in keyed storage
    pub fn storage_key(&self) -> String {
        format!("{}.{}.{}", self.exchange, self.queue, self.route_key)
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.exchange, self.queue, self.route_key)
    }
}

// ============================================================================
// MessageId
// ============================================================================

/// Quasi-unique, roughly time-ordered message identifier.
///
/// Generated ids concatenate the integer Unix seconds, the first four digits
/// of the fractional second, and a random six-digit suffix. Uniqueness only
/// needs to hold within one binding's in-flight window, so no coordination
/// is required.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(String);

impl MessageId {
    /// Generate a new id from the current time
    pub fn generate() -> Self {
        let now = Utc::now();
        let seconds = now.timestamp();
        // First four fractional-second digits, zero-padded
        let fraction = now.timestamp_subsec_micros() / 100;
        let suffix: u32 = rand::rng().random_range(100_000..=999_999);
        Self(format!("{seconds}{fraction:04}{suffix}"))
    }

    /// Wrap an id delivered by a broker
    pub fn from_delivery(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }
        Ok(Self(s.to_string()))
    }
}

// ============================================================================
// Message
// ============================================================================

/// Immutable message envelope.
///
/// Constructed by a driver at publish time (the driver assigns the id) or at
/// delivery time (reconstructed from broker metadata), and owned exclusively
/// by the call that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    id: MessageId,
    body: Bytes,
    exchange: ExchangeName,
    queue: QueueName,
    route_key: RouteKey,
}

impl Message {
    /// Create a message envelope for the given binding
    pub fn new(id: MessageId, body: Bytes, binding: &Binding) -> Self {
        Self {
            id,
            body,
            exchange: binding.exchange().clone(),
            queue: binding.queue().clone(),
            route_key: binding.route_key().clone(),
        }
    }

    /// Get the message id
    pub fn id(&self) -> &MessageId {
        &self.id
    }

    /// Get the message body
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Get the body as text, replacing invalid UTF-8
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Get the exchange name
    pub fn exchange(&self) -> &ExchangeName {
        &self.exchange
    }

    /// Get the queue name
    pub fn queue(&self) -> &QueueName {
        &self.queue
    }

    /// Get the route key
    pub fn route_key(&self) -> &RouteKey {
        &self.route_key
    }

    /// Rebuild the binding this message belongs to
    pub fn binding(&self) -> Binding {
        Binding::new(
            self.exchange.clone(),
            self.queue.clone(),
            self.route_key.clone(),
        )
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
