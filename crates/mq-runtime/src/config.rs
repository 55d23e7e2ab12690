//! Configuration for driver selection and connections.
//!
//! Every field carries a serde default so an absent file or an entirely
//! unconfigured environment produces a valid configuration; a malformed
//! value is a hard error surfaced by the loader.

use crate::driver::DriverKind;
use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration for the message-queue client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageQueueConfig {
    /// Active driver
    pub driver: DriverKind,
    /// Global retry limit: a message is dead-lettered on its N-th failed
    /// delivery
    pub retry: u32,
    /// Per-driver connection settings
    pub connections: ConnectionSettings,
    /// Log sink settings (consumed by the CLI bootstrap)
    pub log: LogSettings,
}

impl Default for MessageQueueConfig {
    fn default() -> Self {
        Self {
            driver: DriverKind::Amqp,
            retry: 3,
            connections: ConnectionSettings::default(),
            log: LogSettings::default(),
        }
    }
}

impl MessageQueueConfig {
    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.retry == 0 {
            return Err(ConfigurationError::Invalid {
                message: "retry limit must be at least 1".to_string(),
            });
        }
        self.connections.redis.validate()?;
        self.connections.memory.validate()?;
        Ok(())
    }
}

/// Connection settings per driver
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub amqp: AmqpConfig,
    pub redis: RedisConfig,
    pub memory: MemoryConfig,
}

/// AMQP broker connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AmqpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub vhost: String,
}

impl Default for AmqpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5672,
            username: "guest".to_string(),
            password: "guest".to_string(),
            vhost: "/".to_string(),
        }
    }
}

impl AmqpConfig {
    /// Assemble the `amqp://` connection URI.
    ///
    /// The vhost is percent-encoded so the default `/` vhost round-trips
    /// through the URI path.
    pub fn url(&self) -> String {
        let vhost = self.vhost.replace('%', "%25").replace('/', "%2f");
        format!(
            "amqp://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, vhost
        )
    }
}

/// Redis connection and queue-shape settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub database: i64,
    /// Approximate cap on immediate-queue stream length; older entries are
    /// trimmed past it
    pub max_len: usize,
    /// Cadence of delayed-queue polls and the block window of stream reads
    pub poll_interval_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            database: 0,
            max_len: 1000,
            poll_interval_ms: 500,
        }
    }
}

impl RedisConfig {
    /// Poll interval as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_len == 0 {
            return Err(ConfigurationError::Invalid {
                message: "redis max_len must be at least 1".to_string(),
            });
        }
        if self.poll_interval_ms < 10 {
            return Err(ConfigurationError::Invalid {
                message: "redis poll_interval_ms must be at least 10".to_string(),
            });
        }
        Ok(())
    }
}

/// In-memory driver settings (tests and development)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Cap on immediate-queue length, mirroring the Redis stream trim
    pub max_len: usize,
    pub poll_interval_ms: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_len: 1000,
            poll_interval_ms: 20,
        }
    }
}

impl MemoryConfig {
    /// Poll interval as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_len == 0 {
            return Err(ConfigurationError::Invalid {
                message: "memory max_len must be at least 1".to_string(),
            });
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigurationError::Invalid {
                message: "memory poll_interval_ms must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Log sink settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
