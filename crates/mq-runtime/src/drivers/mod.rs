//! Queue driver implementations.
//!
//! This module contains the concrete implementations of the
//! [`QueueDriver`](crate::driver::QueueDriver) contract for the supported
//! backends.

pub mod amqp;
pub mod memory;
pub mod redis;

pub use amqp::AmqpDriver;
pub use memory::MemoryDriver;
pub use redis::RedisDriver;
