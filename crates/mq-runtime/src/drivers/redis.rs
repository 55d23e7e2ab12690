//! Redis driver.
//!
//! Immediate queues are append-only streams read through a consumer group
//! named after the exchange. Delayed queues are emulated with three
//! structures sharing a base key: a sorted set mapping message id to its
//! ready timestamp, a `{base}.payload` hash holding bodies, and a
//! `{base}.ack` set marking ids claimed by an in-flight consumer. The split
//! keeps "what is due", "what is the content", and "what is being processed"
//! independent, approximating visibility-timeout semantics without native
//! broker support. Claims are taken atomically through SADD's return value,
//! but the overall guarantee stays at-least-once: nothing reaps the claim of
//! a consumer that died mid-processing.

use crate::config::RedisConfig;
use crate::consumer::{ConsumerWorker, Disposition, MessageHandler, ShutdownSignal};
use crate::driver::{ConsumeMode, DriverKind, QueueDriver};
use crate::error::QueueError;
use crate::message::{Binding, Message, MessageId};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::streams::{StreamId, StreamMaxlen, StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, Client, ConnectionAddr, ConnectionInfo, RedisConnectionInfo, RedisError};
use std::sync::Arc;
use std::time::Duration;

/// Outcome of one delayed-queue poll iteration
enum DelayedPoll {
    /// A due id was claimed and resolved
    Processed,
    /// The id at the current offset is in flight on another consumer
    Skipped,
    /// Nothing due
    Empty,
}

/// Redis driver over a multiplexed connection manager
pub struct RedisDriver {
    manager: ConnectionManager,
    config: RedisConfig,
}

impl RedisDriver {
    /// Connect, authenticate, select the database, and probe with PING
    pub async fn connect(config: RedisConfig) -> Result<Self, QueueError> {
        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(config.host.clone(), config.port),
            redis: RedisConnectionInfo {
                db: config.database,
                username: None,
                password: config.password.clone(),
            },
        };

        let client = Client::open(info)
            .map_err(|e| QueueError::connection(format!("Redis client setup failed: {e}")))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| QueueError::connection(format!("Redis connection failed: {e}")))?;

        let mut probe = manager.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut probe)
            .await
            .map_err(|e| QueueError::connection(format!("Redis connection test failed: {e}")))?;

        Ok(Self { manager, config })
    }

    /// The connection configuration this driver was built with
    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    /// Sleep one poll interval, waking early on shutdown
    async fn idle(&self, shutdown: &mut ShutdownSignal) {
        tokio::select! {
            _ = shutdown.wait() => {}
            _ = tokio::time::sleep(self.config.poll_interval()) => {}
        }
    }

    /// Append an entry to an immediate-queue stream, trimming past the cap
    async fn append_entry(
        &self,
        conn: &mut ConnectionManager,
        key: &str,
        id: &MessageId,
        body: &[u8],
    ) -> Result<(), RedisError> {
        let _: String = conn
            .xadd_maxlen(
                key,
                StreamMaxlen::Approx(self.config.max_len),
                "*",
                &[
                    ("message_id", id.as_str().as_bytes()),
                    ("payload", body),
                ],
            )
            .await?;
        Ok(())
    }

    /// Read and resolve at most one new stream entry.
    ///
    /// Returns `Ok(true)` when an entry was handled, `Ok(false)` when the
    /// block window elapsed with nothing to read.
    #[allow(clippy::too_many_arguments)]
    async fn poll_stream_once(
        &self,
        conn: &mut ConnectionManager,
        key: &str,
        group: &str,
        consumer_name: &str,
        binding: &Binding,
        handler: &Arc<dyn MessageHandler>,
        worker: &mut ConsumerWorker,
    ) -> Result<bool, RedisError> {
        let options = StreamReadOptions::default()
            .group(group, consumer_name)
            .count(1)
            .block(self.config.poll_interval_ms as usize);
        let reply: Option<StreamReadReply> =
            conn.xread_options(&[key], &[">"], &options).await?;

        let entry = reply
            .and_then(|r| r.keys.into_iter().next())
            .and_then(|k| k.ids.into_iter().next());
        let Some(entry) = entry else {
            return Ok(false);
        };

        let Some((id, body)) = decode_stream_entry(&entry) else {
            // Entry without a payload field; acknowledge and drop it
            let _: i64 = conn.xack(key, group, &[entry.id.as_str()]).await?;
            return Ok(true);
        };

        let message = Message::new(id, body, binding);
        let succeeded = handler.handle(&message).await;
        match worker.dispose(&message, succeeded) {
            Disposition::Acknowledge | Disposition::DeadLetter => {
                let _: i64 = conn.xack(key, group, &[entry.id.as_str()]).await?;
            }
            Disposition::Requeue => {
                // Requeue-by-republish: the entry moves to the stream tail
                // but keeps its message id, so the retry mark accumulates
                let _: i64 = conn.xack(key, group, &[entry.id.as_str()]).await?;
                self.append_entry(conn, key, message.id(), message.body().as_ref())
                    .await?;
            }
        }
        Ok(true)
    }

    /// Scan the sorted set for one due id and resolve it.
    ///
    /// An id claimed by another consumer advances the scan offset; a
    /// genuinely new id, or an empty poll, resets the offset to zero.
    #[allow(clippy::too_many_arguments)]
    async fn poll_delayed_once(
        &self,
        conn: &mut ConnectionManager,
        binding: &Binding,
        base: &str,
        payload_key: &str,
        ack_key: &str,
        offset: &mut isize,
        handler: &Arc<dyn MessageHandler>,
        worker: &mut ConsumerWorker,
    ) -> Result<DelayedPoll, RedisError> {
        let now = Utc::now().timestamp();
        let due: Vec<String> = conn
            .zrangebyscore_limit(base, 0i64, now, *offset, 1)
            .await?;
        let Some(id) = due.into_iter().next() else {
            *offset = 0;
            return Ok(DelayedPoll::Empty);
        };

        // SADD returning 0 means another consumer holds the claim
        let claimed: i64 = conn.sadd(ack_key, &id).await?;
        if claimed == 0 {
            *offset += 1;
            return Ok(DelayedPoll::Skipped);
        }
        *offset = 0;

        if let Err(e) = self
            .process_claimed(conn, binding, base, payload_key, ack_key, &id, handler, worker)
            .await
        {
            // Release the claim so a future poll can retry the id
            let _: Result<i64, RedisError> = conn.srem(ack_key, &id).await;
            return Err(e);
        }
        Ok(DelayedPoll::Processed)
    }

    /// Run the callback for a claimed id and apply its disposition
    #[allow(clippy::too_many_arguments)]
    async fn process_claimed(
        &self,
        conn: &mut ConnectionManager,
        binding: &Binding,
        base: &str,
        payload_key: &str,
        ack_key: &str,
        id: &str,
        handler: &Arc<dyn MessageHandler>,
        worker: &mut ConsumerWorker,
    ) -> Result<(), RedisError> {
        let body: Option<Vec<u8>> = conn.hget(payload_key, id).await?;
        let Some(body) = body else {
            // Score entry without a payload; purge the orphan
            remove_delayed_entry(conn, base, payload_key, ack_key, id).await?;
            return Ok(());
        };

        let message = Message::new(MessageId::from_delivery(id), Bytes::from(body), binding);
        let succeeded = handler.handle(&message).await;
        match worker.dispose(&message, succeeded) {
            Disposition::Acknowledge | Disposition::DeadLetter => {
                remove_delayed_entry(conn, base, payload_key, ack_key, id).await?;
            }
            Disposition::Requeue => {
                // Release the claim; the id stays due and a future poll
                // picks it up again
                let _: i64 = conn.srem(ack_key, id).await?;
            }
        }
        Ok(())
    }

    async fn consume_stream(
        &self,
        binding: &Binding,
        handler: Arc<dyn MessageHandler>,
        worker: &mut ConsumerWorker,
        mut shutdown: ShutdownSignal,
    ) -> Result<(), QueueError> {
        let key = binding.storage_key();
        let group = binding.exchange().as_str().to_string();
        let mut conn = self.manager.clone();

        // Consumer-group bootstrap; an existing group is fine
        let created: Result<String, RedisError> =
            conn.xgroup_create_mkstream(&key, &group, "0").await;
        if let Err(e) = created {
            if !is_busygroup(&e) {
                return Err(QueueError::QueueDeclaration {
                    queue: binding.queue().to_string(),
                    message: format!("consumer group creation failed: {e}"),
                });
            }
        }

        let consumer_name = format!("{}-{}", binding.queue(), MessageId::generate());

        while !shutdown.is_shutdown() {
            match self
                .poll_stream_once(
                    &mut conn,
                    &key,
                    &group,
                    &consumer_name,
                    binding,
                    &handler,
                    worker,
                )
                .await
            {
                // The blocking read already paces empty polls
                Ok(_) => {}
                Err(e) => {
                    worker
                        .sink()
                        .consumer_error("redis stream consumer", &e.to_string());
                    self.idle(&mut shutdown).await;
                }
            }
        }
        Ok(())
    }

    async fn consume_delayed(
        &self,
        binding: &Binding,
        handler: Arc<dyn MessageHandler>,
        worker: &mut ConsumerWorker,
        mut shutdown: ShutdownSignal,
    ) -> Result<(), QueueError> {
        let base = binding.storage_key();
        let payload_key = payload_key(&base);
        let ack_key = ack_key(&base);
        let mut conn = self.manager.clone();
        let mut offset = 0isize;

        while !shutdown.is_shutdown() {
            match self
                .poll_delayed_once(
                    &mut conn,
                    binding,
                    &base,
                    &payload_key,
                    &ack_key,
                    &mut offset,
                    &handler,
                    worker,
                )
                .await
            {
                Ok(DelayedPoll::Processed) | Ok(DelayedPoll::Skipped) => {}
                Ok(DelayedPoll::Empty) => self.idle(&mut shutdown).await,
                Err(e) => {
                    worker
                        .sink()
                        .consumer_error("redis delayed consumer", &e.to_string());
                    self.idle(&mut shutdown).await;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl QueueDriver for RedisDriver {
    async fn queue(&self, binding: &Binding, body: Bytes) -> Result<Message, QueueError> {
        let key = binding.storage_key();
        let id = MessageId::generate();
        let mut conn = self.manager.clone();

        self.append_entry(&mut conn, &key, &id, body.as_ref())
            .await
            .map_err(|e| publish_error(binding, e))?;

        Ok(Message::new(id, body, binding))
    }

    async fn delay_queue(
        &self,
        binding: &Binding,
        body: Bytes,
        ttl: Duration,
    ) -> Result<Message, QueueError> {
        let base = binding.storage_key();
        let id = MessageId::generate();
        let ready_at = Utc::now().timestamp() + ttl.as_secs() as i64;
        let mut conn = self.manager.clone();

        let _: () = conn
            .hset(payload_key(&base), id.as_str(), body.as_ref())
            .await
            .map_err(|e| publish_error(binding, e))?;

        // NX keeps the ready time of an id that is somehow already pending
        let _: i64 = redis::cmd("ZADD")
            .arg(&base)
            .arg("NX")
            .arg(ready_at)
            .arg(id.as_str())
            .query_async(&mut conn)
            .await
            .map_err(|e| publish_error(binding, e))?;

        Ok(Message::new(id, body, binding))
    }

    async fn consume(
        &self,
        binding: &Binding,
        mode: ConsumeMode,
        handler: Arc<dyn MessageHandler>,
        worker: &mut ConsumerWorker,
        shutdown: ShutdownSignal,
    ) -> Result<(), QueueError> {
        match mode {
            ConsumeMode::Immediate => {
                self.consume_stream(binding, handler, worker, shutdown).await
            }
            ConsumeMode::Delayed => {
                self.consume_delayed(binding, handler, worker, shutdown).await
            }
        }
    }

    fn kind(&self) -> DriverKind {
        DriverKind::Redis
    }
}

/// Hash holding delayed-message bodies
fn payload_key(base: &str) -> String {
    format!("{base}.payload")
}

/// Set marking delayed ids claimed by an in-flight consumer
fn ack_key(base: &str) -> String {
    format!("{base}.ack")
}

/// Remove a delayed id from all three structures (terminal disposition)
async fn remove_delayed_entry(
    conn: &mut ConnectionManager,
    base: &str,
    payload_key: &str,
    ack_key: &str,
    id: &str,
) -> Result<(), RedisError> {
    let _: i64 = conn.zrem(base, id).await?;
    let _: i64 = conn.hdel(payload_key, id).await?;
    let _: i64 = conn.srem(ack_key, id).await?;
    Ok(())
}

/// Extract the message id and payload from a stream entry.
///
/// Entries are written with explicit `message_id` and `payload` fields; an
/// entry missing the id field falls back to the broker-assigned stream id.
fn decode_stream_entry(entry: &StreamId) -> Option<(MessageId, Bytes)> {
    let payload: Vec<u8> = entry.get("payload")?;
    let id = entry
        .get::<String>("message_id")
        .map(MessageId::from_delivery)
        .unwrap_or_else(|| MessageId::from_delivery(entry.id.clone()));
    Some((id, Bytes::from(payload)))
}

fn is_busygroup(error: &RedisError) -> bool {
    error.code() == Some("BUSYGROUP") || error.to_string().contains("BUSYGROUP")
}

fn publish_error(binding: &Binding, error: RedisError) -> QueueError {
    QueueError::Publish {
        exchange: binding.exchange().to_string(),
        route_key: binding.route_key().to_string(),
        message: error.to_string(),
    }
}

#[cfg(test)]
#[path = "redis_tests.rs"]
mod tests;
