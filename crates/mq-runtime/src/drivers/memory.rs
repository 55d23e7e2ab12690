//! In-memory driver for tests and development.
//!
//! Storage is shaped like the Redis driver's structures so the same consume
//! algorithm is exercised without a broker: immediate queues are capped
//! FIFO logs, delayed queues are a score map plus payload map plus claim
//! set behind one mutex. Scores are kept in milliseconds so short delays
//! are observable in tests.
//!
//! Intended for unit testing of consumers, development, and as a reference
//! for the broker-backed drivers.

use crate::config::MemoryConfig;
use crate::consumer::{ConsumerWorker, Disposition, MessageHandler, ShutdownSignal};
use crate::driver::{ConsumeMode, DriverKind, QueueDriver};
use crate::error::QueueError;
use crate::message::{Binding, Message, MessageId};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Outcome of one delayed-queue poll iteration
enum DelayedPoll {
    Processed,
    Skipped,
    Empty,
}

/// One immediate-queue entry
#[derive(Debug, Clone)]
struct StreamEntry {
    id: MessageId,
    body: Bytes,
}

/// Delayed-queue state mirroring the Redis triple
#[derive(Debug, Default)]
struct DelayedQueue {
    /// Message id to ready-timestamp (milliseconds)
    scores: HashMap<String, i64>,
    /// Message id to body
    payload: HashMap<String, Bytes>,
    /// Ids claimed by an in-flight consumer
    claimed: HashSet<String>,
}

impl DelayedQueue {
    /// The due id at `offset`, scanning in (ready time, id) order
    fn due_at(&self, now: i64, offset: usize) -> Option<String> {
        let mut due: Vec<(&i64, &String)> = self
            .scores
            .iter()
            .filter(|(_, score)| **score <= now)
            .map(|(id, score)| (score, id))
            .collect();
        due.sort();
        due.get(offset).map(|(_, id)| (*id).clone())
    }

    fn remove(&mut self, id: &str) {
        self.scores.remove(id);
        self.payload.remove(id);
        self.claimed.remove(id);
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    streams: HashMap<String, VecDeque<StreamEntry>>,
    delayed: HashMap<String, DelayedQueue>,
}

/// In-memory driver behind a shared mutex
pub struct MemoryDriver {
    state: Arc<Mutex<MemoryState>>,
    config: MemoryConfig,
}

impl MemoryDriver {
    /// Create an empty driver
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            config,
        }
    }

    /// Number of entries currently stored for a binding's immediate queue
    pub fn stream_len(&self, binding: &Binding) -> usize {
        self.lock()
            .streams
            .get(&binding.storage_key())
            .map_or(0, VecDeque::len)
    }

    /// Number of ids currently pending in a binding's delay queue
    pub fn delayed_len(&self, binding: &Binding) -> usize {
        self.lock()
            .delayed
            .get(&binding.storage_key())
            .map_or(0, |q| q.scores.len())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().expect("memory driver lock poisoned")
    }

    /// Append an entry, trimming the oldest past the configured cap
    fn append_entry(&self, key: &str, entry: StreamEntry) {
        let mut state = self.lock();
        let queue = state.streams.entry(key.to_string()).or_default();
        queue.push_back(entry);
        while queue.len() > self.config.max_len {
            queue.pop_front();
        }
    }

    /// Sleep one poll interval, waking early on shutdown
    async fn idle(&self, shutdown: &mut ShutdownSignal) {
        tokio::select! {
            _ = shutdown.wait() => {}
            _ = tokio::time::sleep(self.config.poll_interval()) => {}
        }
    }

    async fn consume_stream(
        &self,
        binding: &Binding,
        handler: Arc<dyn MessageHandler>,
        worker: &mut ConsumerWorker,
        mut shutdown: ShutdownSignal,
    ) -> Result<(), QueueError> {
        let key = binding.storage_key();

        while !shutdown.is_shutdown() {
            let entry = self
                .lock()
                .streams
                .get_mut(&key)
                .and_then(VecDeque::pop_front);

            let Some(entry) = entry else {
                self.idle(&mut shutdown).await;
                continue;
            };

            let message = Message::new(entry.id, entry.body, binding);
            let succeeded = handler.handle(&message).await;
            match worker.dispose(&message, succeeded) {
                Disposition::Acknowledge | Disposition::DeadLetter => {}
                Disposition::Requeue => {
                    // Requeue-by-republish: back to the tail, same id
                    self.append_entry(
                        &key,
                        StreamEntry {
                            id: message.id().clone(),
                            body: message.body().clone(),
                        },
                    );
                }
            }
        }
        Ok(())
    }

    async fn poll_delayed_once(
        &self,
        binding: &Binding,
        base: &str,
        offset: &mut usize,
        handler: &Arc<dyn MessageHandler>,
        worker: &mut ConsumerWorker,
    ) -> DelayedPoll {
        let now = Utc::now().timestamp_millis();

        let candidate = self
            .lock()
            .delayed
            .get(base)
            .and_then(|q| q.due_at(now, *offset));
        let Some(id) = candidate else {
            *offset = 0;
            return DelayedPoll::Empty;
        };

        // Atomic claim: insert returns false when already in flight
        let claimed = self
            .lock()
            .delayed
            .entry(base.to_string())
            .or_default()
            .claimed
            .insert(id.clone());
        if !claimed {
            *offset += 1;
            return DelayedPoll::Skipped;
        }
        *offset = 0;

        let body = self
            .lock()
            .delayed
            .get(base)
            .and_then(|q| q.payload.get(&id).cloned());
        let Some(body) = body else {
            // Score entry without a payload; purge the orphan
            if let Some(queue) = self.lock().delayed.get_mut(base) {
                queue.remove(&id);
            }
            return DelayedPoll::Processed;
        };

        let message = Message::new(MessageId::from_delivery(id.clone()), body, binding);
        let succeeded = handler.handle(&message).await;
        let mut state = self.lock();
        let queue = state.delayed.entry(base.to_string()).or_default();
        match worker.dispose(&message, succeeded) {
            Disposition::Acknowledge | Disposition::DeadLetter => queue.remove(&id),
            Disposition::Requeue => {
                // Release the claim; the id stays due for a future poll
                queue.claimed.remove(&id);
            }
        }
        DelayedPoll::Processed
    }

    async fn consume_delayed(
        &self,
        binding: &Binding,
        handler: Arc<dyn MessageHandler>,
        worker: &mut ConsumerWorker,
        mut shutdown: ShutdownSignal,
    ) -> Result<(), QueueError> {
        let base = binding.storage_key();
        let mut offset = 0usize;

        while !shutdown.is_shutdown() {
            match self
                .poll_delayed_once(binding, &base, &mut offset, &handler, worker)
                .await
            {
                DelayedPoll::Processed | DelayedPoll::Skipped => {}
                DelayedPoll::Empty => self.idle(&mut shutdown).await,
            }
        }
        Ok(())
    }
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new(MemoryConfig::default())
    }
}

#[async_trait]
impl QueueDriver for MemoryDriver {
    async fn queue(&self, binding: &Binding, body: Bytes) -> Result<Message, QueueError> {
        let id = MessageId::generate();
        self.append_entry(
            &binding.storage_key(),
            StreamEntry {
                id: id.clone(),
                body: body.clone(),
            },
        );
        Ok(Message::new(id, body, binding))
    }

    async fn delay_queue(
        &self,
        binding: &Binding,
        body: Bytes,
        ttl: Duration,
    ) -> Result<Message, QueueError> {
        let id = MessageId::generate();
        let ready_at = Utc::now().timestamp_millis() + ttl.as_millis() as i64;

        let mut state = self.lock();
        let queue = state.delayed.entry(binding.storage_key()).or_default();
        // Keep an already-pending id's ready time and body
        queue
            .payload
            .entry(id.as_str().to_string())
            .or_insert_with(|| body.clone());
        queue.scores.entry(id.as_str().to_string()).or_insert(ready_at);
        drop(state);

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
        DriverKind::Memory
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
