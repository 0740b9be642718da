//! In-memory broker implementation for development and testing.
//!
//! This module provides a process-local broker that:
//! - Keeps one FIFO queue per queue name, created on first use
//! - Assigns per-queue sequence numbers starting at 1
//! - Implements bounded-wait receive that wakes up as soon as a message arrives
//! - Removes a message from its queue when it is received
//! - Counts session and client acquisitions and releases
//!
//! The counters in [`BrokerStats`] make the broker usable as a
//! resource-tracking fake: tests can assert that every session and queue
//! client created during an operation was also closed.

use crate::config::{BrokerEndpoint, TransportKind};
use crate::credential::AccessToken;
use crate::error::RelayError;
use crate::message::{BrokeredMessage, OutboundMessage, QueueName, SequenceNumber, Timestamp};
use crate::session::{BrokerSession, QueueClient};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Duration;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// ============================================================================
// Configuration and statistics
// ============================================================================

/// In-memory broker configuration
#[derive(Debug, Clone, Default)]
pub struct InMemoryBrokerConfig {
    /// Maximum number of messages held per queue (`None` = unbounded)
    pub max_queue_size: Option<usize>,

    /// When set, sessions are only granted to this exact token
    pub required_token: Option<String>,
}

/// Snapshot of broker activity counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrokerStats {
    pub sessions_opened: u64,
    pub sessions_closed: u64,
    pub clients_opened: u64,
    pub clients_closed: u64,
    pub sends: u64,
    pub receives: u64,
}

impl BrokerStats {
    /// Number of sessions created but not yet closed
    pub fn open_sessions(&self) -> u64 {
        self.sessions_opened.saturating_sub(self.sessions_closed)
    }

    /// Number of queue clients created but not yet closed
    pub fn open_clients(&self) -> u64 {
        self.clients_opened.saturating_sub(self.clients_closed)
    }

    /// Total number of broker interactions of any kind
    pub fn total_calls(&self) -> u64 {
        self.sessions_opened + self.clients_opened + self.sends + self.receives
    }
}

#[derive(Default)]
struct Counters {
    sessions_opened: AtomicU64,
    sessions_closed: AtomicU64,
    clients_opened: AtomicU64,
    clients_closed: AtomicU64,
    sends: AtomicU64,
    receives: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> BrokerStats {
        BrokerStats {
            sessions_opened: self.sessions_opened.load(Ordering::SeqCst),
            sessions_closed: self.sessions_closed.load(Ordering::SeqCst),
            clients_opened: self.clients_opened.load(Ordering::SeqCst),
            clients_closed: self.clients_closed.load(Ordering::SeqCst),
            sends: self.sends.load(Ordering::SeqCst),
            receives: self.receives.load(Ordering::SeqCst),
        }
    }
}

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// Internal state for a single queue
struct InMemoryQueue {
    messages: VecDeque<BrokeredMessage>,
    next_sequence: u64,
    notify: Arc<Notify>,
}

impl InMemoryQueue {
    fn new() -> Self {
        Self {
            messages: VecDeque::new(),
            next_sequence: 1,
            notify: Arc::new(Notify::new()),
        }
    }
}

struct BrokerState {
    queues: Mutex<HashMap<QueueName, InMemoryQueue>>,
    config: InMemoryBrokerConfig,
    counters: Counters,
}

// ============================================================================
// InMemoryBroker
// ============================================================================

/// Process-local broker shared by every session opened against it
#[derive(Clone)]
pub struct InMemoryBroker {
    state: Arc<BrokerState>,
}

impl InMemoryBroker {
    pub fn new(config: InMemoryBrokerConfig) -> Self {
        Self {
            state: Arc::new(BrokerState {
                queues: Mutex::new(HashMap::new()),
                config,
                counters: Counters::default(),
            }),
        }
    }

    /// Open a session, checking the token against the configured requirement
    pub fn open_session(
        &self,
        endpoint: BrokerEndpoint,
        token: &AccessToken,
    ) -> Result<InMemorySession, RelayError> {
        if let Some(required) = &self.state.config.required_token {
            if token.secret() != required {
                return Err(RelayError::Authentication {
                    message: "token rejected by in-memory broker".to_string(),
                });
            }
        }

        self.state.counters.sessions_opened.fetch_add(1, Ordering::SeqCst);
        debug!(endpoint = %endpoint, "In-memory session opened");

        Ok(InMemorySession {
            broker: self.clone(),
            endpoint,
        })
    }

    /// Current activity counters
    pub fn stats(&self) -> BrokerStats {
        self.state.counters.snapshot()
    }

    /// Number of messages waiting in `queue`
    pub fn queue_depth(&self, queue: &QueueName) -> usize {
        self.lock_queues()
            .get(queue)
            .map_or(0, |q| q.messages.len())
    }

    /// Enqueue raw bytes directly, bypassing sessions and validation
    ///
    /// Lets tests place payloads on a queue that a relay send would refuse,
    /// such as bytes that are not valid UTF-8.
    pub fn enqueue_raw(&self, queue: &QueueName, body: impl Into<Bytes>) -> SequenceNumber {
        let mut queues = self.lock_queues();
        let entry = queues.entry(queue.clone()).or_insert_with(InMemoryQueue::new);
        Self::push(entry, body.into())
    }

    fn lock_queues(&self) -> MutexGuard<'_, HashMap<QueueName, InMemoryQueue>> {
        // A panic while holding the lock cannot leave a queue half-updated
        self.state
            .queues
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(queue: &mut InMemoryQueue, body: Bytes) -> SequenceNumber {
        let sequence_number = SequenceNumber::new(queue.next_sequence);
        queue.next_sequence += 1;
        queue.messages.push_back(
            BrokeredMessage::new(sequence_number, body).with_enqueued_at(Timestamp::now()),
        );
        queue.notify.notify_one();
        sequence_number
    }

    fn enqueue(&self, queue: &QueueName, message: &OutboundMessage) -> Result<(), RelayError> {
        let mut queues = self.lock_queues();
        let entry = queues.entry(queue.clone()).or_insert_with(InMemoryQueue::new);

        if let Some(max) = self.state.config.max_queue_size {
            if entry.messages.len() >= max {
                return Err(RelayError::Send {
                    queue_name: queue.to_string(),
                    message: format!("queue is full ({} messages)", max),
                });
            }
        }

        let sequence_number = Self::push(entry, message.body().clone());
        debug!(queue = %queue, sequence_number = %sequence_number, "Message enqueued");
        Ok(())
    }

    /// Pop the head message, or hand back the queue's notifier to wait on
    fn dequeue(&self, queue: &QueueName) -> Result<BrokeredMessage, Arc<Notify>> {
        let mut queues = self.lock_queues();
        let entry = queues.entry(queue.clone()).or_insert_with(InMemoryQueue::new);
        match entry.messages.pop_front() {
            Some(message) => Ok(message),
            None => Err(Arc::clone(&entry.notify)),
        }
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new(InMemoryBrokerConfig::default())
    }
}

impl std::fmt::Debug for InMemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBroker")
            .field("max_queue_size", &self.state.config.max_queue_size)
            .field("stats", &self.stats())
            .finish()
    }
}

// ============================================================================
// InMemorySession
// ============================================================================

/// Session against an [`InMemoryBroker`]
pub struct InMemorySession {
    broker: InMemoryBroker,
    endpoint: BrokerEndpoint,
}

#[async_trait]
impl BrokerSession for InMemorySession {
    fn endpoint(&self) -> &BrokerEndpoint {
        &self.endpoint
    }

    fn transport(&self) -> TransportKind {
        TransportKind::InMemory
    }

    async fn create_queue_client<'a>(
        &'a self,
        queue: &QueueName,
    ) -> Result<Box<dyn QueueClient + 'a>, RelayError> {
        self.broker
            .state
            .counters
            .clients_opened
            .fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(InMemoryQueueClient {
            session: self,
            queue: queue.clone(),
        }))
    }

    async fn close(self: Box<Self>) -> Result<(), RelayError> {
        self.broker
            .state
            .counters
            .sessions_closed
            .fetch_add(1, Ordering::SeqCst);
        debug!(endpoint = %self.endpoint, "In-memory session closed");
        Ok(())
    }
}

// ============================================================================
// InMemoryQueueClient
// ============================================================================

struct InMemoryQueueClient<'a> {
    session: &'a InMemorySession,
    queue: QueueName,
}

impl InMemoryQueueClient<'_> {
    fn counters(&self) -> &Counters {
        &self.session.broker.state.counters
    }
}

#[async_trait]
impl QueueClient for InMemoryQueueClient<'_> {
    fn queue_name(&self) -> &QueueName {
        &self.queue
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), RelayError> {
        self.counters().sends.fetch_add(1, Ordering::SeqCst);
        self.session.broker.enqueue(&self.queue, message)
    }

    async fn receive(&self, timeout: Duration) -> Result<Option<BrokeredMessage>, RelayError> {
        self.counters().receives.fetch_add(1, Ordering::SeqCst);

        let wait = timeout.to_std().unwrap_or_default();
        let deadline = Instant::now() + wait;

        loop {
            let notify = match self.session.broker.dequeue(&self.queue) {
                Ok(message) => return Ok(Some(message)),
                Err(notify) => notify,
            };

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            // notify_one stores a permit, so a send racing the dequeue above
            // still wakes this wait
            let _ = tokio::time::timeout(deadline - now, notify.notified()).await;
        }
    }

    async fn close(self: Box<Self>) -> Result<(), RelayError> {
        self.counters().clients_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
