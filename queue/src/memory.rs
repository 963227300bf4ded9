//! In-process broker.
//!
//! Mirrors the Redis transport's semantics closely enough for the pipeline
//! tests: FIFO per queue, one unsettled delivery per consumer, rejected
//! messages parked on `<queue><suffix>`, and unsettled deliveries returned to
//! the head of the queue when their consumer is dropped.

use crate::record_published;
use async_trait::async_trait;
use errors::TransportError;
use hcp_core::{
    Broker, DeadLetter, Delivery, DeliveryTag, Disposition, MessageConsumer, MessagePublisher
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Notify;
use tracing::debug;

#[derive(Debug, Clone)]
struct Stored {
    id: u64,
    body: Vec<u8>,
    redelivered: bool,
    reason: Option<String>
}

#[derive(Default)]
struct MemoryQueue {
    messages: Mutex<VecDeque<Stored>>,
    notify: Notify
}

impl MemoryQueue {
    fn push_back(&self, message: Stored) {
        self.messages.lock().push_back(message);
        self.notify.notify_one();
    }

    fn push_front(&self, message: Stored) {
        self.messages.lock().push_front(message);
        self.notify.notify_one();
    }
}

struct Inner {
    queues: Mutex<HashMap<String, Arc<MemoryQueue>>>,
    next_id: AtomicU64,
    dead_letter_suffix: String,
    closed: AtomicBool,
    fail_publish: AtomicBool,
    fail_probe: AtomicBool,
    closed_notify: Notify
}

/// Cheaply cloneable handle to one in-process broker.
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<Inner>
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(":dlq")
    }
}

impl MemoryBroker {
    pub fn new(dead_letter_suffix: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                queues: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                dead_letter_suffix: dead_letter_suffix.into(),
                closed: AtomicBool::new(false),
                fail_publish: AtomicBool::new(false),
                fail_probe: AtomicBool::new(false),
                closed_notify: Notify::new()
            })
        }
    }

    fn queue(&self, name: &str) -> Arc<MemoryQueue> {
        self.inner
            .queues
            .lock()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    fn enqueue(&self, queue: &str, body: Vec<u8>, reason: Option<String>) {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.queue(queue).push_back(Stored {
            id,
            body,
            redelivered: false,
            reason
        });
    }

    /// Bodies currently waiting on `queue`, oldest first. Unsettled
    /// deliveries are not included.
    pub fn messages(&self, queue: &str) -> Vec<Vec<u8>> {
        self.queue(queue)
            .messages
            .lock()
            .iter()
            .map(|m| m.body.clone())
            .collect()
    }

    pub fn len(&self, queue: &str) -> usize {
        self.queue(queue).messages.lock().len()
    }

    pub fn is_empty(&self, queue: &str) -> bool {
        self.len(queue) == 0
    }

    pub fn dead_letter_queue(&self, queue: &str) -> String {
        format!("{}{}", queue, self.inner.dead_letter_suffix)
    }

    /// Make every subsequent publish fail.
    pub fn fail_publishes(&self, fail: bool) {
        self.inner.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent probe fail.
    pub fn fail_probes(&self, fail: bool) {
        self.inner.fail_probe.store(fail, Ordering::SeqCst);
    }

    /// Shut the broker down: consumers waiting on an empty queue get
    /// [`TransportError::Closed`].
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.closed_notify.notify_waiters();
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn probe(&self) -> Result<(), TransportError> {
        if self.is_closed() || self.inner.fail_probe.load(Ordering::SeqCst) {
            return Err(TransportError::Connection {
                broker: "memory".to_string(),
                reason: "broker unavailable".to_string()
            });
        }
        Ok(())
    }

    async fn publisher(&self) -> Result<Box<dyn MessagePublisher>, TransportError> {
        Ok(Box::new(MemoryPublisher {
            broker: self.clone()
        }))
    }

    async fn consumer(&self, queue: &str) -> Result<Box<dyn MessageConsumer>, TransportError> {
        Ok(Box::new(MemoryConsumer {
            broker: self.clone(),
            queue_name: queue.to_string(),
            queue: self.queue(queue),
            in_flight: None
        }))
    }

    async fn dead_letters(
        &self,
        queue: &str,
        count: usize
    ) -> Result<Vec<DeadLetter>, TransportError> {
        let dlq = self.queue(&self.dead_letter_queue(queue));
        let messages = dlq.messages.lock();
        Ok(messages
            .iter()
            .take(count)
            .map(|m| DeadLetter {
                id: m.id.to_string(),
                body: m.body.clone(),
                reason: m.reason.clone()
            })
            .collect())
    }
}

pub struct MemoryPublisher {
    broker: MemoryBroker
}

#[async_trait]
impl MessagePublisher for MemoryPublisher {
    async fn publish(&self, queue: &str, body: &[u8]) -> Result<(), TransportError> {
        if self.broker.is_closed() || self.broker.inner.fail_publish.load(Ordering::SeqCst) {
            return Err(TransportError::Publish {
                queue: queue.to_string(),
                reason: "broker unavailable".to_string()
            });
        }

        self.broker.enqueue(queue, body.to_vec(), None);
        record_published(queue);
        Ok(())
    }
}

pub struct MemoryConsumer {
    broker: MemoryBroker,
    queue_name: String,
    queue: Arc<MemoryQueue>,
    in_flight: Option<Stored>
}

#[async_trait]
impl MessageConsumer for MemoryConsumer {
    fn queue(&self) -> &str {
        &self.queue_name
    }

    async fn receive(&mut self) -> Result<Delivery, TransportError> {
        if let Some(pending) = &self.in_flight {
            return Err(TransportError::Consume {
                queue: self.queue_name.clone(),
                reason: format!("delivery {} has not been settled", pending.id)
            });
        }

        let queue = Arc::clone(&self.queue);
        let inner = Arc::clone(&self.broker.inner);

        loop {
            // Registered before the checks so a wakeup in between is not lost.
            let woken = queue.notify.notified();
            let closed = inner.closed_notify.notified();

            let next = queue.messages.lock().pop_front();
            if let Some(message) = next {
                let delivery = Delivery {
                    tag: DeliveryTag::new(message.id.to_string()),
                    body: message.body.clone(),
                    redelivered: message.redelivered
                };
                self.in_flight = Some(message);
                return Ok(delivery);
            }

            if inner.closed.load(Ordering::SeqCst) {
                return Err(TransportError::Closed {
                    queue: self.queue_name.clone()
                });
            }

            tokio::select! {
                () = woken => {}
                () = closed => {}
            }
        }
    }

    async fn settle(
        &mut self,
        tag: DeliveryTag,
        disposition: Disposition
    ) -> Result<(), TransportError> {
        let message = match self.in_flight.take() {
            Some(message) if message.id.to_string() == tag.as_str() => message,
            other => {
                self.in_flight = other;
                return Err(TransportError::Settle {
                    queue: self.queue_name.clone(),
                    tag: tag.to_string(),
                    reason: "unknown delivery tag".to_string()
                });
            }
        };

        match disposition {
            Disposition::Ack => {}
            Disposition::Reject { requeue: false } => {
                let dlq = self.broker.dead_letter_queue(&self.queue_name);
                self.broker.enqueue(&dlq, message.body, Some("rejected".to_string()));
            }
            Disposition::Reject { requeue: true } => {
                self.queue.push_back(Stored {
                    redelivered: true,
                    ..message
                });
            }
        }

        debug!(
            queue = %self.queue_name,
            tag = %tag,
            disposition = disposition.label(),
            "Delivery settled"
        );
        Ok(())
    }
}

impl Drop for MemoryConsumer {
    fn drop(&mut self) {
        if let Some(message) = self.in_flight.take() {
            self.queue.push_front(Stored {
                redelivered: true,
                ..message
            });
        }
    }
}
