//! # Queue Transport
//!
//! Durable named queues with explicit per-delivery dispositions.
//!
//! - [`RedisBroker`]: Redis Streams with one consumer group per queue
//! - [`MemoryBroker`]: in-process broker with the same semantics, for tests
//!   and local runs
//!
//! Both hand out a fresh connection or handle for every publisher and
//! consumer, so no handle is ever shared between workers.

pub mod memory;
pub mod streams;

pub use memory::MemoryBroker;
pub use streams::{RedisBroker, RedisConsumer, RedisPublisher};

/// Field holding the message payload inside a stream entry.
pub const BODY_FIELD: &str = "body";

/// Field holding the rejection reason inside a dead-letter entry.
pub const REASON_FIELD: &str = "reason";

pub(crate) fn record_published(queue: &str) {
    metrics::counter!("hcp_sync_published_total", "queue" => queue.to_string()).increment(1);
}
