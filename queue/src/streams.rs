//! Redis Streams transport.
//!
//! A queue is a stream key. Every consumer reads through the configured
//! consumer group with `COUNT 1`, so at most one delivery is unacknowledged
//! per worker. Entries stay in the group's pending list until settled, which
//! is what makes a crashed worker's message come back after restart. An idle
//! consumer also claims entries another consumer left pending for longer
//! than `claim_idle_ms`, so a replica that never returns under the same name
//! does not strand its last delivery.

use crate::{BODY_FIELD, REASON_FIELD, record_published};
use async_trait::async_trait;
use config::{BrokerConfig, QueueConfig};
use errors::TransportError;
use hcp_core::{
    Broker, DeadLetter, Delivery, DeliveryTag, Disposition, MessageConsumer, MessagePublisher
};
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamAutoClaimReply, StreamId, StreamRangeReply, StreamReadReply};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Redis Streams broker.
///
/// Holds only the client; connections are opened per publisher, per
/// consumer and per probe.
pub struct RedisBroker {
    client: redis::Client,
    display_addr: String,
    group: String,
    consumer_prefix: String,
    dead_letter_suffix: String,
    probe_queue: String,
    poll_interval: Duration,
    claim_idle_ms: u64
}

impl RedisBroker {
    pub fn from_config(
        broker: &BrokerConfig,
        queues: &QueueConfig
    ) -> Result<Self, TransportError> {
        let client = redis::Client::open(broker.connection_url()).map_err(|e| {
            TransportError::Connection {
                broker: broker.display_addr(),
                reason: e.to_string()
            }
        })?;

        Ok(Self {
            client,
            display_addr: broker.display_addr(),
            group: broker.consumer_group.clone(),
            consumer_prefix: broker.consumer_name.clone(),
            dead_letter_suffix: queues.dead_letter_suffix.clone(),
            probe_queue: queues.probe.clone(),
            poll_interval: Duration::from_millis(broker.poll_interval_ms),
            claim_idle_ms: broker.claim_idle_ms
        })
    }

    async fn connect(&self) -> Result<MultiplexedConnection, TransportError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| TransportError::Connection {
                broker: self.display_addr.clone(),
                reason: e.to_string()
            })
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn probe(&self) -> Result<(), TransportError> {
        let mut conn = self.connect().await?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| TransportError::Connection {
                broker: self.display_addr.clone(),
                reason: e.to_string()
            })?;

        ensure_group(&mut conn, &self.probe_queue, &self.group).await?;

        info!(broker = %self.display_addr, queue = %self.probe_queue, "Broker probe succeeded");
        Ok(())
    }

    async fn publisher(&self) -> Result<Box<dyn MessagePublisher>, TransportError> {
        let conn = self.connect().await?;
        Ok(Box::new(RedisPublisher { conn }))
    }

    async fn consumer(&self, queue: &str) -> Result<Box<dyn MessageConsumer>, TransportError> {
        let mut conn = self.connect().await?;
        ensure_group(&mut conn, queue, &self.group).await?;

        let consumer = RedisConsumer {
            conn,
            queue: queue.to_string(),
            group: self.group.clone(),
            consumer: format!("{}-{}", self.consumer_prefix, queue),
            dead_letter: format!("{}{}", queue, self.dead_letter_suffix),
            poll_interval: self.poll_interval,
            claim_idle_ms: self.claim_idle_ms,
            claim_cursor: CLAIM_START.to_string(),
            draining_pending: true,
            in_flight: None
        };

        info!(
            queue = %consumer.queue,
            group = %consumer.group,
            consumer = %consumer.consumer,
            "Consumer attached"
        );
        Ok(Box::new(consumer))
    }

    async fn dead_letters(
        &self,
        queue: &str,
        count: usize
    ) -> Result<Vec<DeadLetter>, TransportError> {
        let mut conn = self.connect().await?;
        let stream_key = format!("{}{}", queue, self.dead_letter_suffix);

        let reply: StreamRangeReply = redis::cmd("XRANGE")
            .arg(&stream_key)
            .arg("-")
            .arg("+")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await
            .map_err(|e| TransportError::Consume {
                queue: stream_key.clone(),
                reason: e.to_string()
            })?;

        Ok(reply
            .ids
            .iter()
            .map(|entry| DeadLetter {
                id: entry.id.clone(),
                body: field_bytes(entry, BODY_FIELD).unwrap_or_default(),
                reason: field_bytes(entry, REASON_FIELD)
                    .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            })
            .collect())
    }
}

/// `XGROUP CREATE ... MKSTREAM`, tolerating an existing group.
async fn ensure_group(
    conn: &mut MultiplexedConnection,
    queue: &str,
    group: &str
) -> Result<(), TransportError> {
    let result: redis::RedisResult<()> = redis::cmd("XGROUP")
        .arg("CREATE")
        .arg(queue)
        .arg(group)
        .arg("0")
        .arg("MKSTREAM")
        .query_async(conn)
        .await;

    match result {
        Ok(()) => {
            debug!(queue = %queue, group = %group, "Consumer group created");
            Ok(())
        }
        Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
        Err(e) => Err(TransportError::Consume {
            queue: queue.to_string(),
            reason: format!("cannot create consumer group {group}: {e}")
        })
    }
}

fn field_bytes(entry: &StreamId, field: &str) -> Option<Vec<u8>> {
    match entry.map.get(field) {
        Some(redis::Value::BulkString(bytes)) => Some(bytes.clone()),
        Some(redis::Value::SimpleString(text)) => Some(text.clone().into_bytes()),
        _ => None
    }
}

/// Publisher bound to one connection.
pub struct RedisPublisher {
    conn: MultiplexedConnection
}

#[async_trait]
impl MessagePublisher for RedisPublisher {
    async fn publish(&self, queue: &str, body: &[u8]) -> Result<(), TransportError> {
        let mut conn = self.conn.clone();

        let id: String = redis::cmd("XADD")
            .arg(queue)
            .arg("*")
            .arg(BODY_FIELD)
            .arg(body)
            .query_async(&mut conn)
            .await
            .map_err(|e| TransportError::Publish {
                queue: queue.to_string(),
                reason: e.to_string()
            })?;

        debug!(queue = %queue, id = %id, bytes = body.len(), "Message published");
        record_published(queue);
        Ok(())
    }
}

const CLAIM_START: &str = "0-0";

struct InFlight {
    id: String,
    body: Vec<u8>
}

/// Consumer bound to one queue and one connection.
pub struct RedisConsumer {
    conn: MultiplexedConnection,
    queue: String,
    group: String,
    consumer: String,
    dead_letter: String,
    poll_interval: Duration,
    claim_idle_ms: u64,
    /// Where the next `XAUTOCLAIM` scan of the group's pending list resumes.
    claim_cursor: String,
    /// Reading our own pending list (`0`) before switching to new entries (`>`).
    draining_pending: bool,
    in_flight: Option<InFlight>
}

impl RedisConsumer {
    async fn read_one(&mut self) -> Result<Option<StreamId>, TransportError> {
        let start_id = if self.draining_pending { "0" } else { ">" };

        let reply: Option<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg(1)
            .arg("STREAMS")
            .arg(&self.queue)
            .arg(start_id)
            .query_async(&mut self.conn)
            .await
            .map_err(|e| TransportError::Consume {
                queue: self.queue.clone(),
                reason: e.to_string()
            })?;

        Ok(reply
            .and_then(|reply| reply.keys.into_iter().next())
            .and_then(|key| key.ids.into_iter().next()))
    }

    /// Takes over one entry another consumer of the group left pending.
    async fn claim_one(&mut self) -> Result<Option<StreamId>, TransportError> {
        let reply: StreamAutoClaimReply = redis::cmd("XAUTOCLAIM")
            .arg(&self.queue)
            .arg(&self.group)
            .arg(&self.consumer)
            .arg(self.claim_idle_ms)
            .arg(&self.claim_cursor)
            .arg("COUNT")
            .arg(1)
            .query_async(&mut self.conn)
            .await
            .map_err(|e| TransportError::Consume {
                queue: self.queue.clone(),
                reason: format!("XAUTOCLAIM failed: {e}")
            })?;

        self.claim_cursor = reply.next_stream_id;
        let claimed = reply.claimed.into_iter().next();
        if let Some(entry) = &claimed {
            info!(queue = %self.queue, id = %entry.id, "Claimed a stale pending entry");
        }
        Ok(claimed)
    }

    fn deliver(&mut self, entry: StreamId, redelivered: bool) -> Delivery {
        let body = match field_bytes(&entry, BODY_FIELD) {
            Some(body) => body,
            None => {
                warn!(queue = %self.queue, id = %entry.id, "Stream entry has no body field");
                Vec::new()
            }
        };

        self.in_flight = Some(InFlight {
            id: entry.id.clone(),
            body: body.clone()
        });

        Delivery {
            tag: DeliveryTag::new(entry.id),
            body,
            redelivered
        }
    }
}

#[async_trait]
impl MessageConsumer for RedisConsumer {
    fn queue(&self) -> &str {
        &self.queue
    }

    async fn receive(&mut self) -> Result<Delivery, TransportError> {
        if let Some(pending) = &self.in_flight {
            return Err(TransportError::Consume {
                queue: self.queue.clone(),
                reason: format!("delivery {} has not been settled", pending.id)
            });
        }

        loop {
            if let Some(entry) = self.read_one().await? {
                let redelivered = self.draining_pending;
                return Ok(self.deliver(entry, redelivered));
            }

            if self.draining_pending {
                debug!(queue = %self.queue, "Pending entries drained");
                self.draining_pending = false;
                continue;
            }

            if let Some(entry) = self.claim_one().await? {
                return Ok(self.deliver(entry, true));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn settle(
        &mut self,
        tag: DeliveryTag,
        disposition: Disposition
    ) -> Result<(), TransportError> {
        let in_flight = match self.in_flight.take() {
            Some(in_flight) if in_flight.id == tag.as_str() => in_flight,
            other => {
                self.in_flight = other;
                return Err(TransportError::Settle {
                    queue: self.queue.clone(),
                    tag: tag.to_string(),
                    reason: "unknown delivery tag".to_string()
                });
            }
        };

        let mut pipe = redis::pipe();
        pipe.atomic();

        match disposition {
            Disposition::Ack => {}
            Disposition::Reject { requeue: false } => {
                pipe.cmd("XADD")
                    .arg(&self.dead_letter)
                    .arg("*")
                    .arg(BODY_FIELD)
                    .arg(&in_flight.body)
                    .arg(REASON_FIELD)
                    .arg(format!("rejected by {}", self.consumer))
                    .arg("source_id")
                    .arg(&in_flight.id)
                    .ignore();
            }
            Disposition::Reject { requeue: true } => {
                pipe.cmd("XADD")
                    .arg(&self.queue)
                    .arg("*")
                    .arg(BODY_FIELD)
                    .arg(&in_flight.body)
                    .ignore();
            }
        }

        pipe.cmd("XACK")
            .arg(&self.queue)
            .arg(&self.group)
            .arg(&in_flight.id)
            .ignore();
        pipe.cmd("XDEL").arg(&self.queue).arg(&in_flight.id).ignore();

        let result: redis::RedisResult<()> = pipe.query_async(&mut self.conn).await;
        if let Err(e) = result {
            self.in_flight = Some(in_flight);
            return Err(TransportError::Settle {
                queue: self.queue.clone(),
                tag: tag.to_string(),
                reason: e.to_string()
            });
        }

        debug!(
            queue = %self.queue,
            id = %in_flight.id,
            disposition = disposition.label(),
            "Delivery settled"
        );
        Ok(())
    }
}
