//! Seams between the pipeline and the outside world.

use crate::types::{DeadLetter, Delivery, DeliveryTag, Disposition, EmployeeRecord, Page};
use async_trait::async_trait;
use errors::{TransportError, UpstreamError};

/// Publishing side of a queue broker.
///
/// `publish` returns once the broker has accepted the message, not once it
/// has been delivered. The queue is created if it does not exist yet.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, queue: &str, body: &[u8]) -> Result<(), TransportError>;
}

/// Consuming side of a queue broker, bound to exactly one queue.
///
/// A consumer never holds more than one unsettled delivery: `receive` must
/// not be called again before the previous delivery's tag was passed to
/// `settle`.
#[async_trait]
pub trait MessageConsumer: Send {
    fn queue(&self) -> &str;

    /// Waits for the next delivery.
    async fn receive(&mut self) -> Result<Delivery, TransportError>;

    /// Issues the terminal disposition for a delivery.
    async fn settle(
        &mut self,
        tag: DeliveryTag,
        disposition: Disposition
    ) -> Result<(), TransportError>;
}

/// Factory for per-worker broker handles.
///
/// Every call hands out a fresh handle, so no two workers ever share one.
#[async_trait]
pub trait Broker: Send + Sync {
    /// One round trip proving the broker is reachable and usable.
    async fn probe(&self) -> Result<(), TransportError>;

    async fn publisher(&self) -> Result<Box<dyn MessagePublisher>, TransportError>;

    async fn consumer(&self, queue: &str) -> Result<Box<dyn MessageConsumer>, TransportError>;

    /// Oldest `count` entries of a queue's dead-letter queue.
    async fn dead_letters(
        &self,
        queue: &str,
        count: usize
    ) -> Result<Vec<DeadLetter>, TransportError>;
}

/// Result of a successful person creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreatedPerson {
    /// Platform id of the new person, when the platform reported one.
    pub person_id: Option<String>
}

/// The physical-access-control platform.
#[async_trait]
pub trait AccessControl: Send + Sync {
    /// Creates a person. `face_data` is the base64 face image, or `""`.
    async fn create_person(
        &self,
        employee: &EmployeeRecord,
        face_data: &str
    ) -> Result<CreatedPerson, UpstreamError>;

    /// Writes the site identifier (KIB number) onto an existing person.
    async fn update_identifier(&self, person_id: &str, kib_number: &str)
    -> Result<(), UpstreamError>;

    /// Adds the person to each privilege group, in order.
    async fn assign_privilege_groups(
        &self,
        person_id: &str,
        privilege_group_ids: &[String]
    ) -> Result<(), UpstreamError>;
}

/// Fetches a photo and returns it base64 encoded.
#[async_trait]
pub trait PhotoSource: Send + Sync {
    async fn fetch_base64(&self, url: &str) -> Result<String, UpstreamError>;
}

/// Paginated HR listing.
#[async_trait]
pub trait EmployeeSource: Send + Sync {
    async fn fetch_page(&self, date: &str, page: u32) -> Result<Page, UpstreamError>;
}
