//! # HCP Sync Core
//!
//! Domain types carried through the queue pipeline and the traits that sit
//! at its seams (broker, HR source, access-control platform, photo store).
//!
//! Nothing in this crate performs I/O; implementations live in `queue`,
//! `hr-sync` and `access-control`.

pub mod traits;
pub mod types;

pub use traits::{
    AccessControl, Broker, CreatedPerson, EmployeeSource, MessageConsumer, MessagePublisher,
    PhotoSource
};
pub use types::{
    AssignPrivilegePayload, DeadLetter, Delivery, DeliveryTag, Disposition, EmployeeRecord,
    IngestMessage, Page, Pagination, Photo, Regional, Stage, StageMessage, UpdateIdentifierPayload,
    ZoneMapping
};
