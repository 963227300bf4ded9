//! Shared test fixtures for the HCP sync workspace.
//!
//! - A Redis container, started lazily once per test process (`redis()`
//!   returns `None` when Docker is unavailable so tests can skip)
//! - Sample HR records and stage messages
//! - In-memory fakes for the access-control platform, photo store and HR
//!   source that record every call

mod fakes;
mod fixtures;

pub use fakes::*;
pub use fixtures::*;
