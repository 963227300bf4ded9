//! # HR Sync
//!
//! Pulls employee records from the paginated HR listing and fans them out
//! into the sync queues.
//!
//! - [`EposhClient`]: one API-key authenticated HTTP call per page
//! - [`fetch_all`]: lazy, strictly sequential walk over all pages
//! - [`IngestService`]: publishes each page (legacy) or each record (staged)
//!   before fetching the next page

pub mod client;
pub mod ingest;
pub mod pagination;

pub use client::EposhClient;
pub use ingest::{IngestError, IngestFailure, IngestReport, IngestService, sync_date};
pub use pagination::fetch_all;
