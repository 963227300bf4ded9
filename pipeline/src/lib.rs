//! # Sync Pipeline
//!
//! Choreographed three-stage pipeline: create person, update identifier,
//! assign privilege groups. Every stage runs as its own consumer loop on its
//! own queue and only publishes downstream after its side effect succeeded.
//!
//! - [`stages`]: one [`StageHandler`] per stage
//! - [`run_consumer`]: the receive, handle, settle loop
//! - [`Orchestrator`]: probe, spawn, supervise
//! - [`legacy`]: single-stage worker for whole-page messages

pub mod consumer;
pub mod legacy;
pub mod orchestrator;
pub mod stages;

pub use consumer::run_consumer;
pub use legacy::{BatchSummary, LegacyHandler};
pub use orchestrator::{Collaborators, Orchestrator, PipelineError, WorkerKind, shutdown_signal};
pub use stages::{
    AssignPrivilegeHandler, CreatePersonHandler, StageHandler, UpdateIdentifierHandler
};
