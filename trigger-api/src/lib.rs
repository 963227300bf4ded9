//! # Trigger API
//!
//! Thin HTTP front door of the sync pipeline. It only guarantees that work
//! was enqueued; downstream success is observable through logs and the
//! dead-letter queues.
//!
//! | Route | Effect |
//! |---|---|
//! | `POST /send-to-hikvision` | body queued unmodified on the ingestion queue |
//! | `POST /eposh-induction` | full paginated HR ingestion inside the request |
//! | `POST /employees` | one record into the create-person stage |
//! | `GET /health` | broker probe |
//! | `GET /metrics` | Prometheus text |

pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod state;

pub use error::{ApiError, ServerError};
pub use routes::create_router;
pub use server::run_server;
pub use state::AppState;
