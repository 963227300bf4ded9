use anyhow::Result;
use config::Role;
use pipeline::{Orchestrator, shutdown_signal};

use crate::bootstrap;
use crate::commands::GlobalArgs;

/// Runs the stage workers, or the single legacy worker, until Ctrl+C,
/// SIGTERM or the first worker failure.
pub async fn run(global: &GlobalArgs, legacy: bool) -> Result<()> {
    let role = if legacy { Role::LegacyWorker } else { Role::Worker };
    let config = bootstrap::prepare(global, role)?;
    bootstrap::serve_metrics(&config.observability)?;

    let broker = bootstrap::open_broker(global.broker, &config)?;
    let orchestrator = Orchestrator::new(broker, bootstrap::collaborators(&config)?);

    if legacy {
        orchestrator.run_legacy(shutdown_signal()).await?;
    } else {
        orchestrator.run(shutdown_signal()).await?;
    }

    tracing::info!("Workers stopped");
    Ok(())
}
