//! Serve command - HTTP trigger API
//!
//! With `--with-workers` the pipeline runs in the same process, sharing the
//! broker. That is the only way `--broker memory` gets messages from the API
//! to a worker.

use anyhow::{Context, Result};
use clap::Args;
use config::{Config, IngestMode, Role};
use hcp_core::{Broker, EmployeeSource};
use hr_sync::EposhClient;
use pipeline::Orchestrator;
use std::net::SocketAddr;
use std::sync::Arc;
use trigger_api::{AppState, run_server};

use crate::bootstrap::{self, Shutdown};
use crate::commands::GlobalArgs;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Bind address; overrides `server.host`
    #[arg(long)]
    pub host: Option<String>,

    /// Bind port; overrides `server.port`
    #[arg(long)]
    pub port: Option<u16>,

    /// Also run the workers for the configured ingest mode in this process
    #[arg(long)]
    pub with_workers: bool
}

pub async fn run(global: &GlobalArgs, args: ServeArgs) -> Result<()> {
    let config = bootstrap::prepare(global, Role::Serve)?;
    if args.with_workers {
        config
            .validate_for(worker_role(&config))
            .context("configuration is not usable for the in-process workers")?;
    }

    let metrics = bootstrap::install_metrics(&config.observability)?;
    let broker = bootstrap::open_broker(global.broker, &config)?;
    let source: Arc<dyn EmployeeSource> = Arc::new(
        EposhClient::new(config.hr_source.clone()).context("failed to build the HR client")?
    );
    let state = AppState::new(&config, Arc::clone(&broker), source, metrics)
        .await
        .context("failed to open the API publisher")?;

    let addr = bind_addr(
        args.host.as_deref().unwrap_or(&config.server.host),
        args.port.unwrap_or(config.server.port)
    )
    .await?;

    let shutdown = Shutdown::on_signal();
    let server = run_server(addr, Arc::new(state), shutdown.wait());

    if !args.with_workers {
        return server.await.map_err(Into::into);
    }

    let pipeline = async {
        let result = run_pipeline(&config, broker, &shutdown).await;
        // A dead pipeline takes the API down with it.
        shutdown.trigger();
        result
    };
    let (served, piped) = tokio::join!(server, pipeline);
    piped?;
    served?;
    Ok(())
}

fn worker_role(config: &Config) -> Role {
    match config.ingest.mode {
        IngestMode::Legacy => Role::LegacyWorker,
        IngestMode::Staged => Role::Worker
    }
}

async fn run_pipeline(
    config: &Config,
    broker: Arc<dyn Broker>,
    shutdown: &Shutdown
) -> Result<()> {
    let orchestrator = Orchestrator::new(broker, bootstrap::collaborators(config)?);
    match config.ingest.mode {
        IngestMode::Legacy => orchestrator.run_legacy(shutdown.wait()).await?,
        IngestMode::Staged => orchestrator.run(shutdown.wait()).await?
    }
    Ok(())
}

async fn bind_addr(host: &str, port: u16) -> Result<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await
        .with_context(|| format!("cannot resolve {host}:{port}"))?
        .next()
        .with_context(|| format!("{host}:{port} resolved to no address"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_addr_resolves_ip_literals() {
        let addr = bind_addr("127.0.0.1", 5000).await.unwrap();
        assert_eq!(addr, "127.0.0.1:5000".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_in_process_workers_follow_ingest_mode() {
        let mut config = Config::default();
        assert_eq!(worker_role(&config), Role::LegacyWorker);

        config.ingest.mode = IngestMode::Staged;
        assert_eq!(worker_role(&config), Role::Worker);
    }
}
