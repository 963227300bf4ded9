use crate::consumer::run_consumer;
use crate::legacy::LegacyHandler;
use crate::stages::{
    AssignPrivilegeHandler, CreatePersonHandler, StageHandler, UpdateIdentifierHandler
};
use config::QueueConfig;
use errors::TransportError;
use hcp_core::{AccessControl, Broker, PhotoSource, Stage, ZoneMapping};
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::signal;
use tokio::task::JoinSet;
use tracing::{Instrument, error, info, info_span, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Broker probe failed, no worker started: {0}")]
    Probe(#[source] TransportError),

    #[error("Worker {worker} stopped: {source}")]
    Worker {
        worker: &'static str,
        #[source]
        source: TransportError
    },

    #[error("Worker task failed: {0}")]
    Join(String)
}

/// Which consumer loop a worker runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerKind {
    Stage(Stage),
    Legacy
}

impl WorkerKind {
    pub fn name(&self) -> &'static str {
        match self {
            WorkerKind::Stage(stage) => stage.as_str(),
            WorkerKind::Legacy => "legacy"
        }
    }
}

/// Collaborators shared by every worker. Broker handles are not part of
/// this: each worker opens its own.
pub struct Collaborators {
    pub access: Arc<dyn AccessControl>,
    pub photos: Arc<dyn PhotoSource>,
    pub zones: Arc<ZoneMapping>,
    pub queues: QueueConfig
}

impl Collaborators {
    fn queue_for(&self, kind: WorkerKind) -> &str {
        match kind {
            WorkerKind::Stage(stage) => self.queues.for_stage(stage),
            WorkerKind::Legacy => &self.queues.ingest
        }
    }

    /// Builds the handler for one worker, with a publisher of its own.
    async fn handler(
        &self,
        kind: WorkerKind,
        broker: &dyn Broker
    ) -> Result<Box<dyn StageHandler>, TransportError> {
        let handler: Box<dyn StageHandler> = match kind {
            WorkerKind::Stage(Stage::CreatePerson) => Box::new(CreatePersonHandler::new(
                Arc::clone(&self.access),
                Arc::clone(&self.photos),
                broker.publisher().await?,
                self.queues.for_stage(Stage::UpdateIdentifier)
            )),
            WorkerKind::Stage(Stage::UpdateIdentifier) => Box::new(UpdateIdentifierHandler::new(
                Arc::clone(&self.access),
                Arc::clone(&self.zones),
                broker.publisher().await?,
                self.queues.for_stage(Stage::AssignPrivilege)
            )),
            WorkerKind::Stage(Stage::AssignPrivilege) => {
                Box::new(AssignPrivilegeHandler::new(Arc::clone(&self.access)))
            }
            WorkerKind::Legacy => Box::new(LegacyHandler::new(
                Arc::clone(&self.access),
                Arc::clone(&self.photos)
            ))
        };
        Ok(handler)
    }
}

/// Starts one worker per stage and supervises them.
///
/// The broker is probed once before anything starts; a failed probe aborts
/// startup entirely. The first worker to stop takes the whole pipeline
/// down with it, so a dead consumer loop never goes unnoticed.
pub struct Orchestrator {
    broker: Arc<dyn Broker>,
    collaborators: Arc<Collaborators>
}

impl Orchestrator {
    pub fn new(broker: Arc<dyn Broker>, collaborators: Collaborators) -> Self {
        Self {
            broker,
            collaborators: Arc::new(collaborators)
        }
    }

    /// Runs the three stage workers until `shutdown` resolves or one of
    /// them fails.
    pub async fn run<F>(&self, shutdown: F) -> Result<(), PipelineError>
    where
        F: Future<Output = ()> + Send
    {
        let kinds = Stage::ALL.map(WorkerKind::Stage);
        self.supervise(&kinds, shutdown).await
    }

    /// Runs the single-stage worker on the ingestion queue.
    pub async fn run_legacy<F>(&self, shutdown: F) -> Result<(), PipelineError>
    where
        F: Future<Output = ()> + Send
    {
        self.supervise(&[WorkerKind::Legacy], shutdown).await
    }

    async fn supervise<F>(&self, kinds: &[WorkerKind], shutdown: F) -> Result<(), PipelineError>
    where
        F: Future<Output = ()> + Send
    {
        self.broker.probe().await.map_err(PipelineError::Probe)?;
        info!(workers = kinds.len(), "Broker reachable, starting workers");

        let mut workers = JoinSet::new();
        for &kind in kinds {
            let span = info_span!(
                "worker",
                worker = kind.name(),
                queue = %self.collaborators.queue_for(kind)
            );
            workers.spawn(
                worker(Arc::clone(&self.broker), Arc::clone(&self.collaborators), kind)
                    .instrument(span)
            );
        }

        let shutdown = std::pin::pin!(shutdown);
        let result = tokio::select! {
            () = shutdown => {
                info!("Shutdown requested, stopping workers");
                Ok(())
            }
            Some(joined) = workers.join_next() => match joined {
                Ok(failure) => Err(failure),
                Err(e) => Err(PipelineError::Join(e.to_string()))
            },
            else => Ok(())
        };

        if let Err(e) = &result {
            error!(error = %e, "Pipeline stopping after worker failure");
        }
        workers.shutdown().await;
        result
    }
}

/// One worker: own publisher, own consumer, one loop. Only returns when
/// the loop broke.
async fn worker(
    broker: Arc<dyn Broker>,
    collaborators: Arc<Collaborators>,
    kind: WorkerKind
) -> PipelineError {
    let Err(source) = consume(broker.as_ref(), &collaborators, kind).await;
    warn!(error = %source, "Worker stopped");
    PipelineError::Worker {
        worker: kind.name(),
        source
    }
}

async fn consume(
    broker: &dyn Broker,
    collaborators: &Collaborators,
    kind: WorkerKind
) -> Result<Infallible, TransportError> {
    let handler = collaborators.handler(kind, broker).await?;
    let consumer = broker.consumer(collaborators.queue_for(kind)).await?;
    info!("Worker started");
    run_consumer(consumer, handler.as_ref()).await
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        () = terminate => info!("Received terminate signal, initiating graceful shutdown"),
    }
}
