//! Ingest command - one-off HR ingestion run
//!
//! Same work as `POST /eposh-induction`, without the HTTP server.

use anyhow::{Context, Result};
use clap::Args;
use config::{IngestMode, Role};
use hcp_core::{EmployeeSource, MessagePublisher};
use hr_sync::{EposhClient, IngestReport, IngestService, sync_date};
use std::sync::Arc;

use crate::bootstrap;
use crate::commands::{BrokerKind, GlobalArgs};
use crate::output;

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Filter date (YYYY-MM-DD); defaults to `hr_source.default_date`, else today (UTC)
    #[arg(long)]
    pub date: Option<String>,

    /// Output the run report as JSON
    #[arg(long)]
    pub json: bool
}

pub async fn run(global: &GlobalArgs, args: IngestArgs) -> Result<()> {
    let config = bootstrap::prepare(global, Role::Ingest)?;
    if global.broker == BrokerKind::Memory {
        output::warn("in-process broker: nothing consumes what this run queues");
    }

    let broker = bootstrap::open_broker(global.broker, &config)?;
    let publisher: Arc<dyn MessagePublisher> = Arc::from(
        broker
            .publisher()
            .await
            .context("failed to open a publisher")?
    );
    let source: Arc<dyn EmployeeSource> = Arc::new(
        EposhClient::new(config.hr_source.clone()).context("failed to build the HR client")?
    );
    let service = IngestService::new(source, publisher, config.queues.clone(), config.ingest.mode);

    let date = sync_date(args.date.as_deref(), &config.hr_source);
    let queue = match config.ingest.mode {
        IngestMode::Legacy => &config.queues.ingest,
        IngestMode::Staged => &config.queues.create_person
    };

    match service.run(&date).await {
        Ok(report) => {
            print_report(&report, queue, args.json)?;
            Ok(())
        }
        Err(e) => {
            // Pages published before the failure stay queued; show them.
            print_report(&e.published, queue, args.json)?;
            Err(e.into())
        }
    }
}

fn print_report(report: &IngestReport, queue: &str, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    output::header("Ingestion run");
    println!();
    output::field("date", &report.date);
    output::field("queue", queue);
    output::field(
        "pages",
        &format!("{} of {}", report.pages_published, report.total_pages)
    );
    output::field("records", &report.total_records.to_string());
    output::field("messages", &report.messages_published.to_string());
    if report.skipped_records > 0 {
        output::field("skipped", &report.skipped_records.to_string());
    }
    Ok(())
}
