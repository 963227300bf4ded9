use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub mod check;
pub mod dlq;
pub mod ingest;
pub mod serve;
pub mod worker;

#[derive(Parser)]
#[command(name = "hcp-sync")]
#[command(about = "Synchronize HR employee records into the access-control platform")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands
}

/// Flags every subcommand understands.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// TOML configuration file; environment variables override it
    #[arg(long, global = true, env = "HCP_SYNC_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Queue transport to use
    #[arg(
        long,
        global = true,
        value_enum,
        env = "HCP_SYNC_BROKER",
        default_value_t = BrokerKind::Redis
    )]
    pub broker: BrokerKind
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerKind {
    /// Redis Streams
    Redis,
    /// In-process queues, lost on exit. Local runs only.
    Memory
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the HTTP trigger API")]
    Serve(serve::ServeArgs),

    #[command(about = "Run the three chained stage workers")]
    Worker,

    #[command(about = "Run the single-stage worker on the ingestion queue")]
    LegacyWorker,

    #[command(about = "Validate configuration and probe the broker")]
    Check(check::CheckArgs),

    #[command(about = "Fetch every HR page for a date and queue it")]
    Ingest(ingest::IngestArgs),

    #[command(about = "Show messages parked on a dead-letter queue")]
    Dlq(dlq::DlqArgs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["hcp-sync", "check", "--broker", "memory"]).unwrap();
        assert_eq!(cli.global.broker, BrokerKind::Memory);
        assert!(matches!(cli.command, Commands::Check(_)));
    }

    #[test]
    fn test_dlq_count_default() {
        let cli = Cli::try_parse_from(["hcp-sync", "dlq", "create_person_queue"]).unwrap();
        match cli.command {
            Commands::Dlq(args) => {
                assert_eq!(args.queue, "create_person_queue");
                assert_eq!(args.count, 10);
            }
            _ => panic!("expected dlq")
        }
    }

    #[test]
    fn test_unknown_broker_is_rejected() {
        assert!(Cli::try_parse_from(["hcp-sync", "--broker", "kafka", "worker"]).is_err());
    }
}
