//! Check command - Deployment preflight
//!
//! Loads the configuration exactly as a real start would, checks the
//! credentials the chosen role needs, then probes the broker.

use anyhow::{Result, bail};
use clap::{Args, ValueEnum};
use config::Role;
use serde::Serialize;

use crate::bootstrap;
use crate::commands::{BrokerKind, GlobalArgs};
use crate::output;

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Also require the credentials this role needs
    #[arg(long, value_enum)]
    pub role: Option<CheckRole>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckRole {
    Serve,
    Worker,
    LegacyWorker,
    Ingest
}

impl From<CheckRole> for Role {
    fn from(role: CheckRole) -> Self {
        match role {
            CheckRole::Serve => Role::Serve,
            CheckRole::Worker => Role::Worker,
            CheckRole::LegacyWorker => Role::LegacyWorker,
            CheckRole::Ingest => Role::Ingest
        }
    }
}

#[derive(Debug, Serialize)]
struct CheckReport {
    role: String,
    broker: String,
    config: Outcome,
    probe: Outcome
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum Outcome {
    Passed,
    Failed { error: String },
    Skipped
}

impl Outcome {
    fn passed(&self) -> bool {
        matches!(self, Outcome::Passed)
    }
}

pub async fn run(global: &GlobalArgs, args: CheckArgs) -> Result<()> {
    let config = bootstrap::load(global)?;
    let role = args.role.map_or(Role::Check, Role::from);

    let config_outcome = match config.validate_for(role) {
        Ok(()) => Outcome::Passed,
        Err(e) => Outcome::Failed {
            error: e.to_string()
        }
    };

    let probe = if config_outcome.passed() {
        let result = match bootstrap::open_broker(global.broker, &config) {
            Ok(broker) => broker.probe().await.map_err(anyhow::Error::from),
            Err(e) => Err(e)
        };
        match result {
            Ok(()) => Outcome::Passed,
            Err(e) => Outcome::Failed {
                error: e.to_string()
            }
        }
    } else {
        Outcome::Skipped
    };

    let report = CheckReport {
        role: format!("{role:?}"),
        broker: match global.broker {
            BrokerKind::Redis => config.broker.display_addr(),
            BrokerKind::Memory => "in-process".to_string()
        },
        config: config_outcome,
        probe
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !(report.config.passed() && report.probe.passed()) {
        bail!("preflight check failed");
    }
    Ok(())
}

fn print_report(report: &CheckReport) {
    output::header("Preflight check");
    println!();
    output::field("role", &report.role);
    output::field("broker", &report.broker);
    println!();

    for (what, outcome) in [("configuration", &report.config), ("broker probe", &report.probe)] {
        match outcome {
            Outcome::Passed => output::success(what),
            Outcome::Failed { error } => output::error(&format!("{what}: {error}")),
            Outcome::Skipped => output::warn(&format!("{what}: skipped"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outcome_json_shape() {
        let report = CheckReport {
            role: "Check".to_string(),
            broker: "in-process".to_string(),
            config: Outcome::Passed,
            probe: Outcome::Failed {
                error: "refused".to_string()
            }
        };

        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({
                "role": "Check",
                "broker": "in-process",
                "config": {"status": "passed"},
                "probe": {"status": "failed", "error": "refused"}
            })
        );
    }

    #[test]
    fn test_check_role_maps_to_config_role() {
        assert_eq!(Role::from(CheckRole::LegacyWorker), Role::LegacyWorker);
        assert_eq!(Role::from(CheckRole::Ingest), Role::Ingest);
    }
}
