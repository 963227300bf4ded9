//! Dlq command - inspect rejected messages
//!
//! Read-only: entries stay on the dead-letter queue.

use anyhow::{Context, Result};
use clap::Args;
use config::Role;
use hcp_core::DeadLetter;
use serde::Serialize;
use serde_json::Value;

use crate::bootstrap;
use crate::commands::GlobalArgs;
use crate::output;

#[derive(Args, Debug)]
pub struct DlqArgs {
    /// Source queue whose dead-letter queue to read, e.g. create_person_queue
    pub queue: String,

    /// Number of oldest entries to show
    #[arg(long, default_value_t = 10)]
    pub count: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool
}

#[derive(Debug, Serialize)]
struct Entry {
    id: String,
    reason: Option<String>,
    /// Parsed when the body is JSON, the lossy text otherwise.
    body: Value
}

impl From<DeadLetter> for Entry {
    fn from(letter: DeadLetter) -> Self {
        let body = serde_json::from_slice(&letter.body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&letter.body).into_owned()));
        Self {
            id: letter.id,
            reason: letter.reason,
            body
        }
    }
}

pub async fn run(global: &GlobalArgs, args: DlqArgs) -> Result<()> {
    let config = bootstrap::prepare(global, Role::Check)?;
    let broker = bootstrap::open_broker(global.broker, &config)?;

    let entries: Vec<Entry> = broker
        .dead_letters(&args.queue, args.count)
        .await
        .with_context(|| format!("failed to read the dead letters of {}", args.queue))?
        .into_iter()
        .map(Entry::from)
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    let dead_letter_queue = config.queues.dead_letter(&args.queue);
    output::header(&format!("Dead letters on {dead_letter_queue}"));
    if entries.is_empty() {
        output::success("queue is empty");
        return Ok(());
    }

    for entry in &entries {
        println!();
        output::field("id", &entry.id);
        output::field("reason", entry.reason.as_deref().unwrap_or("-"));
        output::field("body", &entry.body.to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_parses_json_bodies() {
        let entry = Entry::from(DeadLetter {
            id: "1-0".to_string(),
            body: br#"{"personId":"P1"}"#.to_vec(),
            reason: Some("rejected".to_string())
        });
        assert_eq!(entry.body, json!({"personId": "P1"}));
    }

    #[test]
    fn test_entry_keeps_non_json_bodies_as_text() {
        let entry = Entry::from(DeadLetter {
            id: "1-0".to_string(),
            body: b"not json".to_vec(),
            reason: None
        });
        assert_eq!(entry.body, json!("not json"));
    }
}
