//! The `drain` subcommand: sweep a dead-letter topic clean.

use crate::KafkaOpts;
use anyhow::Context;
use clap::Args;
use loadgen_consumer::drain_dead_letters;
use loadgen_kafka::KafkaSource;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Args, Clone, Debug)]
pub struct DrainArgs {
    /// Dead-letter topic to sweep (defaults to "<topic>.dead-letter")
    #[arg(long)]
    pub dead_letter_topic: Option<String>,

    /// Consumer group ID for the sweep
    #[arg(long, default_value = "loadgen-drain")]
    pub group_id: String,

    /// Stop once the topic has been idle this long
    #[arg(long, default_value_t = 5)]
    pub idle_secs: u64,

    /// Write a JSON run report to this path
    #[arg(long, value_name = "PATH")]
    pub report_output: Option<PathBuf>,

    #[command(flatten)]
    pub kafka: KafkaOpts,
}

pub async fn run_drain(args: DrainArgs) -> anyhow::Result<()> {
    let topic = args
        .dead_letter_topic
        .clone()
        .unwrap_or_else(|| format!("{}.dead-letter", args.kafka.topic));

    let mut source = KafkaSource::connect(&args.kafka.brokers, &args.group_id, &topic)
        .with_context(|| format!("Failed to connect drain consumer to {}", args.kafka.brokers))?;

    let report = drain_dead_letters(&mut source, Duration::from_secs(args.idle_secs))
        .await
        .with_context(|| format!("Drain of '{topic}' failed"))?;

    info!(
        "Drained '{topic}': {} message(s) cleared ({} undecodable)",
        report.messages_cleared, report.undecodable
    );

    if let Some(path) = &args.report_output {
        super::write_report(&report, path)?;
    }

    Ok(())
}
