//! The `produce` subcommand: fan out a run of test messages onto the topic.

use crate::KafkaOpts;
use anyhow::Context;
use clap::Args;
use loadgen_core::{GenerationRequest, SharedPayload};
use loadgen_kafka::KafkaSink;
use loadgen_producer::{FanOutGenerator, ReliablePublisher, MAX_RETRY_ATTEMPTS};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

#[derive(Args, Clone, Debug)]
pub struct ProduceArgs {
    /// Messages per session, or the total when unpartitioned
    #[arg(long, default_value_t = 100)]
    pub total_count: u64,

    /// Number of sessions to fan out over (0 = unpartitioned)
    #[arg(long, default_value_t = 0)]
    pub partition_count: u32,

    /// Run identifier (defaults to a fresh UUID)
    #[arg(long)]
    pub test_run_id: Option<String>,

    /// File whose contents become the message payload
    #[arg(long, value_name = "PATH")]
    pub payload_file: Option<PathBuf>,

    /// Per-message retry budget for transient publish failures
    #[arg(long, env = "MAX_RETRY_ATTEMPTS", default_value_t = MAX_RETRY_ATTEMPTS)]
    pub max_retry_attempts: u32,

    /// Create the topic before publishing
    #[arg(long)]
    pub create_topic: bool,

    /// Write a JSON run report to this path
    #[arg(long, value_name = "PATH")]
    pub report_output: Option<PathBuf>,

    #[command(flatten)]
    pub kafka: KafkaOpts,
}

#[derive(Debug, Serialize)]
pub struct ProduceReport {
    pub test_run_id: String,
    pub requested_messages: u64,
    pub all_published: bool,
    pub duration_ms: u64,
}

pub async fn run_produce(args: ProduceArgs) -> anyhow::Result<()> {
    let request = GenerationRequest::new(
        args.total_count,
        args.partition_count,
        args.test_run_id.clone(),
    );

    let sink = KafkaSink::connect(&args.kafka.brokers, &args.kafka.topic)
        .with_context(|| format!("Failed to connect producer to {}", args.kafka.brokers))?;

    if args.create_topic {
        sink.ensure_topic(args.partition_count.max(1) as i32)
            .await
            .with_context(|| format!("Failed to ensure topic '{}'", args.kafka.topic))?;
    }

    let payload = match &args.payload_file {
        Some(path) => SharedPayload::from_file(path),
        None => SharedPayload::builtin(),
    };

    let publisher =
        ReliablePublisher::new(Arc::new(sink)).with_max_attempts(args.max_retry_attempts);
    let generator = FanOutGenerator::new(publisher, payload);

    let start = Instant::now();
    let all_published = generator.generate(&request).await;
    let duration = start.elapsed();

    let report = ProduceReport {
        test_run_id: request.test_run_id.clone(),
        requested_messages: request.unit_count(),
        all_published,
        duration_ms: duration.as_millis() as u64,
    };

    info!(
        "Produce run {} finished: {} message(s) in {:?}",
        report.test_run_id, report.requested_messages, duration
    );

    if let Some(path) = &args.report_output {
        super::write_report(&report, path)?;
    }

    if !all_published {
        anyhow::bail!("Some messages were not published; see the log for details");
    }

    Ok(())
}
