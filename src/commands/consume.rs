//! The `consume` subcommand: spawn a consumer group and record latencies.

use crate::KafkaOpts;
use anyhow::Context;
use chrono::{Duration as ChronoDuration, Utc};
use clap::Args;
use loadgen_consumer::{
    run_recorder, ConsumeOptions, ConsumeReport, JsonlMetricSink, LatencyRecorder,
    TracingMetricSink,
};
use loadgen_core::MetricSink;
use loadgen_kafka::KafkaSource;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Args, Clone, Debug)]
pub struct ConsumeArgs {
    /// Consumer group ID
    #[arg(long, env = "LOADGEN_GROUP_ID", default_value = "loadgen-consumer")]
    pub group_id: String,

    /// Number of consumers to spawn in the group
    #[arg(long, default_value_t = 1)]
    pub num_consumers: usize,

    /// Maximum messages fetched per receive call
    #[arg(long, default_value_t = 100)]
    pub batch_size: usize,

    /// Stop after this many seconds
    #[arg(long)]
    pub run_for_secs: Option<i64>,

    /// Stop each consumer after it has seen this many messages
    #[arg(long)]
    pub max_messages: Option<u64>,

    /// Append per-message observations to this JSON Lines file
    #[arg(long, value_name = "PATH")]
    pub metrics_jsonl: Option<PathBuf>,

    /// Write a JSON run report to this path
    #[arg(long, value_name = "PATH")]
    pub report_output: Option<PathBuf>,

    #[command(flatten)]
    pub kafka: KafkaOpts,
}

pub async fn run_consume(args: ConsumeArgs) -> anyhow::Result<()> {
    if args.num_consumers == 0 {
        anyhow::bail!("--num-consumers must be at least 1");
    }

    let sink: Arc<dyn MetricSink> = match &args.metrics_jsonl {
        Some(path) => Arc::new(
            JsonlMetricSink::create(path)
                .with_context(|| format!("Failed to create metrics file at {path:?}"))?,
        ),
        None => Arc::new(TracingMetricSink),
    };

    let options = ConsumeOptions {
        deadline: args
            .run_for_secs
            .map(|secs| Utc::now() + ChronoDuration::seconds(secs)),
        max_messages: args.max_messages,
    };

    info!(
        "Spawning {} consumer(s) in group '{}' on topic '{}'",
        args.num_consumers, args.group_id, args.kafka.topic
    );

    let mut handles = Vec::with_capacity(args.num_consumers);
    for i in 0..args.num_consumers {
        let brokers = args.kafka.brokers.clone();
        let group_id = args.group_id.clone();
        let topic = args.kafka.topic.clone();
        let batch_size = args.batch_size;
        let options = options.clone();
        let sink = Arc::clone(&sink);

        handles.push(tokio::spawn(async move {
            let mut source = KafkaSource::connect(&brokers, &group_id, &topic)
                .with_context(|| format!("Consumer {i} failed to connect to {brokers}"))?
                .with_batch_size(batch_size);
            let recorder = LatencyRecorder::new(sink);
            run_recorder(&mut source, &recorder, &options)
                .await
                .map_err(|e| anyhow::anyhow!("Consumer {i} aborted: {e}"))
        }));
    }

    let mut merged: Option<ConsumeReport> = None;
    let mut failed = 0usize;
    for (i, handle) in handles.into_iter().enumerate() {
        match handle.await {
            Ok(Ok(report)) => {
                info!(
                    "Consumer {i} finished with {} message(s) observed",
                    report.messages_observed
                );
                merged = Some(match merged {
                    Some(acc) => acc.merge(report),
                    None => report,
                });
            }
            Ok(Err(e)) => {
                failed += 1;
                error!("Consumer {i} error: {e:#}");
            }
            Err(e) => {
                failed += 1;
                error!("Consumer {i} task error: {e}");
            }
        }
    }

    let report = match merged {
        Some(report) => report,
        None => anyhow::bail!("All consumers failed before producing a report"),
    };

    match (
        report.min_elapsed_ms,
        report.mean_elapsed_ms,
        report.max_elapsed_ms,
    ) {
        (Some(min), Some(mean), Some(max)) => info!(
            "Observed {} message(s): latency min {min:.1}ms / mean {mean:.1}ms / max {max:.1}ms",
            report.messages_observed
        ),
        _ => info!("Observed {} message(s)", report.messages_observed),
    }
    if report.negative_observations > 0 {
        warn!(
            "{} observation(s) had negative latency (producer clock ahead of consumer)",
            report.negative_observations
        );
    }
    if report.recording_failures > 0 {
        warn!(
            "{} message(s) could not be recorded",
            report.recording_failures
        );
    }

    if let Some(path) = &args.report_output {
        super::write_report(&report, path)?;
    }

    if failed > 0 {
        anyhow::bail!("{failed} consumer(s) aborted; see the log for details");
    }

    Ok(())
}
