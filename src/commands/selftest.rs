//! The `selftest` subcommand: run the whole pipeline over an in-memory queue.
//!
//! Verifies the harness itself without a broker: the generator publishes
//! through the loopback queue and the recorder consumes from it, so a
//! failure here points at the harness, not the transport.

use anyhow::Context;
use chrono::{Duration as ChronoDuration, Utc};
use clap::Args;
use loadgen_consumer::{run_recorder, ConsumeOptions, LatencyRecorder, TracingMetricSink};
use loadgen_core::{GenerationRequest, MemoryQueue, SharedPayload};
use loadgen_producer::{FanOutGenerator, ReliablePublisher};
use std::sync::Arc;
use tracing::info;

#[derive(Args, Clone, Debug)]
pub struct SelftestArgs {
    /// Messages per session
    #[arg(long, default_value_t = 5)]
    pub total_count: u64,

    /// Number of sessions
    #[arg(long, default_value_t = 2)]
    pub partition_count: u32,
}

pub async fn run_selftest(args: SelftestArgs) -> anyhow::Result<()> {
    let queue = MemoryQueue::new();
    let request = GenerationRequest::new(args.total_count, args.partition_count, None);
    let expected = request.unit_count();

    let publisher = ReliablePublisher::new(Arc::new(queue.clone()));
    let generator = FanOutGenerator::new(publisher, SharedPayload::builtin());

    info!("Self-test: {expected} message(s) through the in-memory queue");
    let handle = generator.spawn_generate(request);

    let recorder = LatencyRecorder::new(TracingMetricSink);
    let options = ConsumeOptions {
        deadline: Some(Utc::now() + ChronoDuration::seconds(30)),
        max_messages: Some(expected),
    };

    let mut source = queue.clone();
    let report = run_recorder(&mut source, &recorder, &options)
        .await
        .context("Self-test consume loop failed")?;

    let produced = handle.outcome().await;

    if !produced {
        anyhow::bail!("Self-test publish side reported failures");
    }
    if report.messages_observed != expected {
        anyhow::bail!(
            "Self-test observed {} of {expected} expected message(s)",
            report.messages_observed
        );
    }
    if report.recording_failures > 0 {
        anyhow::bail!(
            "Self-test had {} recording failure(s)",
            report.recording_failures
        );
    }

    match report.mean_elapsed_ms {
        Some(mean) => info!("Self-test passed: {expected} message(s), mean latency {mean:.3}ms"),
        None => info!("Self-test passed: {expected} message(s)"),
    }

    Ok(())
}
