//! End-to-end pipeline tests over the in-memory queue
//!
//! These exercise the produce and consume halves together without a broker:
//!
//! Test flow:
//! 1. Fan a generation request out through the retrying publisher
//! 2. Consume the loopback queue with the latency recorder
//! 3. Assert on the emitted observations and the run report

use chrono::{Duration as ChronoDuration, Utc};
use loadgen_core::testing::MemoryMetricSink;
use mq_loadgen::testing::{init_test_tracing, unique_test_run_id};
use mq_loadgen::{
    run_recorder, ConsumeOptions, FanOutGenerator, GenerationRequest, JsonlMetricSink,
    LatencyRecorder, MemoryQueue, ReliablePublisher, SharedPayload,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

fn consume_options(expected: u64) -> ConsumeOptions {
    ConsumeOptions {
        deadline: Some(Utc::now() + ChronoDuration::seconds(30)),
        max_messages: Some(expected),
    }
}

fn loopback_generator(queue: &MemoryQueue) -> FanOutGenerator<MemoryQueue> {
    let publisher = ReliablePublisher::new(Arc::new(queue.clone()));
    FanOutGenerator::new(publisher, SharedPayload::builtin())
}

#[tokio::test]
async fn test_flat_run_observes_every_message() -> Result<(), Box<dyn std::error::Error>> {
    init_test_tracing();

    let run_id = unique_test_run_id("loopback-flat");
    let queue = MemoryQueue::new();
    let generator = loopback_generator(&queue);
    let request = GenerationRequest::new(5, 0, Some(run_id.clone()));

    assert!(generator.generate(&request).await);

    let sink = MemoryMetricSink::new();
    let recorder = LatencyRecorder::new(&sink);
    let mut source = queue.clone();
    let report = run_recorder(&mut source, &recorder, &consume_options(5)).await?;

    assert_eq!(report.messages_observed, 5);
    assert_eq!(report.recording_failures, 0);
    assert!(queue.is_empty().await);

    let emitted = sink.emitted();
    assert_eq!(emitted.len(), 5);

    let ids: HashSet<u64> = emitted
        .iter()
        .map(|m| m.dimensions["MessageId"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, (1..=5).collect::<HashSet<u64>>());

    for metric in &emitted {
        assert_eq!(metric.name, "messageProcessTimeMs");
        assert_eq!(metric.dimensions["TestRunId"], run_id.as_str());
        assert!(!metric.dimensions.contains_key("SessionId"));
    }

    Ok(())
}

#[tokio::test]
async fn test_partitioned_run_keeps_sessions_apart() -> Result<(), Box<dyn std::error::Error>> {
    init_test_tracing();

    let queue = MemoryQueue::new();
    let generator = loopback_generator(&queue);
    let request = GenerationRequest::new(3, 2, None);

    assert!(generator.generate(&request).await);

    let sink = MemoryMetricSink::new();
    let recorder = LatencyRecorder::new(&sink);
    let mut source = queue.clone();
    let report = run_recorder(&mut source, &recorder, &consume_options(6)).await?;

    assert_eq!(report.messages_observed, 6);

    // Each session carries its own 1..=3 sequence.
    let mut per_session: HashMap<String, HashSet<u64>> = HashMap::new();
    for metric in sink.emitted() {
        let session = metric.dimensions["SessionId"].as_str().unwrap().to_string();
        let id = metric.dimensions["MessageId"].as_u64().unwrap();
        per_session.entry(session).or_default().insert(id);
    }

    assert_eq!(per_session.len(), 2);
    for ids in per_session.values() {
        assert_eq!(ids, &(1..=3).collect::<HashSet<u64>>());
    }

    Ok(())
}

#[tokio::test]
async fn test_repeated_run_is_observed_at_least_once() -> Result<(), Box<dyn std::error::Error>> {
    init_test_tracing();

    let run_id = unique_test_run_id("loopback-replay");
    let queue = MemoryQueue::new();
    let generator = loopback_generator(&queue);

    // The same run published twice, as after a producer restart.
    for _ in 0..2 {
        let request = GenerationRequest::new(5, 0, Some(run_id.clone()));
        assert!(generator.generate(&request).await);
    }

    let sink = MemoryMetricSink::new();
    let recorder = LatencyRecorder::new(&sink);
    let mut source = queue.clone();
    let report = run_recorder(&mut source, &recorder, &consume_options(10)).await?;

    // Duplicates are observed and recorded, never collapsed.
    assert_eq!(report.messages_observed, 10);
    assert_eq!(report.recording_failures, 0);
    assert_eq!(sink.emitted().len(), 10);

    Ok(())
}

#[tokio::test]
async fn test_jsonl_sink_captures_the_run() -> Result<(), Box<dyn std::error::Error>> {
    init_test_tracing();

    let run_id = unique_test_run_id("loopback-jsonl");
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("observations.jsonl");

    let queue = MemoryQueue::new();
    let generator = loopback_generator(&queue);
    let request = GenerationRequest::new(4, 0, Some(run_id.clone()));

    assert!(generator.generate(&request).await);

    let recorder = LatencyRecorder::new(JsonlMetricSink::create(&path)?);
    let mut source = queue.clone();
    let report = run_recorder(&mut source, &recorder, &consume_options(4)).await?;
    assert_eq!(report.messages_observed, 4);

    let contents = std::fs::read_to_string(&path)?;
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 4);
    for line in lines {
        let entry: serde_json::Value = serde_json::from_str(line)?;
        assert_eq!(entry["metric"], "messageProcessTimeMs");
        assert!(entry["value"].as_f64().is_some());
        assert_eq!(entry["dimensions"]["TestRunId"], run_id.as_str());
    }

    Ok(())
}

#[tokio::test]
async fn test_latency_is_measured_from_the_envelope() -> Result<(), Box<dyn std::error::Error>> {
    init_test_tracing();

    let queue = MemoryQueue::new();
    let generator = loopback_generator(&queue);
    let request = GenerationRequest::new(3, 0, None);

    assert!(generator.generate(&request).await);

    // Deliveries sit in the queue for a while before consumption.
    tokio::time::sleep(std::time::Duration::from_millis(150)).await;

    let sink = MemoryMetricSink::new();
    let recorder = LatencyRecorder::new(&sink);
    let mut source = queue.clone();
    let report = run_recorder(&mut source, &recorder, &consume_options(3)).await?;

    assert_eq!(report.messages_observed, 3);
    for value in sink.values() {
        assert!(value >= 150.0, "latency {value}ms below queue dwell time");
    }

    Ok(())
}
