//! Kafka round-trip E2E test
//!
//! Requires a reachable broker, so the test is ignored by default. Point
//! `KAFKA_BROKERS` at a broker and run with `--ignored` to exercise it.
//!
//! Test flow:
//! 1. Create a fresh topic for this test run
//! 2. Publish a partitioned run through the Kafka sink
//! 3. Consume it back with the Kafka source and record latencies
//! 4. Assert the report accounts for every published message

use chrono::{Duration as ChronoDuration, Utc};
use loadgen_core::testing::MemoryMetricSink;
use loadgen_kafka::{KafkaSink, KafkaSource};
use mq_loadgen::testing::{init_test_tracing, unique_test_run_id};
use mq_loadgen::{
    run_recorder, ConsumeOptions, FanOutGenerator, GenerationRequest, LatencyRecorder,
    ReliablePublisher, SharedPayload,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

fn kafka_brokers() -> String {
    std::env::var("KAFKA_BROKERS").unwrap_or_else(|_| "localhost:9092".to_string())
}

#[tokio::test]
#[ignore = "requires a Kafka broker"]
async fn test_kafka_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    init_test_tracing();

    let brokers = kafka_brokers();
    let run_id = unique_test_run_id("kafka-e2e");
    let topic = format!("loadgen-test-{run_id}");
    let group_id = format!("loadgen-test-group-{run_id}");

    // Step 1: create the topic for this run
    let sink = KafkaSink::connect(&brokers, &topic)?;
    sink.ensure_topic(2).await?;
    sleep(Duration::from_millis(500)).await;

    // Step 2: publish 3 messages for each of 2 sessions
    let request = GenerationRequest::new(3, 2, Some(run_id.clone()));
    let expected = request.unit_count();

    let publisher = ReliablePublisher::new(Arc::new(sink));
    let generator = FanOutGenerator::new(publisher, SharedPayload::builtin());
    assert!(generator.generate(&request).await);

    // Step 3: consume the run back and record latencies
    let metric_sink = MemoryMetricSink::new();
    let recorder = LatencyRecorder::new(&metric_sink);
    let options = ConsumeOptions {
        deadline: Some(Utc::now() + ChronoDuration::seconds(60)),
        max_messages: Some(expected),
    };

    let mut source = KafkaSource::connect(&brokers, &group_id, &topic)?;
    let report = run_recorder(&mut source, &recorder, &options).await?;

    // Step 4: every published message came back decodable
    assert_eq!(report.messages_observed, expected);
    assert_eq!(report.recording_failures, 0);

    let emitted = metric_sink.emitted();
    assert_eq!(emitted.len(), expected as usize);
    for metric in &emitted {
        assert_eq!(metric.dimensions["TestRunId"], run_id.as_str());
        assert!(metric.dimensions.contains_key("PartitionId"));
    }

    Ok(())
}
