//! mq-loadgen library
//!
//! A harness for generating synthetic message-queue load and measuring
//! end-to-end delivery latency.
//!
//! # Features
//!
//! - Fan-out generation: flat runs or per-session partitioned runs
//! - Bounded retry publishing: transient failures retried, fatal ones not
//! - Latency recording: one observation per delivered message
//! - Dead-letter draining: sweep poison queues between runs
//!
//! # Crates
//!
//! The workspace splits along the transport seam:
//!
//! - `loadgen-core` - envelope, transport traits, metric interface
//! - `loadgen-producer` - fan-out generator and retrying publisher
//! - `loadgen-consumer` - latency recorder, consume loop, dead-letter drain
//! - `loadgen-kafka` - Kafka binding for the transport traits
//!
//! # CLI Usage
//!
//! ```bash
//! # Publish 1000 messages across 10 sessions
//! mq-loadgen produce --total-count 1000 --partition-count 10 --brokers localhost:9092
//!
//! # Record latencies with 4 consumers for 60 seconds
//! mq-loadgen consume --num-consumers 4 --run-for-secs 60 --brokers localhost:9092
//!
//! # Sweep the dead-letter topic
//! mq-loadgen drain --brokers localhost:9092
//! ```

use clap::Args;

pub mod commands;
pub mod testing;

// Re-export the library surface the CLI wires together
pub use loadgen_consumer::{
    drain_dead_letters, run_recorder, ConsumeOptions, ConsumeReport, DrainReport,
    JsonlMetricSink, LatencyRecorder, TracingMetricSink,
};
pub use loadgen_core::{GenerationRequest, MemoryQueue, MessageRecord, MetricSink, SharedPayload};
pub use loadgen_producer::{FanOutGenerator, ReliablePublisher, MAX_RETRY_ATTEMPTS};

/// Broker connection options shared by every transport-facing command.
#[derive(Args, Clone, Debug)]
pub struct KafkaOpts {
    /// Kafka brokers (comma-separated, e.g., "localhost:9092")
    #[arg(long, env = "KAFKA_BROKERS", default_value = "localhost:9092")]
    pub brokers: String,

    /// Topic to publish to and consume from
    #[arg(long, env = "LOADGEN_TOPIC", default_value = "loadgen")]
    pub topic: String,
}
