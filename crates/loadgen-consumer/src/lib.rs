//! Consumer side of the mq-loadgen harness.
//!
//! [`LatencyRecorder`] turns received messages into latency observations;
//! [`run_recorder`] drives a transport source until a deadline or message
//! bound; [`drain_dead_letters`] sweeps a dead-letter queue. Metric sink
//! implementations live in [`sink`].

pub mod drain;
pub mod error;
pub mod recorder;
pub mod run;
pub mod sink;

pub use drain::{drain_dead_letters, DrainReport};
pub use error::ObservationError;
pub use recorder::{BatchOutcome, LatencyRecorder};
pub use run::{run_recorder, ConsumeOptions, ConsumeReport};
pub use sink::{JsonlMetricSink, TracingMetricSink};
