//! Kafka bindings for the load generator's transport seams.
//!
//! [`KafkaSink`] publishes envelopes through a `FutureProducer` and
//! [`KafkaSource`] feeds the latency recorder from a `StreamConsumer` with
//! manual offset management. Broker errors are folded into the transport
//! error taxonomy so the retry policy upstream stays transport-agnostic.

pub mod consumer;
pub mod error;
pub mod producer;

pub use consumer::KafkaSource;
pub use error::KafkaTransportError;
pub use producer::KafkaSink;
