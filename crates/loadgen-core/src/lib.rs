//! Core types for the mq-loadgen harness.
//!
//! This crate defines the message envelope carried through the queue, the
//! transport seams producers and consumers plug into, the shared synthetic
//! payload, and the metric emission interface. Concrete broker bindings
//! live in `loadgen-kafka`; an in-process loopback queue for tests and the
//! self test lives in [`memory`].

pub mod memory;
pub mod message;
pub mod metrics;
pub mod payload;
pub mod testing;
pub mod transport;

// Re-exports for convenience
pub use memory::MemoryQueue;
pub use message::{GenerationRequest, MessageRecord};
pub use metrics::{LatencyObservation, MetricError, MetricSink, MESSAGE_PROCESS_TIME_MS};
pub use payload::SharedPayload;
pub use transport::{
    MessageSink, MessageSource, OutboundMessage, ReceivedMessage, TransportError,
};
