//! Producer side of the mq-loadgen harness.
//!
//! [`ReliablePublisher`] delivers one message with bounded retry;
//! [`FanOutGenerator`] splits a bulk request into per-message publish
//! units, runs them concurrently, and folds their outcomes into a single
//! aggregate flag.

pub mod generator;
pub mod publisher;

pub use generator::{FanOutGenerator, GenerationHandle};
pub use publisher::{ReliablePublisher, MAX_RETRY_ATTEMPTS};
