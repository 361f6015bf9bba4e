//! Error types for the Kafka transport.

use thiserror::Error;

/// Errors that can occur while setting up the Kafka transport.
#[derive(Error, Debug)]
pub enum KafkaTransportError {
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("Topic creation error: {0}")]
    TopicCreation(String),
}
