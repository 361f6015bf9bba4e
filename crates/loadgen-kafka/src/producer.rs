//! Kafka publish side of the transport.

use crate::error::KafkaTransportError;
use async_trait::async_trait;
use loadgen_core::transport::{MessageSink, OutboundMessage, TransportError};
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use std::time::Duration;
use tracing::info;

/// Publishes envelopes to a single Kafka topic.
///
/// Session keys become Kafka message keys, so partitioned runs keep
/// per-session ordering as long as the partitioner is key-based.
pub struct KafkaSink {
    producer: FutureProducer,
    brokers: String,
    topic: String,
    send_timeout: Duration,
}

impl KafkaSink {
    /// Create a producer connected to `brokers`, publishing to `topic`.
    pub fn connect(brokers: &str, topic: &str) -> Result<Self, KafkaTransportError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "30000")
            .set("queue.buffering.max.messages", "100000")
            .set("linger.ms", "5")
            .create()?;

        Ok(KafkaSink {
            producer,
            brokers: brokers.to_string(),
            topic: topic.to_string(),
            send_timeout: Duration::from_secs(30),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Create the target topic if it doesn't exist.
    pub async fn ensure_topic(&self, partitions: i32) -> Result<(), KafkaTransportError> {
        let admin_client: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .create()?;

        let new_topic = NewTopic::new(&self.topic, partitions, TopicReplication::Fixed(1));
        let opts = AdminOptions::new().operation_timeout(Some(Duration::from_secs(10)));

        match admin_client.create_topics(&[new_topic], &opts).await {
            Ok(results) => {
                for result in results {
                    match result {
                        Ok(topic_name) => {
                            info!("Topic '{}' created successfully", topic_name);
                        }
                        Err((topic_name, err)) => {
                            let err_str = err.to_string();
                            if err_str.contains("already exists")
                                || err_str.contains("TopicExistsException")
                            {
                                info!("Topic '{}' already exists", topic_name);
                            } else {
                                return Err(KafkaTransportError::TopicCreation(format!(
                                    "Failed to create topic {topic_name}: {err}"
                                )));
                            }
                        }
                    }
                }
            }
            Err(e) => {
                return Err(KafkaTransportError::TopicCreation(format!(
                    "Failed to create topic: {e}"
                )));
            }
        }

        Ok(())
    }
}

#[async_trait]
impl MessageSink for KafkaSink {
    async fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        let mut record = FutureRecord::<str, [u8]>::to(&self.topic).payload(message.body.as_ref());
        if let Some(key) = &message.session_key {
            record = record.key(key.as_str());
        }

        match self.producer.send(record, self.send_timeout).await {
            Ok(_) => Ok(()),
            Err((err, _)) => Err(classify_send_error(err)),
        }
    }
}

/// Split broker-side publish failures into retryable and hopeless.
///
/// An oversized message or a missing ACL will fail on every attempt, so the
/// retry budget upstream should not be spent on them. Everything else
/// (broker restarts, full local queues, transport hiccups) is transient.
fn classify_send_error(err: KafkaError) -> TransportError {
    match err.rdkafka_error_code() {
        Some(
            RDKafkaErrorCode::MessageSizeTooLarge
            | RDKafkaErrorCode::TopicAuthorizationFailed
            | RDKafkaErrorCode::SaslAuthenticationFailed,
        ) => TransportError::fatal(format!("Kafka refused the message: {err}")),
        _ => TransportError::transient(format!("Kafka publish failed: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oversized_message_is_fatal() {
        let err = KafkaError::MessageProduction(RDKafkaErrorCode::MessageSizeTooLarge);
        assert!(!classify_send_error(err).is_transient());
    }

    #[test]
    fn test_authorization_failures_are_fatal() {
        let topic = KafkaError::MessageProduction(RDKafkaErrorCode::TopicAuthorizationFailed);
        assert!(!classify_send_error(topic).is_transient());

        let sasl = KafkaError::MessageProduction(RDKafkaErrorCode::SaslAuthenticationFailed);
        assert!(!classify_send_error(sasl).is_transient());
    }

    #[test]
    fn test_broker_hiccups_are_transient() {
        let full = KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull);
        assert!(classify_send_error(full).is_transient());

        let timed_out = KafkaError::MessageProduction(RDKafkaErrorCode::MessageTimedOut);
        assert!(classify_send_error(timed_out).is_transient());
    }
}
