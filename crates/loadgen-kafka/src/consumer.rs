//! Kafka consume side of the transport.

use crate::error::KafkaTransportError;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use loadgen_core::transport::{MessageSource, ReceivedMessage, TransportError};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::{Offset, TopicPartitionList};
use std::collections::HashMap;
use std::time::Duration;

/// Default batch size for receive operations.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Reads envelopes from a single Kafka topic with manual offset management.
///
/// Offsets are committed only when the caller acknowledges a batch, so a
/// crash between receive and commit redelivers rather than drops. Each
/// consumer in a group owns its own `KafkaSource`; rebalancing is left to
/// the broker.
pub struct KafkaSource {
    consumer: StreamConsumer,
    topic: String,
    batch_size: usize,
    poll_timeout: Duration,
    // Highest offset seen per partition since the last commit.
    pending: HashMap<i32, i64>,
}

impl KafkaSource {
    /// Create a consumer in `group_id` subscribed to `topic`.
    pub fn connect(
        brokers: &str,
        group_id: &str,
        topic: &str,
    ) -> Result<Self, KafkaTransportError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()?;

        consumer.subscribe(&[topic])?;

        Ok(KafkaSource {
            consumer,
            topic: topic.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            poll_timeout: Duration::from_secs(1),
            pending: HashMap::new(),
        })
    }

    /// Set the maximum number of messages returned per receive call.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set how long a receive call waits for the first message.
    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }
}

fn to_received(message: &BorrowedMessage<'_>) -> ReceivedMessage {
    let body = message
        .payload()
        .map(Bytes::copy_from_slice)
        .unwrap_or_default();
    let system_enqueued_time = message
        .timestamp()
        .to_millis()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single());

    ReceivedMessage {
        body,
        system_enqueued_time,
        partition: Some(message.partition()),
    }
}

fn classify_consume_error(err: KafkaError) -> TransportError {
    match err.rdkafka_error_code() {
        Some(
            RDKafkaErrorCode::TopicAuthorizationFailed
            | RDKafkaErrorCode::GroupAuthorizationFailed
            | RDKafkaErrorCode::SaslAuthenticationFailed,
        ) => TransportError::fatal(format!("Kafka refused the consumer: {err}")),
        _ => TransportError::transient(format!("Kafka receive failed: {err}")),
    }
}

#[async_trait]
impl MessageSource for KafkaSource {
    /// Waits up to the poll timeout for a first message, then drains
    /// whatever else arrives within 10ms, up to the batch size.
    async fn receive(&mut self) -> Result<Vec<ReceivedMessage>, TransportError> {
        let mut messages = Vec::new();

        while messages.len() < self.batch_size {
            let wait = if messages.is_empty() {
                self.poll_timeout
            } else {
                Duration::from_millis(10)
            };

            match tokio::time::timeout(wait, self.consumer.recv()).await {
                Ok(Ok(msg)) => {
                    let received = to_received(&msg);
                    let tracked = self.pending.entry(msg.partition()).or_insert(msg.offset());
                    *tracked = (*tracked).max(msg.offset());
                    messages.push(received);
                }
                Ok(Err(e)) if messages.is_empty() => return Err(classify_consume_error(e)),
                // Hold on to what we have; a persistent error resurfaces
                // on the next call.
                Ok(Err(_)) | Err(_) => break,
            }
        }

        Ok(messages)
    }

    async fn commit(&mut self) -> Result<(), TransportError> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let mut tpl = TopicPartitionList::new();
        for (&partition, &offset) in &self.pending {
            tpl.add_partition_offset(&self.topic, partition, Offset::Offset(offset + 1))
                .map_err(|e| {
                    TransportError::transient(format!(
                        "Failed to stage offset for partition {partition}: {e}"
                    ))
                })?;
        }

        self.consumer
            .commit(&tpl, CommitMode::Sync)
            .map_err(|e| TransportError::transient(format!("Failed to commit offsets: {e}")))?;

        self.pending.clear();
        Ok(())
    }
}
