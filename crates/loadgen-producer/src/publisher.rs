//! Bounded-retry publishing of a single message.

use loadgen_core::message::MessageRecord;
use loadgen_core::transport::{MessageSink, TransportError};
use std::sync::Arc;
use tracing::{error, trace};

/// Default number of delivery attempts before a unit gives up.
pub const MAX_RETRY_ATTEMPTS: u32 = 10;

/// Publishes one record at a time, retrying transient transport failures
/// up to a fixed attempt budget.
///
/// The record is serialized exactly once per `publish` call; every attempt
/// resends the same bytes, so retries keep the original enqueue timestamp
/// and a delivered duplicate is indistinguishable from the first copy.
pub struct ReliablePublisher<T: MessageSink> {
    transport: Arc<T>,
    max_attempts: u32,
}

impl<T: MessageSink> ReliablePublisher<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            max_attempts: MAX_RETRY_ATTEMPTS,
        }
    }

    /// Override the attempt budget. Values below 1 are raised to 1.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Publish a record, retrying transient failures. Returns whether the
    /// record was delivered within the attempt budget.
    ///
    /// Fatal transport errors and serialization failures give up
    /// immediately. Failures are logged with the correlation metadata and
    /// reported only through the returned flag.
    pub async fn publish(&self, record: &MessageRecord) -> bool {
        let message = match record.to_outbound() {
            Ok(message) => message,
            Err(e) => {
                error!(
                    "Failed to serialize message {} of run {}: {e}",
                    record.message_id, record.test_run_id
                );
                return false;
            }
        };

        let session = message.session_key.as_deref().unwrap_or("");
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.transport.send(&message).await {
                Ok(()) => {
                    trace!(
                        "Posted message {} (Size: {} bytes) for session '{}' in {} attempt(s)",
                        message.message_id,
                        message.body.len(),
                        session,
                        attempts
                    );
                    return true;
                }
                Err(TransportError::Fatal(reason)) => {
                    error!(
                        "Unable to post message {} for session '{}': {reason}",
                        message.message_id, session
                    );
                    return false;
                }
                Err(TransportError::Transient(reason)) => {
                    if attempts >= self.max_attempts {
                        error!(
                            "Unable to post message {} for session '{}' after {} attempt(s). Giving up: {reason}",
                            message.message_id, session, attempts
                        );
                        return false;
                    }
                    error!(
                        "Attempt {} to post message {} for session '{}' failed: {reason}. Retrying...",
                        attempts, message.message_id, session
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::Utc;
    use loadgen_core::testing::ScriptedSink;

    fn record(message_id: u64) -> MessageRecord {
        MessageRecord {
            test_run_id: "run-1".to_string(),
            message_id,
            session_id: None,
            enqueue_time_utc: Utc::now(),
            payload: Bytes::from_static(b"payload"),
        }
    }

    #[tokio::test]
    async fn test_publish_succeeds_first_attempt() {
        let sink = Arc::new(ScriptedSink::reliable());
        let publisher = ReliablePublisher::new(Arc::clone(&sink));

        assert!(publisher.publish(&record(1)).await);
        assert_eq!(sink.attempts_for(None, 1), 1);
        assert_eq!(sink.delivered().len(), 1);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        // Nine transient failures, success on the tenth attempt.
        let sink = Arc::new(ScriptedSink::failing_first(9));
        let publisher = ReliablePublisher::new(Arc::clone(&sink));

        assert!(publisher.publish(&record(1)).await);
        assert_eq!(sink.attempts_for(None, 1), 10);
        assert_eq!(sink.delivered().len(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_attempt_budget() {
        let sink = Arc::new(ScriptedSink::reliable().with_always_failing(1));
        let publisher = ReliablePublisher::new(Arc::clone(&sink));

        assert!(!publisher.publish(&record(1)).await);
        assert_eq!(sink.attempts_for(None, 1), MAX_RETRY_ATTEMPTS);
        assert!(sink.delivered().is_empty());
    }

    #[tokio::test]
    async fn test_custom_attempt_budget() {
        let sink = Arc::new(ScriptedSink::failing_first(3));
        let publisher = ReliablePublisher::new(Arc::clone(&sink)).with_max_attempts(3);

        // Budget of 3 is not enough for 3 failures plus a success.
        assert!(!publisher.publish(&record(1)).await);
        assert_eq!(sink.attempts_for(None, 1), 3);

        let sink = Arc::new(ScriptedSink::failing_first(3));
        let publisher = ReliablePublisher::new(Arc::clone(&sink)).with_max_attempts(4);
        assert!(publisher.publish(&record(1)).await);
        assert_eq!(sink.attempts_for(None, 1), 4);
    }

    #[tokio::test]
    async fn test_attempt_budget_clamped_to_one() {
        let sink = Arc::new(ScriptedSink::reliable().with_always_failing(1));
        let publisher = ReliablePublisher::new(Arc::clone(&sink)).with_max_attempts(0);

        assert!(!publisher.publish(&record(1)).await);
        assert_eq!(sink.attempts_for(None, 1), 1);
    }

    #[tokio::test]
    async fn test_fatal_error_stops_retrying() {
        let sink = Arc::new(ScriptedSink::reliable().with_fatal(1));
        let publisher = ReliablePublisher::new(Arc::clone(&sink));

        assert!(!publisher.publish(&record(1)).await);
        assert_eq!(sink.attempts_for(None, 1), 1);
    }

    #[tokio::test]
    async fn test_retries_resend_identical_bytes() {
        let sink = Arc::new(ScriptedSink::failing_first(4));
        let publisher = ReliablePublisher::new(Arc::clone(&sink));

        assert!(publisher.publish(&record(1)).await);

        let bodies = sink.bodies_for(None, 1);
        assert_eq!(bodies.len(), 5);
        assert!(bodies.iter().all(|b| b == &bodies[0]));

        // The enqueue timestamp travels unchanged through every attempt.
        let value: serde_json::Value = serde_json::from_slice(&bodies[0]).unwrap();
        let last: serde_json::Value = serde_json::from_slice(&bodies[4]).unwrap();
        assert_eq!(value["EnqueueTimeUtc"], last["EnqueueTimeUtc"]);
    }

    #[tokio::test]
    async fn test_session_key_carried_to_transport() {
        let sink = Arc::new(ScriptedSink::reliable());
        let publisher = ReliablePublisher::new(Arc::clone(&sink));

        let mut with_session = record(2);
        with_session.session_id = Some("session-b".to_string());
        assert!(publisher.publish(&with_session).await);

        let delivered = sink.delivered();
        assert_eq!(delivered[0].session_key.as_deref(), Some("session-b"));
        assert_eq!(sink.attempts_for(Some("session-b"), 2), 1);
    }
}
