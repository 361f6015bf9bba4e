//! End-to-end latency measurement for received messages.

use crate::error::ObservationError;
use chrono::Utc;
use loadgen_core::message::MessageRecord;
use loadgen_core::metrics::{LatencyObservation, MetricSink, MESSAGE_PROCESS_TIME_MS};
use loadgen_core::transport::ReceivedMessage;
use tracing::{debug, error, trace};

/// Computes delivery latency for received messages and emits it through a
/// [`MetricSink`].
///
/// Latency is always measured against the enqueue timestamp carried in the
/// message envelope, never against the broker's own bookkeeping. The
/// broker timestamp rides along as a separate dimension when available.
pub struct LatencyRecorder<M: MetricSink> {
    sink: M,
}

/// Outcome of recording one batch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub observations: Vec<LatencyObservation>,
    pub failed: u64,
}

impl<M: MetricSink> LatencyRecorder<M> {
    pub fn new(sink: M) -> Self {
        Self { sink }
    }

    /// Record one message.
    ///
    /// Clock skew between producer and consumer can make the elapsed time
    /// negative; the value is emitted unchanged so skew stays visible in
    /// the metric stream.
    pub fn record(
        &self,
        message: &ReceivedMessage,
    ) -> Result<LatencyObservation, ObservationError> {
        let dequeued_time = Utc::now();
        let record = MessageRecord::from_wire(&message.body)?;

        let elapsed = dequeued_time.signed_duration_since(record.enqueue_time_utc);
        let elapsed_ms = elapsed
            .num_microseconds()
            .map(|us| us as f64 / 1000.0)
            .unwrap_or_else(|| elapsed.num_milliseconds() as f64);

        let observation = LatencyObservation {
            test_run_id: record.test_run_id,
            message_id: record.message_id,
            session_id: record.session_id,
            partition: message.partition,
            system_enqueued_time: message.system_enqueued_time,
            client_enqueued_time: record.enqueue_time_utc,
            dequeued_time,
            elapsed_ms,
        };

        if observation.elapsed_ms < 0.0 {
            debug!(
                "Message {} of run {} measured {:.3}ms end to end (producer clock ahead of consumer)",
                observation.message_id, observation.test_run_id, observation.elapsed_ms
            );
        } else {
            trace!(
                "Message {} of run {} took {:.3}ms end to end",
                observation.message_id,
                observation.test_run_id,
                observation.elapsed_ms
            );
        }

        self.sink
            .emit(
                MESSAGE_PROCESS_TIME_MS,
                observation.elapsed_ms,
                observation.dimensions(),
            )
            .map_err(|e| ObservationError::Emit(e.to_string()))?;

        Ok(observation)
    }

    /// Record every message in a batch, in delivery order.
    ///
    /// A failure on one message is logged and counted and never blocks the
    /// rest of the batch. Recording never gates acknowledgment either; the
    /// caller commits the batch regardless of this outcome.
    pub fn record_batch(&self, messages: &[ReceivedMessage]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for message in messages {
            match self.record(message) {
                Ok(observation) => outcome.observations.push(observation),
                Err(e) => {
                    error!("Failed to record received message: {e}");
                    outcome.failed += 1;
                }
            }
        }
        outcome
    }
}
