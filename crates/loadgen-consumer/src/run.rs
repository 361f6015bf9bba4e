//! Bounded consume-and-record run loop.

use crate::recorder::{BatchOutcome, LatencyRecorder};
use chrono::{DateTime, Utc};
use loadgen_core::metrics::MetricSink;
use loadgen_core::transport::{MessageSource, TransportError};
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

/// Bounds for a consume run. An unset field leaves the loop unbounded on
/// that axis.
#[derive(Debug, Clone, Default)]
pub struct ConsumeOptions {
    pub deadline: Option<DateTime<Utc>>,
    /// Stop once this many messages were seen, recorded or not.
    pub max_messages: Option<u64>,
}

/// Summary of one consume run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumeReport {
    pub messages_observed: u64,
    pub recording_failures: u64,
    pub negative_observations: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_elapsed_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_elapsed_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_elapsed_ms: Option<f64>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl ConsumeReport {
    /// Combine two reports, as when several consumers of one group each
    /// produce their own.
    pub fn merge(self, other: ConsumeReport) -> ConsumeReport {
        let messages_observed = self.messages_observed + other.messages_observed;
        let mean_elapsed_ms = match (self.elapsed_sum(), other.elapsed_sum()) {
            (None, None) => None,
            (a, b) => {
                Some((a.unwrap_or(0.0) + b.unwrap_or(0.0)) / messages_observed as f64)
            }
        };

        ConsumeReport {
            messages_observed,
            recording_failures: self.recording_failures + other.recording_failures,
            negative_observations: self.negative_observations + other.negative_observations,
            min_elapsed_ms: merge_with(self.min_elapsed_ms, other.min_elapsed_ms, f64::min),
            max_elapsed_ms: merge_with(self.max_elapsed_ms, other.max_elapsed_ms, f64::max),
            mean_elapsed_ms,
            started_at: self.started_at.min(other.started_at),
            completed_at: self.completed_at.max(other.completed_at),
        }
    }

    fn elapsed_sum(&self) -> Option<f64> {
        self.mean_elapsed_ms
            .map(|mean| mean * self.messages_observed as f64)
    }
}

fn merge_with(a: Option<f64>, b: Option<f64>, pick: fn(f64, f64) -> f64) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(pick(a, b)),
        (a, b) => a.or(b),
    }
}

#[derive(Debug, Default)]
struct LatencyStats {
    observed: u64,
    failed: u64,
    negatives: u64,
    sum_ms: f64,
    min_ms: Option<f64>,
    max_ms: Option<f64>,
}

impl LatencyStats {
    fn seen(&self) -> u64 {
        self.observed + self.failed
    }

    fn absorb(&mut self, outcome: &BatchOutcome) {
        self.failed += outcome.failed;
        for observation in &outcome.observations {
            self.observed += 1;
            self.sum_ms += observation.elapsed_ms;
            if observation.elapsed_ms < 0.0 {
                self.negatives += 1;
            }
            self.min_ms = Some(
                self.min_ms
                    .map_or(observation.elapsed_ms, |m| m.min(observation.elapsed_ms)),
            );
            self.max_ms = Some(
                self.max_ms
                    .map_or(observation.elapsed_ms, |m| m.max(observation.elapsed_ms)),
            );
        }
    }

    fn into_report(self, started_at: DateTime<Utc>) -> ConsumeReport {
        ConsumeReport {
            messages_observed: self.observed,
            recording_failures: self.failed,
            negative_observations: self.negatives,
            min_elapsed_ms: self.min_ms,
            max_elapsed_ms: self.max_ms,
            mean_elapsed_ms: (self.observed > 0).then(|| self.sum_ms / self.observed as f64),
            started_at,
            completed_at: Utc::now(),
        }
    }
}

/// Drive a source until a bound is hit, recording every delivered message.
///
/// Transient receive failures are logged and retried after a short pause;
/// fatal ones abort the run. Each batch is committed after recording
/// whether or not individual messages could be recorded, and a failed
/// commit is logged and tolerated. Both keep delivery at-least-once.
pub async fn run_recorder<S, M>(
    source: &mut S,
    recorder: &LatencyRecorder<M>,
    options: &ConsumeOptions,
) -> Result<ConsumeReport, TransportError>
where
    S: MessageSource,
    M: MetricSink,
{
    let started_at = Utc::now();
    let mut stats = LatencyStats::default();

    match (options.deadline, options.max_messages) {
        (Some(deadline), Some(max)) => info!("Consuming until {deadline} or {max} message(s)"),
        (Some(deadline), None) => info!("Consuming until {deadline}"),
        (None, Some(max)) => info!("Consuming until {max} message(s) were seen"),
        (None, None) => info!("Consuming until interrupted"),
    }

    loop {
        if let Some(deadline) = options.deadline {
            if Utc::now() >= deadline {
                info!("Deadline reached, completing consume run");
                break;
            }
        }
        if let Some(max) = options.max_messages {
            if stats.seen() >= max {
                info!(
                    "Reached max message limit ({max}), completing consume run after {} message(s)",
                    stats.seen()
                );
                break;
            }
        }

        let batch = match source.receive().await {
            Ok(batch) => batch,
            Err(TransportError::Transient(reason)) => {
                warn!("Receive failed: {reason}. Retrying...");
                sleep(Duration::from_millis(100)).await;
                continue;
            }
            Err(e @ TransportError::Fatal(_)) => return Err(e),
        };

        if batch.is_empty() {
            continue;
        }

        let outcome = recorder.record_batch(&batch);
        stats.absorb(&outcome);

        // At-least-once: acknowledge the batch even when some of it could
        // not be recorded, and keep going when the commit itself fails.
        if let Err(e) = source.commit().await {
            warn!("Failed to commit batch of {} message(s): {e}", batch.len());
        }
    }

    Ok(stats.into_report(started_at))
}
