//! Dead-letter queue sweep.

use chrono::{DateTime, Utc};
use loadgen_core::message::MessageRecord;
use loadgen_core::transport::{MessageSource, TransportError};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Summary of a dead-letter sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrainReport {
    pub messages_cleared: u64,
    /// Cleared messages whose envelope could not be decoded.
    pub undecodable: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// Accept and discard everything a drainable source hands out.
///
/// Runs until the source has been idle for `idle_timeout`. Every cleared
/// message is logged; a message whose envelope cannot be decoded is
/// discarded all the same. Commit failures are logged and swallowed so the
/// sweep never wedges on a flaky acknowledgment.
pub async fn drain_dead_letters<S: MessageSource>(
    source: &mut S,
    idle_timeout: Duration,
) -> Result<DrainReport, TransportError> {
    let started_at = Utc::now();
    let mut cleared = 0u64;
    let mut undecodable = 0u64;
    let mut last_seen = Instant::now();

    info!("Draining dead-letter messages (idle timeout {idle_timeout:?})");

    while last_seen.elapsed() < idle_timeout {
        let batch = match source.receive().await {
            Ok(batch) => batch,
            Err(TransportError::Transient(reason)) => {
                warn!("Receive failed during drain: {reason}. Retrying...");
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }
            Err(e @ TransportError::Fatal(_)) => return Err(e),
        };

        if batch.is_empty() {
            continue;
        }
        last_seen = Instant::now();

        for message in &batch {
            match MessageRecord::from_wire(&message.body) {
                Ok(record) => {
                    info!(
                        "Cleared message {} (Size: {} bytes) of run {} from the dead-letter queue",
                        record.message_id,
                        message.body.len(),
                        record.test_run_id
                    );
                }
                Err(e) => {
                    undecodable += 1;
                    info!(
                        "Cleared undecodable message ({} bytes) from the dead-letter queue: {e}",
                        message.body.len()
                    );
                }
            }
            cleared += 1;
        }

        if let Err(e) = source.commit().await {
            warn!("Failed to commit cleared batch of {} message(s): {e}", batch.len());
        }
    }

    info!("Dead-letter drain finished: cleared {cleared} message(s)");

    Ok(DrainReport {
        messages_cleared: cleared,
        undecodable,
        started_at,
        completed_at: Utc::now(),
    })
}
