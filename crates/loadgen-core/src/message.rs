//! Message envelope and correlation types shared by producers and consumers.

use crate::transport::OutboundMessage;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One unit of synthetic traffic.
///
/// The wire form is JSON with PascalCase keys (`TestRunId`, `MessageId`,
/// `SessionId`, `EnqueueTimeUtc`, `Content`); the payload bytes travel
/// base64-encoded in `Content`. Only the transport boundary deals with the
/// wire form, everything else handles this struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessageRecord {
    /// Correlates all messages and metrics from one load-test invocation.
    pub test_run_id: String,
    /// Sequence number unique within a session, starting at 1.
    pub message_id: u64,
    /// Session key for session-aware runs; absent for plain queues.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Client-side enqueue timestamp, captured when the publish unit runs.
    pub enqueue_time_utc: DateTime<Utc>,
    /// Synthetic content, shared read-only across all units of a run.
    #[serde(rename = "Content", with = "base64_bytes")]
    pub payload: Bytes,
}

impl MessageRecord {
    /// Serialize to the wire form.
    pub fn to_wire(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }

    /// Decode a received body back into a record.
    pub fn from_wire(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// Serialize into the transport boundary form, carrying the routing
    /// metadata alongside the wire bytes.
    pub fn to_outbound(&self) -> Result<OutboundMessage, serde_json::Error> {
        Ok(OutboundMessage {
            session_key: self.session_id.clone(),
            test_run_id: self.test_run_id.clone(),
            message_id: self.message_id,
            body: self.to_wire()?,
        })
    }
}

/// A bulk "produce N messages" request.
///
/// `partition_count == 0` asks for a single flat sequence of
/// `total_count` messages. A non-zero `partition_count` asks for that many
/// sessions, each carrying `total_count` messages of its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub total_count: u64,
    pub partition_count: u32,
    /// Correlation id shared by every message of the run.
    pub test_run_id: String,
}

impl GenerationRequest {
    /// Build a request, minting a fresh run id when the caller has none.
    pub fn new(total_count: u64, partition_count: u32, test_run_id: Option<String>) -> Self {
        Self {
            total_count,
            partition_count,
            test_run_id: test_run_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        }
    }

    pub fn is_partitioned(&self) -> bool {
        self.partition_count > 0
    }

    /// Number of independent publish units this request fans out into.
    pub fn unit_count(&self) -> u64 {
        if self.is_partitioned() {
            self.total_count * u64::from(self.partition_count)
        } else {
            self.total_count
        }
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let decoded = STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)?;
        Ok(Bytes::from(decoded))
    }
}
