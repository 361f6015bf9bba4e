//! Transport adapter seams.
//!
//! A transport binding implements [`MessageSink`] on the producing side and
//! [`MessageSource`] on the consuming side. The rest of the harness only
//! sees these traits, so a binding is a thin push/pull layer over one
//! broker API.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors surfaced by transport adapters.
///
/// The taxonomy drives the retry loop: transient failures are retried up
/// to the attempt budget, fatal ones are not retried at all.
#[derive(Error, Debug)]
pub enum TransportError {
    /// A single attempt failed but a retry may succeed.
    #[error("transient transport error: {0}")]
    Transient(String),

    /// The message can never be delivered; retrying is pointless.
    #[error("fatal transport error: {0}")]
    Fatal(String),
}

impl TransportError {
    pub fn transient(reason: impl Into<String>) -> Self {
        TransportError::Transient(reason.into())
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        TransportError::Fatal(reason.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Transient(_))
    }
}

/// A serialized record plus the routing metadata a transport needs.
///
/// The body is produced once per record; retries resend these exact bytes.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    /// Routes messages of one session to one partition, when set.
    pub session_key: Option<String>,
    pub test_run_id: String,
    pub message_id: u64,
    pub body: Bytes,
}

/// A message handed out by a [`MessageSource`].
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub body: Bytes,
    /// Broker-side enqueue timestamp, when the transport exposes one.
    pub system_enqueued_time: Option<DateTime<Utc>>,
    /// Transport-level partition index, when the transport exposes one.
    pub partition: Option<i32>,
}

/// Producer-side transport seam.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Deliver one message.
    async fn send(&self, message: &OutboundMessage) -> Result<(), TransportError>;
}

/// Consumer-side transport seam with at-least-once acknowledgment.
#[async_trait]
pub trait MessageSource: Send {
    /// Receive the next batch in delivery order. An empty batch means
    /// nothing arrived within the poll window.
    async fn receive(&mut self) -> Result<Vec<ReceivedMessage>, TransportError>;

    /// Acknowledge everything handed out since the last commit.
    async fn commit(&mut self) -> Result<(), TransportError>;
}
