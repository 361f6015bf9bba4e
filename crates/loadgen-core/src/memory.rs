//! In-process loopback transport.
//!
//! Backs the `selftest` command and the integration tests: messages sent
//! through the sink side come back out of the source side immediately, so
//! the whole produce/consume path can run without a broker.

use crate::transport::{
    MessageSink, MessageSource, OutboundMessage, ReceivedMessage, TransportError,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Default number of messages handed out per `receive` call.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// An in-process queue implementing both transport seams.
///
/// Clones share the same underlying queue, so one clone can act as the
/// sink while another acts as the source.
pub struct MemoryQueue {
    queue: Arc<Mutex<VecDeque<ReceivedMessage>>>,
    batch_size: usize,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::with_batch_size(DEFAULT_BATCH_SIZE)
    }

    pub fn with_batch_size(batch_size: usize) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            batch_size: batch_size.max(1),
        }
    }

    /// Number of messages currently queued.
    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.queue.lock().await.is_empty()
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Clone support for using one queue as both sink and source
impl Clone for MemoryQueue {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            batch_size: self.batch_size,
        }
    }
}

#[async_trait]
impl MessageSink for MemoryQueue {
    async fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        let mut queue = self.queue.lock().await;
        queue.push_back(ReceivedMessage {
            body: message.body.clone(),
            system_enqueued_time: Some(Utc::now()),
            partition: None,
        });
        Ok(())
    }
}

#[async_trait]
impl MessageSource for MemoryQueue {
    async fn receive(&mut self) -> Result<Vec<ReceivedMessage>, TransportError> {
        let mut queue = self.queue.lock().await;
        if queue.is_empty() {
            drop(queue);
            // Behave like a poll window on an idle connection.
            tokio::time::sleep(Duration::from_millis(2)).await;
            return Ok(Vec::new());
        }

        let take = self.batch_size.min(queue.len());
        Ok(queue.drain(..take).collect())
    }

    async fn commit(&mut self) -> Result<(), TransportError> {
        // Delivery is immediate; there is nothing to acknowledge.
        Ok(())
    }
}
