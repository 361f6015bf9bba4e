//! Fan-out orchestration of bulk generation requests.

use crate::publisher::ReliablePublisher;
use bytes::Bytes;
use loadgen_core::message::{GenerationRequest, MessageRecord};
use loadgen_core::payload::SharedPayload;
use loadgen_core::transport::MessageSink;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Splits a bulk request into per-message publish units, runs them
/// concurrently, and folds their outcomes into one aggregate flag.
///
/// # Example
///
/// ```ignore
/// let publisher = ReliablePublisher::new(Arc::new(sink));
/// let generator = FanOutGenerator::new(publisher, SharedPayload::builtin());
///
/// let request = GenerationRequest::new(1000, 4, None);
/// let all_delivered = generator.generate(&request).await;
/// ```
pub struct FanOutGenerator<T: MessageSink + 'static> {
    publisher: Arc<ReliablePublisher<T>>,
    payload: Arc<SharedPayload>,
}

/// Clone support for detached runs; clones share publisher and payload
impl<T: MessageSink + 'static> Clone for FanOutGenerator<T> {
    fn clone(&self) -> Self {
        Self {
            publisher: Arc::clone(&self.publisher),
            payload: Arc::clone(&self.payload),
        }
    }
}

impl<T: MessageSink + 'static> FanOutGenerator<T> {
    pub fn new(publisher: ReliablePublisher<T>, payload: SharedPayload) -> Self {
        Self {
            publisher: Arc::new(publisher),
            payload: Arc::new(payload),
        }
    }

    /// Run a request to completion and report whether every unit delivered.
    ///
    /// Every unit is spawned as its own task and every task is awaited;
    /// one unit failing never cancels the others. A unit whose task cannot
    /// be driven to completion counts as a failure like any other.
    pub async fn generate(&self, request: &GenerationRequest) -> bool {
        let payload = match self.payload.get().await {
            Ok(payload) => payload,
            Err(e) => {
                error!(
                    "Failed to load payload content for run {}: {e}",
                    request.test_run_id
                );
                return false;
            }
        };

        if request.is_partitioned() {
            info!(
                "Generating {} message(s) for each of {} session(s) for run {}",
                request.total_count, request.partition_count, request.test_run_id
            );
        } else {
            info!(
                "Generating {} message(s) for run {}",
                request.total_count, request.test_run_id
            );
        }

        let mut handles = Vec::with_capacity(request.unit_count() as usize);
        if request.is_partitioned() {
            for _ in 0..request.partition_count {
                // One fresh session per sub-job, never reused.
                let session_id = Uuid::new_v4().to_string();
                debug!("Kicked off message creation for session {session_id}");
                for message_id in 1..=request.total_count {
                    handles.push(self.dispatch(
                        request.test_run_id.clone(),
                        message_id,
                        Some(session_id.clone()),
                        payload.clone(),
                    ));
                }
            }
        } else {
            for message_id in 1..=request.total_count {
                handles.push(self.dispatch(
                    request.test_run_id.clone(),
                    message_id,
                    None,
                    payload.clone(),
                ));
            }
        }

        let mut all_published = true;
        for handle in handles {
            match handle.await {
                Ok(published) => all_published &= published,
                Err(e) => {
                    error!("Publish unit did not complete: {e}");
                    all_published = false;
                }
            }
        }

        info!(
            "Generation for run {} finished (success: {all_published})",
            request.test_run_id
        );
        all_published
    }

    fn dispatch(
        &self,
        test_run_id: String,
        message_id: u64,
        session_id: Option<String>,
        payload: Bytes,
    ) -> JoinHandle<bool> {
        let publisher = Arc::clone(&self.publisher);
        tokio::spawn(async move {
            let record = MessageRecord {
                test_run_id,
                message_id,
                session_id,
                enqueue_time_utc: chrono::Utc::now(),
                payload,
            };
            publisher.publish(&record).await
        })
    }

    /// Kick off a request without waiting for it.
    ///
    /// The returned handle is what an entry point would hold on to: it can
    /// poll or await the aggregate outcome. Dropping the handle only stops
    /// observing; in-flight units run to completion.
    pub fn spawn_generate(&self, request: GenerationRequest) -> GenerationHandle {
        let generator = self.clone();
        let test_run_id = request.test_run_id.clone();
        let task = tokio::spawn(async move { generator.generate(&request).await });
        GenerationHandle { test_run_id, task }
    }
}

/// Completion handle for a detached generation request.
pub struct GenerationHandle {
    test_run_id: String,
    task: JoinHandle<bool>,
}

impl GenerationHandle {
    pub fn test_run_id(&self) -> &str {
        &self.test_run_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the aggregate outcome. A request whose driving task could
    /// not complete counts as failed.
    pub async fn outcome(self) -> bool {
        match self.task.await {
            Ok(all_published) => all_published,
            Err(e) => {
                error!("Generation task did not complete: {e}");
                false
            }
        }
    }
}
