//! Shared test doubles for exercising producer and consumer paths
//! without a broker.
//!
//! These are used by the crate tests across the workspace and by the
//! root integration tests, so they live in a regular public module.

use crate::metrics::{MetricError, MetricSink};
use crate::transport::{MessageSink, OutboundMessage, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Identifies one publish unit: session key plus message id.
pub type UnitKey = (Option<String>, u64);

/// A `MessageSink` with scripted failures, for retry and fan-out tests.
///
/// Behavior per send attempt, checked in order:
/// - message ids in `panic_on` panic, modeling a unit that dies mid-flight
/// - message ids in `fatal_on` get a fatal error
/// - message ids in `always_fail` get a transient error every time
/// - the first `transient_failures` attempts of every unit get a
///   transient error; later attempts succeed
///
/// All attempts and sent bodies are recorded for assertions.
#[derive(Default)]
pub struct ScriptedSink {
    transient_failures: u32,
    always_fail: HashSet<u64>,
    fatal_on: HashSet<u64>,
    panic_on: HashSet<u64>,
    state: Mutex<SinkState>,
}

#[derive(Default)]
struct SinkState {
    attempts: HashMap<UnitKey, u32>,
    delivered: Vec<OutboundMessage>,
    bodies: HashMap<UnitKey, Vec<Bytes>>,
}

impl ScriptedSink {
    /// A sink that accepts everything first try.
    pub fn reliable() -> Self {
        Self::default()
    }

    /// A sink that rejects the first `transient_failures` attempts of
    /// every unit.
    pub fn failing_first(transient_failures: u32) -> Self {
        Self {
            transient_failures,
            ..Self::default()
        }
    }

    /// Make every attempt for this message id fail with a transient error.
    pub fn with_always_failing(mut self, message_id: u64) -> Self {
        self.always_fail.insert(message_id);
        self
    }

    /// Make attempts for this message id fail with a fatal error.
    pub fn with_fatal(mut self, message_id: u64) -> Self {
        self.fatal_on.insert(message_id);
        self
    }

    /// Make attempts for this message id panic.
    pub fn with_panicking(mut self, message_id: u64) -> Self {
        self.panic_on.insert(message_id);
        self
    }

    /// Attempts recorded for one unit.
    pub fn attempts_for(&self, session: Option<&str>, message_id: u64) -> u32 {
        let key = (session.map(str::to_string), message_id);
        let state = self.state.lock().expect("sink state poisoned");
        state.attempts.get(&key).copied().unwrap_or(0)
    }

    /// Total send attempts across all units.
    pub fn total_sends(&self) -> u32 {
        let state = self.state.lock().expect("sink state poisoned");
        state.attempts.values().sum()
    }

    /// Messages that were accepted.
    pub fn delivered(&self) -> Vec<OutboundMessage> {
        let state = self.state.lock().expect("sink state poisoned");
        state.delivered.clone()
    }

    /// Bodies sent for one unit, one entry per attempt.
    pub fn bodies_for(&self, session: Option<&str>, message_id: u64) -> Vec<Bytes> {
        let key = (session.map(str::to_string), message_id);
        let state = self.state.lock().expect("sink state poisoned");
        state.bodies.get(&key).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl MessageSink for ScriptedSink {
    async fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        // Panic before taking the lock so other units keep working.
        if self.panic_on.contains(&message.message_id) {
            panic!("scripted panic for message {}", message.message_id);
        }

        let key = (message.session_key.clone(), message.message_id);
        let mut state = self.state.lock().expect("sink state poisoned");

        let counter = state.attempts.entry(key.clone()).or_insert(0);
        *counter += 1;
        let attempt = *counter;
        state.bodies.entry(key).or_default().push(message.body.clone());

        if self.fatal_on.contains(&message.message_id) {
            return Err(TransportError::fatal("scripted fatal failure"));
        }
        if self.always_fail.contains(&message.message_id) {
            return Err(TransportError::transient("scripted failure"));
        }
        if attempt <= self.transient_failures {
            return Err(TransportError::transient(format!(
                "scripted failure on attempt {attempt}"
            )));
        }

        state.delivered.push(message.clone());
        Ok(())
    }
}

/// One captured metric emission.
#[derive(Debug, Clone)]
pub struct EmittedMetric {
    pub name: String,
    pub value: f64,
    pub dimensions: Map<String, Value>,
}

/// A `MetricSink` that captures emissions for assertions.
#[derive(Default)]
pub struct MemoryMetricSink {
    emitted: Mutex<Vec<EmittedMetric>>,
}

impl MemoryMetricSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emitted(&self) -> Vec<EmittedMetric> {
        self.emitted.lock().expect("metric state poisoned").clone()
    }

    pub fn values(&self) -> Vec<f64> {
        self.emitted().iter().map(|m| m.value).collect()
    }
}

impl MetricSink for MemoryMetricSink {
    fn emit(
        &self,
        name: &str,
        value: f64,
        dimensions: Map<String, Value>,
    ) -> Result<(), MetricError> {
        self.emitted
            .lock()
            .expect("metric state poisoned")
            .push(EmittedMetric {
                name: name.to_string(),
                value,
                dimensions,
            });
        Ok(())
    }
}

/// A `MetricSink` that rejects every emission.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingMetricSink;

impl MetricSink for FailingMetricSink {
    fn emit(&self, _name: &str, _value: f64, _dimensions: Map<String, Value>) -> Result<(), MetricError> {
        Err(MetricError::Sink("scripted emission failure".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outbound(message_id: u64) -> OutboundMessage {
        OutboundMessage {
            session_key: None,
            test_run_id: "run-1".to_string(),
            message_id,
            body: Bytes::from_static(b"body"),
        }
    }

    #[tokio::test]
    async fn test_failing_first_rejects_then_accepts() {
        let sink = ScriptedSink::failing_first(2);
        let message = outbound(1);

        assert!(sink.send(&message).await.is_err());
        assert!(sink.send(&message).await.is_err());
        assert!(sink.send(&message).await.is_ok());

        assert_eq!(sink.attempts_for(None, 1), 3);
        assert_eq!(sink.delivered().len(), 1);
        assert_eq!(sink.bodies_for(None, 1).len(), 3);
    }

    #[tokio::test]
    async fn test_fatal_is_not_transient() {
        let sink = ScriptedSink::reliable().with_fatal(5);
        let err = sink.send(&outbound(5)).await.unwrap_err();
        assert!(!err.is_transient());
    }
}
