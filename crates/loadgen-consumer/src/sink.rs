//! Metric sinks backed by the tracing pipeline and by JSON Lines files.

use loadgen_core::metrics::{MetricError, MetricSink};
use serde_json::{json, Map, Value};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

/// Emits every observation as a structured log line.
///
/// The default sink: useful when the operator only wants the per-message
/// latencies in the console or whatever the subscriber forwards to.
#[derive(Debug, Default, Clone)]
pub struct TracingMetricSink;

impl MetricSink for TracingMetricSink {
    fn emit(&self, name: &str, value: f64, dimensions: Map<String, Value>) -> Result<(), MetricError> {
        info!("metric {name}={value} dimensions={}", Value::Object(dimensions));
        Ok(())
    }
}

/// Appends one JSON object per observation to a file.
pub struct JsonlMetricSink {
    writer: Mutex<BufWriter<File>>,
}

impl JsonlMetricSink {
    /// Creates (or truncates) the file at `path`.
    pub fn create(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = File::create(path)?;
        Ok(JsonlMetricSink {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl MetricSink for JsonlMetricSink {
    fn emit(&self, name: &str, value: f64, dimensions: Map<String, Value>) -> Result<(), MetricError> {
        let line = json!({
            "metric": name,
            "value": value,
            "dimensions": dimensions,
        });
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| MetricError::Sink(format!("metric writer lock poisoned: {e}")))?;
        writeln!(writer, "{line}").map_err(|e| MetricError::Sink(e.to_string()))?;
        writer.flush().map_err(|e| MetricError::Sink(e.to_string()))?;
        Ok(())
    }
}
