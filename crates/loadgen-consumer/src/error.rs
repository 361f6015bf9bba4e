//! Error types for the consumer side.

use thiserror::Error;

/// Errors recording a single received message.
///
/// Both variants are logged and counted by the batch path; neither ever
/// blocks acknowledgment of the batch.
#[derive(Error, Debug)]
pub enum ObservationError {
    #[error("malformed message envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("metric emission failed: {0}")]
    Emit(String),
}
