//! Error types for bandscore

use thiserror::Error;

/// Errors that can occur while routing samples or managing engine state.
///
/// Degenerate percentile ranges and `10^x` overflow are not errors: the engine
/// substitutes a defined value and reports a
/// [`NormalizationFlag`](crate::types::NormalizationFlag) instead.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Unknown band: {0}")]
    UnknownBand(String),

    #[error("Unknown message address: {0}")]
    UnknownAddress(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Failed to parse engine state: {0}")]
    ParseError(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),
}
