//! Error types for Readlens
//!
//! Errors are typed by a stable code with an HTTP-like status rather than by
//! class hierarchy. Validation failures surface immediately to the caller
//! with their diagnostic payload attached; nothing is retried internally.

use crate::types::CalibrationPoint;
use thiserror::Error;

/// Errors that can occur across calibration, session and metrics operations
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Calibration not found: {0}")]
    CalibrationNotFound(String),

    #[error("Calibration has expired: {0}")]
    CalibrationExpired(String),

    #[error("Calibration accuracy too low: {accuracy:.1}% (required: {threshold:.0}%)")]
    CalibrationAccuracyLow {
        accuracy: f64,
        threshold: f64,
        mean_error_px: f64,
        points: Vec<CalibrationPoint>,
    },

    #[error("Invalid gaze data: {0}")]
    InvalidGazeData(String),

    #[error("Metrics calculation failed: {0}")]
    MetricsCalculationFailed(String),

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("Ownership mismatch: {0}")]
    OwnershipMismatch(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl VisionError {
    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            VisionError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            VisionError::CalibrationNotFound(_) => "CALIBRATION_NOT_FOUND",
            VisionError::CalibrationExpired(_) => "CALIBRATION_EXPIRED",
            VisionError::CalibrationAccuracyLow { .. } => "CALIBRATION_ACCURACY_LOW",
            VisionError::InvalidGazeData(_) => "INVALID_GAZE_DATA",
            VisionError::MetricsCalculationFailed(_) => "METRICS_CALCULATION_FAILED",
            VisionError::InvalidState(_) => "INVALID_STATE",
            VisionError::OwnershipMismatch(_) => "OWNERSHIP_MISMATCH",
            VisionError::JsonError(_) => "INVALID_JSON",
        }
    }

    /// HTTP-like status for transport layers
    pub fn status(&self) -> u16 {
        match self {
            VisionError::SessionNotFound(_) | VisionError::CalibrationNotFound(_) => 404,
            VisionError::OwnershipMismatch(_) => 403,
            _ => 400,
        }
    }
}
