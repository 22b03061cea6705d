//! Error types

use thiserror::Error;

/// Failure to start, run or collect a calibration
#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("calibration of {sensor} is already running")]
    AlreadyRunning { sensor: String },

    #[error("another sensor named {sensor} is already managed")]
    DuplicateName { sensor: String },

    #[error("calibration needs at least one sample")]
    ZeroSamples,

    #[error("expected {expected} calibration targets, got {actual}")]
    TargetCountMismatch { expected: usize, actual: usize },

    #[error("calibration of {sensor} was cancelled")]
    Cancelled { sensor: String },

    #[error("failed to spawn calibration worker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("calibration worker for {sensor} panicked")]
    WorkerPanicked { sensor: String },

    #[error("no calibration run for {sensor}")]
    NotStarted { sensor: String },
}
