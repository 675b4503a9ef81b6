//! Error Types for the Vibration Inference Pipeline
//!
//! ## Design Philosophy
//!
//! Errors are grouped by what the caller is expected to do about them, not by
//! which module raised them:
//!
//! 1. **Per-window degradation**: `ComputationError` and `AvailabilityError`
//!    abort a single window or remove a single detector from one tick. The
//!    stream keeps flowing.
//!
//! 2. **Boundary errors**: `InputError` describes malformed or insufficient
//!    samples and is surfaced to whoever feeds the pipeline.
//!
//! 3. **Fatal errors**: `CalibrationError` and `StateCorruptionError` stop the
//!    affected asset's pipeline. Scoring with missing statistics or a corrupted
//!    threshold state would silently produce unsafe decisions.
//!
//! ## Error Handling Strategy
//!
//! ```rust
//! use rotorguard_core::{Error, ErrorCategory};
//!
//! fn on_window_error(err: &Error) {
//!     if err.is_recoverable() {
//!         // Skip this window, keep processing
//!         return;
//!     }
//!     match err.category() {
//!         ErrorCategory::Input => { /* report to the stream owner */ }
//!         _ => { /* stop this asset's pipeline */ }
//!     }
//! }
//! ```

use thiserror::Error;

/// Result type for pipeline operations
pub type Result<T> = core::result::Result<T, Error>;

/// Malformed or insufficient input samples
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    /// Not enough samples to fill a window
    #[error("Insufficient data: need {required} samples, have {available}")]
    InsufficientData {
        /// Samples required to fill the window
        required: usize,
        /// Samples actually available
        available: usize,
    },

    /// Sample timestamps went backwards
    #[error("Out-of-order sample: timestamp {current} after {previous}")]
    OutOfOrder {
        /// Timestamp of the previous sample
        previous: u64,
        /// Timestamp of the offending sample
        current: u64,
    },

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// NaN or infinity produced while computing a feature or a score
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComputationError {
    /// A feature evaluated to NaN/Inf
    #[error("Feature {feature} is not finite")]
    NonFiniteFeature {
        /// Name of the offending feature
        feature: &'static str,
    },

    /// A detector produced a NaN/Inf score
    #[error("Detector {detector} produced a non-finite score")]
    NonFiniteScore {
        /// Name of the offending detector
        detector: String,
    },

    /// Input vector does not match the model layout
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension the model was built for
        expected: usize,
        /// Dimension received
        actual: usize,
    },
}

/// A detector or required history is missing this tick
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AvailabilityError {
    /// Not enough buffered feature vectors for a sequence detector
    #[error("Insufficient history: need {required} vectors, have {available}")]
    InsufficientHistory {
        /// Vectors the detector consumes
        required: usize,
        /// Vectors currently buffered
        available: usize,
    },

    /// Detector exceeded its time budget
    #[error("Detector {detector} timed out")]
    DetectorTimeout {
        /// Name of the detector
        detector: String,
    },

    /// Detector still running a call that timed out on an earlier tick
    #[error("Detector {detector} still busy with an earlier window")]
    DetectorBusy {
        /// Name of the detector
        detector: String,
    },

    /// Detector task failed to run
    #[error("Detector {detector} failed: {reason}")]
    DetectorFailed {
        /// Name of the detector
        detector: String,
        /// Failure description
        reason: String,
    },

    /// Every detector was unavailable this tick
    #[error("No detector available")]
    NoDetectorAvailable,
}

/// Scoring attempted before statistics or thresholds were fit
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// Normalizer used before stats were loaded
    #[error("Normalization statistics have not been fitted")]
    UnfittedStats,

    /// Detector used before its score scaler was fit
    #[error("Detector {detector} has no score calibration")]
    UncalibratedDetector {
        /// Name of the detector
        detector: String,
    },

    /// Threshold cuts violate ordering or range
    #[error("Invalid thresholds: warning {warning}, critical {critical}")]
    InvalidThresholds {
        /// Warning cut
        warning: f64,
        /// Critical cut
        critical: f64,
    },
}

/// Persisted state failed an invariant check on load
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateCorruptionError {
    /// Artifact schema version not supported
    #[error("Unsupported schema version {found} for {kind} (supported: {supported})")]
    SchemaVersion {
        /// Artifact kind
        kind: String,
        /// Version found on disk
        found: u32,
        /// Versions this build reads
        supported: String,
    },

    /// Artifact kind differs from the requested one
    #[error("Artifact kind mismatch: expected {expected}, found {found}")]
    KindMismatch {
        /// Kind requested by the loader
        expected: String,
        /// Kind recorded in the envelope
        found: String,
    },

    /// Payload decoded but breaks an invariant
    #[error("Invariant violated in {kind}: {reason}")]
    InvariantViolated {
        /// Artifact kind
        kind: String,
        /// Which invariant failed
        reason: String,
    },

    /// Payload could not be decoded
    #[error("Failed to decode artifact: {0}")]
    Decode(String),
}

/// Top-level pipeline error
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or insufficient samples
    #[error(transparent)]
    Input(#[from] InputError),

    /// NaN/Inf in a feature or score
    #[error(transparent)]
    Computation(#[from] ComputationError),

    /// Detector or history missing this tick
    #[error(transparent)]
    Availability(#[from] AvailabilityError),

    /// Stats or thresholds not fit
    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    /// Persisted state is unusable
    #[error(transparent)]
    StateCorruption(#[from] StateCorruptionError),

    /// Filesystem failure while reading or writing artifacts
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// See [`InputError`]
    Input,
    /// See [`ComputationError`]
    Computation,
    /// See [`AvailabilityError`]
    Availability,
    /// See [`CalibrationError`]
    Calibration,
    /// See [`StateCorruptionError`]
    StateCorruption,
    /// Filesystem failure
    Io,
}

impl Error {
    /// Category of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Input(_) => ErrorCategory::Input,
            Self::Computation(_) => ErrorCategory::Computation,
            Self::Availability(_) => ErrorCategory::Availability,
            Self::Calibration(_) => ErrorCategory::Calibration,
            Self::StateCorruption(_) => ErrorCategory::StateCorruption,
            Self::Io(_) => ErrorCategory::Io,
        }
    }

    /// True when the stream may continue with the next window
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Computation | ErrorCategory::Availability
        )
    }

    /// True when the owning asset pipeline must stop
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Calibration | ErrorCategory::StateCorruption
        )
    }
}
