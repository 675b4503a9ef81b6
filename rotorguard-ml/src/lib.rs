//! Anomaly Scoring, Calibration and Prognostics for Rotating Machinery
//!
//! ## Overview
//!
//! This crate turns the normalized feature vectors produced by
//! `rotorguard-core` into decisions an operator can act on:
//!
//! ```text
//!                        ┌─ reconstruction (autoencoder) ─┐
//! z-scores ─► history ──►├─ isolation (forest) ───────────┤─► ensemble ─► cuts ─► EnsembleResult
//!                        └─ temporal (LSTM, last 100) ────┘        │
//!                                                                  ├─► AdaptiveThreshold (feedback)
//!                                                                  ├─► DriftMonitor (advisory)
//!                                                                  └─► RulEstimator (health trend)
//! ```
//!
//! ## Why an Ensemble?
//!
//! Each detector sees a different failure signature:
//!
//! - **Reconstruction** flags vectors the healthy manifold cannot explain
//! - **Isolation** flags vectors that sit in sparse regions of feature space
//! - **Temporal** flags sequences whose evolution is unusual even when every
//!   individual window looks plausible
//!
//! Any of them may be missing on a given tick: the temporal detector needs a
//! full history, model files may be absent, a detector may time out. The
//! ensemble renormalizes weights over whoever answered and records who did.
//!
//! ## Calibration Lifecycle
//!
//! 1. **Bootstrap**: fixed cuts (0.3 warning, 0.7 critical) from the first window
//! 2. **Feedback**: operators confirm or reject alerts; outcomes accumulate
//!    in a rolling 7-day window per asset
//! 3. **Handoff**: once enough labeled outcomes of both classes exist, cuts
//!    are recomputed by grid search after every confirmation
//! 4. **Drift**: when live features leave the training distribution the
//!    drift monitor raises an advisory event; detector calibration itself is
//!    never changed online
//!
//! ## Concurrency
//!
//! One [`AssetPipeline`](pipeline::AssetPipeline) per asset owns all mutable
//! state for that asset. Detector calls run on the tokio blocking pool against
//! a shared immutable input. The [`Fleet`](pipeline::Fleet) keeps one async
//! mutex per asset so assets never contend with each other.
//!
//! ## Usage Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rotorguard_ml::config::PipelineConfig;
//! use rotorguard_ml::pipeline::Fleet;
//! use rotorguard_ml::registry::DirectoryRegistry;
//!
//! # async fn run(window: rotorguard_core::window::Window) -> rotorguard_ml::MlResult<()> {
//! let registry = Arc::new(DirectoryRegistry::load("models/")?);
//! let fleet = Fleet::new(PipelineConfig::default(), registry)?;
//! fleet.register("pump-7")?;
//!
//! let result = fleet.process_window("pump-7", &window).await?;
//! println!("{} -> {:?}", result.alert_id, result.alert_level);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod detector;
pub mod drift;
pub mod ensemble;
pub mod isolation;
pub mod neural;
pub mod pipeline;
pub mod reconstruction;
pub mod registry;
pub mod rng;
pub mod rul;
pub mod temporal;
pub mod threshold;

use rotorguard_core::errors::{
    AvailabilityError, CalibrationError, ComputationError, InputError, StateCorruptionError,
};
use rotorguard_schemas::ArtifactError;

pub use detector::{Detector, DetectorScore, PercentileScaler, ScoringInput};
pub use ensemble::{AlertLevel, Cuts, EnsembleConfig, EnsembleResult, EnsembleScorer};
pub use pipeline::{AssetPipeline, BatchReport, Fleet, FleetHealth, PredictionSummary};
pub use threshold::{AdaptiveThreshold, Feedback, FeedbackOutcome};

/// Result type for ML operations
pub type MlResult<T> = core::result::Result<T, MlError>;

/// Errors raised by the scoring layer
#[derive(Debug, thiserror::Error)]
pub enum MlError {
    /// Pipeline error from the core taxonomy
    #[error(transparent)]
    Pipeline(#[from] rotorguard_core::Error),

    /// Model or state artifact could not be read or written
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    /// Sample source failed
    #[error("Stream error: {0}")]
    Stream(String),

    /// No pipeline registered for the asset
    #[error("Unknown asset: {0}")]
    UnknownAsset(String),

    /// A pipeline already exists for the asset
    #[error("Asset already registered: {0}")]
    AssetExists(String),

    /// Internal lock poisoned by a panicking writer
    #[error("Lock poisoned: {0}")]
    Poisoned(&'static str),
}

macro_rules! from_core {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl From<$ty> for MlError {
                fn from(err: $ty) -> Self {
                    MlError::Pipeline(err.into())
                }
            }
        )+
    };
}

from_core!(
    InputError,
    ComputationError,
    AvailabilityError,
    CalibrationError,
    StateCorruptionError,
);

impl MlError {
    /// True when processing may continue with the next window
    pub fn is_recoverable(&self) -> bool {
        match self {
            MlError::Pipeline(e) => e.is_recoverable(),
            _ => false,
        }
    }

    /// True when the asset pipeline must stop
    pub fn is_fatal(&self) -> bool {
        match self {
            MlError::Pipeline(e) => e.is_fatal(),
            MlError::Artifact(ArtifactError::Corrupt(_)) => true,
            _ => false,
        }
    }
}

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
