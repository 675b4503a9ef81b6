//! Signal front end for RotorGuard
//!
//! Turns raw accelerometer samples into standardized feature vectors that the
//! anomaly detectors in `rotorguard-ml` consume.
//!
//! ```text
//! samples ─► Windower ─► Window ─► FeatureExtractor ─► FeatureVector ─► Normalizer ─► z-scores
//! ```
//!
//! Every stage is a pure function of its input apart from the windower, which
//! keeps a bounded sample buffer when driven from a [`Stream`].
//!
//! ```no_run
//! use rotorguard_core::features::{FeatureConfig, FeatureExtractor};
//! use rotorguard_core::window::{RawSample, WindowConfig, Windower};
//!
//! let samples: Vec<RawSample> = (0..4096u64)
//!     .map(|i| RawSample::new(i * 50, (i as f64 * 0.1).sin()))
//!     .collect();
//! let extractor = FeatureExtractor::new(FeatureConfig::default()).unwrap();
//!
//! for window in Windower::new(&samples, WindowConfig::default()).unwrap().iter() {
//!     match window {
//!         Ok(w) => { let _ = extractor.extract(&w); }
//!         Err(_) => {} // trailing partial window
//!     }
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod buffer;
pub mod errors;
pub mod features;
pub mod normalize;
pub mod stream;
pub mod time;
pub mod traits;
pub mod window;

// Public API
pub use errors::{
    AvailabilityError, CalibrationError, ComputationError, Error, ErrorCategory, InputError,
    Result, StateCorruptionError,
};
pub use features::{Feature, FeatureConfig, FeatureExtractor, FeatureVector, FEATURE_COUNT};
pub use normalize::{NormalizationStats, NormalizedVector, Normalizer};
pub use traits::{Stream, Validate};
pub use window::{RawSample, Window, WindowConfig, Windower};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_exists() {
        assert!(!VERSION.is_empty());
    }
}
