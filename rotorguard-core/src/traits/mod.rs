//! Core traits shared across the workspace
//!
//! - [`Stream`]: pull-based sample source
//! - [`Validate`]: invariant check run on configuration and on state loaded from disk

mod stream;

pub use stream::Stream;

use crate::errors::StateCorruptionError;

/// Values that carry invariants which must hold before use
///
/// Implemented by every persisted payload (normalization stats, threshold and
/// drift state, model weights). Loaders call `validate` after decoding and
/// refuse the artifact when it fails.
pub trait Validate {
    /// Check every invariant, reporting the first violation
    fn validate(&self) -> Result<(), StateCorruptionError>;
}

/// Trait for values that can be checked for numeric validity
pub trait Finite {
    /// True when no component is NaN or infinite
    fn is_finite_value(&self) -> bool;
}

impl Finite for f64 {
    fn is_finite_value(&self) -> bool {
        self.is_finite()
    }
}

impl Finite for [f64] {
    fn is_finite_value(&self) -> bool {
        self.iter().all(|v| v.is_finite())
    }
}

impl Finite for Vec<f64> {
    fn is_finite_value(&self) -> bool {
        self.as_slice().is_finite_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finite_checks() {
        assert!(1.0f64.is_finite_value());
        assert!(!f64::NAN.is_finite_value());
        assert!(vec![0.0, 1.0].is_finite_value());
        assert!(!vec![0.0, f64::INFINITY].is_finite_value());
    }
}
