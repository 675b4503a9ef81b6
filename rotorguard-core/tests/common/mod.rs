//! Shared fixtures for core integration tests

#![allow(dead_code)]

pub mod generators;

use rotorguard_core::window::RawSample;

/// Sample period at 20 kHz in microseconds
pub const SAMPLE_PERIOD_US: u64 = 50;

/// Attach evenly spaced timestamps to amplitudes
pub fn timestamped(amplitudes: &[f64], start: u64) -> Vec<RawSample> {
    amplitudes
        .iter()
        .enumerate()
        .map(|(i, &a)| RawSample::new(start + i as u64 * SAMPLE_PERIOD_US, a))
        .collect()
}

/// Relative difference, safe around zero
pub fn relative_diff(a: f64, b: f64) -> f64 {
    (a - b).abs() / a.abs().max(b.abs()).max(1e-12)
}
