//! Synthetic vibration captures
//!
//! A healthy rotor is a shaft fundamental with a few harmonics and sensor
//! noise. Imbalance inflates the fundamental, which moves every amplitude
//! feature at once.

use std::f64::consts::PI;

use rotorguard_core::window::{RawSample, Window};

/// Sample period at 20 kHz in microseconds
pub const SAMPLE_PERIOD_US: u64 = 50;

/// Deterministic xorshift generator for reproducible noise
pub struct TestRng {
    state: u64,
}

impl TestRng {
    pub fn new(seed: u64) -> Self {
        Self { state: seed.max(1) }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Uniform in [0, 1)
    pub fn uniform(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Standard normal via Box-Muller
    pub fn gaussian(&mut self) -> f64 {
        let u1 = self.uniform().max(1e-12);
        let u2 = self.uniform();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }
}

/// Rotor signal model producing consecutive, non-overlapping windows
pub struct RotorSignal {
    pub sample_rate: f64,
    pub shaft_hz: f64,
    pub noise_std: f64,
    rng: TestRng,
    position: usize,
    index: u64,
}

impl RotorSignal {
    pub fn new(seed: u64) -> Self {
        Self {
            sample_rate: 20_000.0,
            shaft_hz: 30.0,
            noise_std: 0.05,
            rng: TestRng::new(seed),
            position: 0,
            index: 0,
        }
    }

    /// `len` amplitudes with the fundamental scaled by `imbalance`
    pub fn amplitudes(&mut self, len: usize, imbalance: f64) -> Vec<f64> {
        let out = (0..len)
            .map(|i| {
                let t = (self.position + i) as f64 / self.sample_rate;
                let rotor: f64 = [(1.0, imbalance), (2.0, 0.5), (3.0, 0.3), (4.0, 0.2)]
                    .iter()
                    .map(|(h, a)| a * (2.0 * PI * self.shaft_hz * h * t).sin())
                    .sum();
                rotor + self.noise_std * self.rng.gaussian()
            })
            .collect();
        self.position += len;
        out
    }

    /// Next window of `len` samples
    pub fn window(&mut self, len: usize, imbalance: f64) -> Window {
        let start = self.position as u64 * SAMPLE_PERIOD_US;
        let samples = self.amplitudes(len, imbalance);
        let window = Window::new(self.index, start, len, samples);
        self.index += 1;
        window
    }

    /// Timestamped samples for batch and stream processing
    pub fn capture(&mut self, len: usize, imbalance: f64) -> Vec<RawSample> {
        let start = self.position as u64;
        self.amplitudes(len, imbalance)
            .into_iter()
            .enumerate()
            .map(|(i, a)| RawSample::new((start + i as u64) * SAMPLE_PERIOD_US, a))
            .collect()
    }
}
