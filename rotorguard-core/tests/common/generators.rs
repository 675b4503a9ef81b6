//! Synthetic vibration signals
//!
//! A healthy rotor is modelled as a shaft fundamental plus a few harmonics and
//! broadband sensor noise. Faults add what they add on real machines:
//! bearing defects ring a structural resonance at the defect rate, imbalance
//! inflates the fundamental.

use std::f64::consts::PI;

/// Deterministic xorshift generator for reproducible noise
pub struct TestRng {
    state: u64,
}

impl TestRng {
    pub fn new(seed: u64) -> Self {
        Self { state: seed.max(1) }
    }

    pub fn next_u64(&mut self) -> u64 {
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

/// Machine signal model
pub struct VibrationGenerator {
    pub sample_rate: f64,
    pub shaft_hz: f64,
    pub noise_std: f64,
    rng: TestRng,
    position: usize,
}

impl VibrationGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            sample_rate: 20_000.0,
            shaft_hz: 30.0,
            noise_std: 0.05,
            rng: TestRng::new(seed),
            position: 0,
        }
    }

    fn t(&self, i: usize) -> f64 {
        (self.position + i) as f64 / self.sample_rate
    }

    /// Shaft fundamental with decaying harmonics and noise
    pub fn healthy(&mut self, len: usize) -> Vec<f64> {
        let out = (0..len)
            .map(|i| {
                let t = self.t(i);
                let rotor: f64 = [(1.0, 1.0), (2.0, 0.5), (3.0, 0.3), (4.0, 0.2)]
                    .iter()
                    .map(|(h, a)| a * (2.0 * PI * self.shaft_hz * h * t).sin())
                    .sum();
                rotor + self.noise_std * self.rng.gaussian()
            })
            .collect();
        self.position += len;
        out
    }

    /// Healthy signal plus impacts at `defect_hz` ringing a 3 kHz resonance
    pub fn bearing_fault(&mut self, len: usize, defect_hz: f64, severity: f64) -> Vec<f64> {
        let start = self.position;
        let mut out = self.healthy(len);
        let period = self.sample_rate / defect_hz;
        for (i, v) in out.iter_mut().enumerate() {
            let since_impact = ((start + i) as f64 % period) / self.sample_rate;
            *v += severity * (-since_impact * 800.0).exp() * (2.0 * PI * 3_000.0 * since_impact).sin();
        }
        out
    }

    /// Healthy signal with the fundamental scaled by `factor`
    pub fn imbalance(&mut self, len: usize, factor: f64) -> Vec<f64> {
        let start = self.position;
        let mut out = self.healthy(len);
        for (i, v) in out.iter_mut().enumerate() {
            let t = (start + i) as f64 / self.sample_rate;
            *v += (factor - 1.0) * (2.0 * PI * self.shaft_hz * t).sin();
        }
        out
    }
}
