//! Wavelet-domain features
//!
//! A 4-level discrete wavelet transform with the Daubechies-4 (8-tap) filter
//! pair and symmetric (half-sample) boundary extension. Each level halves the
//! band: level 1 details hold the top half of the spectrum, level 4
//! approximation holds the bottom sixteenth.
//!
//! ```text
//! x ──┬── h_lo ↓2 ── a1 ──┬── h_lo ↓2 ── a2 ── … ── a4
//!     └── h_hi ↓2 ── d1   └── h_hi ↓2 ── d2        d3, d4
//! ```

use super::EPSILON;

/// Decomposition levels
pub const LEVELS: usize = 4;

/// Daubechies-4 decomposition low-pass filter
const DB4_DEC_LO: [f64; 8] = [
    -0.010597401784997278,
    0.032883011666982945,
    0.030841381835986965,
    -0.18703481171888114,
    -0.02798376941698385,
    0.6308807679295904,
    0.7148465705525415,
    0.23037781330885523,
];

/// Coefficients of one decomposition level
#[derive(Debug, Clone, PartialEq)]
pub struct DecompositionLevel {
    /// Approximation (low-pass) coefficients
    pub approx: Vec<f64>,
    /// Detail (high-pass) coefficients
    pub detail: Vec<f64>,
}

/// Daubechies-4 analysis filter bank
#[derive(Debug, Clone)]
pub struct Db4 {
    lo: [f64; 8],
    hi: [f64; 8],
}

impl Default for Db4 {
    fn default() -> Self {
        Self::new()
    }
}

impl Db4 {
    /// Build the quadrature mirror pair
    pub fn new() -> Self {
        let lo = DB4_DEC_LO;
        let mut hi = [0.0; 8];
        for (k, slot) in hi.iter_mut().enumerate() {
            let sign = if k % 2 == 0 { -1.0 } else { 1.0 };
            *slot = sign * lo[7 - k];
        }
        Self { lo, hi }
    }

    /// One analysis step: filter, then keep odd-phase samples
    ///
    /// Output length is `(n + 7) / 2`.
    pub fn step(&self, x: &[f64]) -> DecompositionLevel {
        let n = x.len();
        if n == 0 {
            return DecompositionLevel { approx: Vec::new(), detail: Vec::new() };
        }
        let taps = self.lo.len();
        let out_len = (n + taps - 1) / 2;
        let mut approx = Vec::with_capacity(out_len);
        let mut detail = Vec::with_capacity(out_len);

        for k in 0..out_len {
            let (mut a, mut d) = (0.0, 0.0);
            for j in 0..taps {
                let idx = 2 * k as isize + 1 - j as isize;
                let v = x[reflect(idx, n)];
                a += self.lo[j] * v;
                d += self.hi[j] * v;
            }
            approx.push(a);
            detail.push(d);
        }

        DecompositionLevel { approx, detail }
    }

    /// Multilevel decomposition, finest level first
    pub fn decompose(&self, x: &[f64], levels: usize) -> Vec<DecompositionLevel> {
        let mut out = Vec::with_capacity(levels);
        let mut current = x.to_vec();
        for _ in 0..levels {
            let level = self.step(&current);
            current = level.approx.clone();
            out.push(level);
        }
        out
    }
}

/// Symmetric (half-sample) extension of index `i` into `0..n`
fn reflect(mut i: isize, n: usize) -> usize {
    let n = n as isize;
    loop {
        if i < 0 {
            i = -i - 1;
        } else if i >= n {
            i = 2 * n - i - 1;
        } else {
            return i as usize;
        }
    }
}

fn energy(coeffs: &[f64]) -> f64 {
    coeffs.iter().map(|c| c * c).sum()
}

/// Shannon entropy (bits) of the normalized squared coefficients
fn entropy(coeffs: &[f64]) -> f64 {
    let total = energy(coeffs) + EPSILON;
    -coeffs
        .iter()
        .map(|c| c * c / total)
        .filter(|p| *p > 0.0)
        .map(|p| p * p.log2())
        .sum::<f64>()
}

fn variance(coeffs: &[f64]) -> f64 {
    if coeffs.is_empty() {
        return 0.0;
    }
    let n = coeffs.len() as f64;
    let mean = coeffs.iter().sum::<f64>() / n;
    coeffs.iter().map(|c| (c - mean) * (c - mean)).sum::<f64>() / n
}

/// Ten wavelet-domain features in layout order
///
/// detail energies 1..4, level-4 approximation energy, detail entropies 1..4,
/// variance of the level-4 approximation coefficients
pub(crate) fn wavelet_features(bank: &Db4, x: &[f64]) -> [f64; 10] {
    let levels = bank.decompose(x, LEVELS);
    let mut out = [0.0; 10];

    for (i, level) in levels.iter().enumerate() {
        out[i] = energy(&level.detail);
        out[5 + i] = entropy(&level.detail);
    }
    if let Some(deepest) = levels.last() {
        out[4] = energy(&deepest.approx);
        out[9] = variance(&deepest.approx);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn filters_are_orthonormal() {
        let bank = Db4::new();
        let lo_norm: f64 = bank.lo.iter().map(|c| c * c).sum();
        let hi_norm: f64 = bank.hi.iter().map(|c| c * c).sum();
        let cross: f64 = bank.lo.iter().zip(&bank.hi).map(|(a, b)| a * b).sum();
        assert!((lo_norm - 1.0).abs() < 1e-9);
        assert!((hi_norm - 1.0).abs() < 1e-9);
        assert!(cross.abs() < 1e-9);
        // Low-pass sums to sqrt(2), high-pass to zero
        assert!((bank.lo.iter().sum::<f64>() - 2f64.sqrt()).abs() < 1e-9);
        assert!(bank.hi.iter().sum::<f64>().abs() < 1e-9);
    }

    #[test]
    fn level_lengths() {
        let bank = Db4::new();
        let levels = bank.decompose(&vec![1.0; 1024], LEVELS);
        let lengths: Vec<usize> = levels.iter().map(|l| l.detail.len()).collect();
        assert_eq!(lengths, vec![515, 261, 134, 70]);
    }

    #[test]
    fn constant_signal_has_no_detail() {
        let bank = Db4::new();
        let f = wavelet_features(&bank, &vec![2.0; 1024]);
        for energy in &f[..4] {
            assert!(*energy < 1e-12);
        }
        assert!(f[4] > 0.0);
        assert!(f.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn energy_is_preserved_approximately() {
        // Orthogonal transform; the taper keeps boundary extension out of the budget
        let taper = crate::features::spectral::hann(1024);
        let x: Vec<f64> = (0..1024)
            .map(|i| (2.0 * PI * 37.0 * i as f64 / 1024.0).sin() * taper[i])
            .collect();
        let bank = Db4::new();
        let f = wavelet_features(&bank, &x);
        let total: f64 = f[..5].iter().sum();
        let input = energy(&x);
        assert!((total - input).abs() / input < 0.01);
    }

    #[test]
    fn high_frequency_lands_in_first_detail() {
        // Alternating signal sits at Nyquist
        let x: Vec<f64> = (0..1024).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let f = wavelet_features(&Db4::new(), &x);
        assert!(f[0] > 10.0 * (f[1] + f[2] + f[3] + f[4]));
    }

    #[test]
    fn entropy_of_single_spike_is_zero() {
        let mut coeffs = vec![0.0; 32];
        coeffs[5] = 3.0;
        assert!(entropy(&coeffs).abs() < 1e-9);

        let flat = vec![1.0; 32];
        assert!((entropy(&flat) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn reflection_indices() {
        assert_eq!(reflect(-1, 4), 0);
        assert_eq!(reflect(-3, 4), 2);
        assert_eq!(reflect(4, 4), 3);
        assert_eq!(reflect(6, 4), 1);
        assert_eq!(reflect(-9, 4), 0);
    }
}
