//! Frequency-domain features
//!
//! The window is Hann-tapered, zero-padded to the next power of two and
//! transformed with an iterative radix-2 FFT. Only the non-negative
//! frequency half (bins `0..=n/2`) is kept, as a power spectrum `|X|²`.
//! Tapering is applied here only; the time and wavelet domains see the raw
//! samples.

use std::f64::consts::PI;
use std::ops::{Add, Mul, Sub};

use super::{FeatureConfig, EPSILON};

/// Complex number for the FFT
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Complex {
    /// Real part
    pub re: f64,
    /// Imaginary part
    pub im: f64,
}

impl Complex {
    /// Create a complex number
    pub fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    /// Squared magnitude
    pub fn norm_sqr(self) -> f64 {
        self.re.mul_add(self.re, self.im * self.im)
    }
}

impl Add for Complex {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.re + rhs.re, self.im + rhs.im)
    }
}

impl Sub for Complex {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.re - rhs.re, self.im - rhs.im)
    }
}

impl Mul for Complex {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.re.mul_add(rhs.re, -(self.im * rhs.im)),
            self.re.mul_add(rhs.im, self.im * rhs.re),
        )
    }
}

/// In-place iterative radix-2 FFT; `data.len()` must be a power of two
fn fft_in_place(data: &mut [Complex]) {
    let n = data.len();
    if n <= 1 || !n.is_power_of_two() {
        return;
    }

    // Bit-reversal permutation
    let mut j = 0usize;
    for i in 0..n {
        if i < j {
            data.swap(i, j);
        }
        let mut m = n >> 1;
        while m >= 1 && j >= m {
            j -= m;
            m >>= 1;
        }
        j += m;
    }

    let mut len = 2;
    while len <= n {
        let half = len / 2;
        let angle = -2.0 * PI / len as f64;
        for start in (0..n).step_by(len) {
            for k in 0..half {
                let (sin, cos) = (angle * k as f64).sin_cos();
                let u = data[start + k];
                let v = data[start + k + half] * Complex::new(cos, sin);
                data[start + k] = u + v;
                data[start + k + half] = u - v;
            }
        }
        len <<= 1;
    }
}

/// Symmetric Hann taper
pub(crate) fn hann(n: usize) -> Vec<f64> {
    if n <= 1 {
        return vec![1.0; n];
    }
    let denom = (n - 1) as f64;
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / denom).cos()))
        .collect()
}

/// One-sided power spectrum of a tapered window
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    power: Vec<f64>,
    resolution: f64,
}

impl Spectrum {
    /// Taper, pad and transform `samples` acquired at `sample_rate` Hz
    pub fn of(samples: &[f64], sample_rate: f64) -> Self {
        if samples.is_empty() {
            return Self { power: Vec::new(), resolution: 0.0 };
        }

        let fft_n = samples.len().next_power_of_two();
        let taper = hann(samples.len());
        let mut data: Vec<Complex> = samples
            .iter()
            .zip(&taper)
            .map(|(x, w)| Complex::new(x * w, 0.0))
            .collect();
        data.resize(fft_n, Complex::default());
        fft_in_place(&mut data);

        Self {
            power: data[..=fft_n / 2].iter().map(|c| c.norm_sqr()).collect(),
            resolution: sample_rate / fft_n as f64,
        }
    }

    /// Power per bin, DC first
    pub fn power(&self) -> &[f64] {
        &self.power
    }

    /// Bin spacing in Hz
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Center frequency of `bin`
    pub fn frequency(&self, bin: usize) -> f64 {
        bin as f64 * self.resolution
    }

    /// `(frequency, power)` pairs
    pub fn bins(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.power
            .iter()
            .enumerate()
            .map(move |(k, &p)| (self.frequency(k), p))
    }

    /// Largest non-DC bin
    pub fn dominant_bin(&self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (k, &p) in self.power.iter().enumerate().skip(1) {
            match best {
                Some((_, bp)) if p <= bp => {}
                _ => best = Some((k, p)),
            }
        }
        best.map(|(k, _)| k)
    }
}

/// Ten frequency-domain features in layout order
///
/// dominant_freq, spectral_centroid, spectral_rolloff_85, spectral_spread,
/// four band powers, freq_variance, spectral_kurtosis
pub(crate) fn spectral_features(spectrum: &Spectrum, config: &FeatureConfig) -> [f64; 10] {
    let total: f64 = spectrum.power().iter().sum();
    if total.is_nan() {
        return [f64::NAN; 10];
    }

    let dominant = spectrum
        .dominant_bin()
        .map(|k| spectrum.frequency(k))
        .unwrap_or(0.0);

    let centroid = spectrum.bins().map(|(f, p)| f * p).sum::<f64>() / (total + EPSILON);

    let rolloff = {
        let target = config.rolloff_fraction * total;
        let mut cumulative = 0.0;
        let mut freq = 0.0;
        for (f, p) in spectrum.bins() {
            cumulative += p;
            freq = f;
            if cumulative >= target {
                break;
            }
        }
        if total > 0.0 {
            freq
        } else {
            0.0
        }
    };

    let (mut m2, mut m4) = (0.0, 0.0);
    for (f, p) in spectrum.bins() {
        let d2 = (f - centroid) * (f - centroid);
        m2 += d2 * p;
        m4 += d2 * d2 * p;
    }
    let variance = m2 / (total + EPSILON);
    let m4 = m4 / (total + EPSILON);
    let spread = variance.sqrt();
    let kurtosis = m4 / (variance * variance + EPSILON) - 3.0;

    let mut bands = [0.0; 4];
    for (band, slot) in config.bands.iter().zip(bands.iter_mut()) {
        *slot = spectrum
            .bins()
            .filter(|(f, _)| band.contains(*f))
            .map(|(_, p)| p)
            .sum();
    }

    [
        dominant, centroid, rolloff, spread, bands[0], bands[1], bands[2], bands[3], variance,
        kurtosis,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Band;

    fn tones(components: &[(f64, f64)], rate: f64, len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| {
                let t = i as f64 / rate;
                components
                    .iter()
                    .map(|(freq, amp)| amp * (2.0 * PI * freq * t).sin())
                    .sum()
            })
            .collect()
    }

    #[test]
    fn fft_of_impulse_is_flat() {
        let mut data = vec![Complex::default(); 8];
        data[0] = Complex::new(1.0, 0.0);
        fft_in_place(&mut data);
        for c in data {
            assert!((c.re - 1.0).abs() < 1e-12);
            assert!(c.im.abs() < 1e-12);
        }
    }

    #[test]
    fn fft_matches_naive_dft() {
        let x: Vec<f64> = (0..16).map(|i| ((i * 7) % 5) as f64 - 2.0).collect();
        let mut data: Vec<Complex> = x.iter().map(|&v| Complex::new(v, 0.0)).collect();
        fft_in_place(&mut data);

        for (k, c) in data.iter().enumerate() {
            let mut re = 0.0;
            let mut im = 0.0;
            for (n, v) in x.iter().enumerate() {
                let angle = -2.0 * PI * (k * n) as f64 / 16.0;
                re += v * angle.cos();
                im += v * angle.sin();
            }
            assert!((c.re - re).abs() < 1e-9);
            assert!((c.im - im).abs() < 1e-9);
        }
    }

    #[test]
    fn harmonics_with_spike_exact_bins() {
        // 1 Hz bins: fs = 1024 Hz over 1024 samples
        let x = tones(&[(30.0, 1.0), (60.0, 0.5), (90.0, 0.3), (120.0, 0.2)], 1024.0, 1024);
        let config = FeatureConfig {
            sample_rate: 1024.0,
            bands: [
                Band::new(0.0, 50.0),
                Band::new(50.0, 100.0),
                Band::new(100.0, 200.0),
                Band::new(200.0, 512.0),
            ],
            ..FeatureConfig::default()
        };
        let spectrum = Spectrum::of(&x, config.sample_rate);
        let f = spectral_features(&spectrum, &config);

        assert_eq!(spectrum.resolution(), 1.0);
        assert!((f[0] - 30.0).abs() <= spectrum.resolution());
        assert!(f[6] > 0.0, "band containing 120 Hz must carry power");
        assert!(f[6] > f[7] * 1e3);
    }

    #[test]
    fn harmonics_with_spike_default_rate() {
        let config = FeatureConfig::default();
        let x = tones(
            &[(30.0, 1.0), (60.0, 0.5), (90.0, 0.3), (120.0, 0.2)],
            config.sample_rate,
            1024,
        );
        let spectrum = Spectrum::of(&x, config.sample_rate);
        let f = spectral_features(&spectrum, &config);

        assert!((f[0] - 30.0).abs() <= spectrum.resolution());
        // 120 Hz falls in [0, 1 kHz)
        assert!(f[4] > 0.0);
    }

    #[test]
    fn single_tone_centroid_and_rolloff() {
        let x = tones(&[(100.0, 1.0)], 1024.0, 1024);
        let config = FeatureConfig { sample_rate: 1024.0, ..FeatureConfig::default() };
        let spectrum = Spectrum::of(&x, 1024.0);
        let f = spectral_features(&spectrum, &config);

        assert_eq!(f[0], 100.0);
        assert!((f[1] - 100.0).abs() < 0.5);
        assert!((f[2] - 100.0).abs() <= 1.0);
        assert!((f[3] * f[3] - f[8]).abs() < 1e-9);
        assert!(f[3] < 2.0);
    }

    #[test]
    fn dominant_ignores_dc() {
        // DC carries the most power but bin 0 is never dominant
        let x: Vec<f64> = tones(&[(200.0, 1.0)], 1024.0, 1024)
            .into_iter()
            .map(|v| v + 0.8)
            .collect();
        let spectrum = Spectrum::of(&x, 1024.0);
        assert_eq!(spectrum.dominant_bin(), Some(200));
    }

    #[test]
    fn non_power_of_two_is_padded() {
        let x = tones(&[(50.0, 1.0)], 1000.0, 1000);
        let spectrum = Spectrum::of(&x, 1000.0);
        assert_eq!(spectrum.power().len(), 513);
        assert!((spectrum.resolution() - 1000.0 / 1024.0).abs() < 1e-12);
        let dominant = spectrum.frequency(spectrum.dominant_bin().unwrap());
        assert!((dominant - 50.0).abs() <= spectrum.resolution());
    }
}
