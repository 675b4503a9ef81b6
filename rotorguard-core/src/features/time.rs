//! Time-domain statistics

use super::{FeatureConfig, EPSILON};

/// Ten time-domain features in layout order
///
/// rms, peak, crest_factor, kurtosis, skewness, std_dev, energy,
/// mean_abs_value, peak_to_peak, impulse_factor
pub(crate) fn time_features(x: &[f64], config: &FeatureConfig) -> [f64; 10] {
    let n = x.len().max(1) as f64;

    let mean = x.iter().sum::<f64>() / n;
    let energy: f64 = x.iter().map(|v| v * v).sum();
    let rms = (energy / n).sqrt();
    let mav = x.iter().map(|v| v.abs()).sum::<f64>() / n;
    let peak = x.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));

    let (min, max) = x
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let peak_to_peak = if x.is_empty() { 0.0 } else { max - min };

    // Central moments
    let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
    for v in x {
        let d = v - mean;
        let d2 = d * d;
        m2 += d2;
        m3 += d2 * d;
        m4 += d2 * d2;
    }
    m2 /= n;
    m3 /= n;
    m4 /= n;

    let std_dev = m2.sqrt();
    let kurtosis = m4 / (m2 * m2 + EPSILON) - 3.0;
    let skewness = m3 / (m2.powf(1.5) + EPSILON);

    let crest_factor = bounded_ratio(peak, rms, config.crest_factor_ceiling);
    let impulse_factor = bounded_ratio(peak, mav, config.impulse_factor_ceiling);

    [
        rms,
        peak,
        crest_factor,
        kurtosis,
        skewness,
        std_dev,
        energy,
        mav,
        peak_to_peak,
        impulse_factor,
    ]
}

/// `numerator / denominator` capped at `ceiling`, and equal to it when the
/// denominator vanishes
fn bounded_ratio(numerator: f64, denominator: f64, ceiling: f64) -> f64 {
    if denominator.is_nan() || numerator.is_nan() {
        return f64::NAN;
    }
    if denominator < 1e-9 {
        return ceiling;
    }
    (numerator / denominator).min(ceiling)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sine(amplitude: f64, freq: f64, rate: f64, len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| amplitude * (2.0 * PI * freq * i as f64 / rate).sin())
            .collect()
    }

    #[test]
    fn sinusoid_rms_and_peak() {
        let config = FeatureConfig::default();
        for amplitude in [0.5, 1.0, 3.0] {
            // 100 Hz at 20 kHz: 1000 samples hold exactly five periods
            let x = sine(amplitude, 100.0, 20_000.0, 1000);
            let f = time_features(&x, &config);
            assert!((f[0] - amplitude / 2f64.sqrt()).abs() < 1e-9 * amplitude.max(1.0));
            assert!((f[1] - amplitude).abs() < 1e-6 * amplitude);
            assert!((f[2] - 2f64.sqrt()).abs() < 1e-6);
            // Fisher kurtosis of a sine is -1.5
            assert!((f[3] + 1.5).abs() < 1e-6);
            assert!(f[4].abs() < 1e-9);
            assert!((f[8] - 2.0 * amplitude).abs() < 1e-6 * amplitude);
        }
    }

    #[test]
    fn silent_window_uses_ceilings() {
        let config = FeatureConfig::default();
        let f = time_features(&vec![0.0; 256], &config);
        assert_eq!(f[0], 0.0);
        assert_eq!(f[2], config.crest_factor_ceiling);
        assert_eq!(f[9], config.impulse_factor_ceiling);
        assert!(f.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn impulse_raises_kurtosis_and_crest() {
        let config = FeatureConfig::default();
        let mut x = sine(1.0, 100.0, 20_000.0, 1000);
        let baseline = time_features(&x, &config);
        x[500] = 20.0;
        let impulsive = time_features(&x, &config);
        assert!(impulsive[3] > baseline[3] + 10.0);
        assert!(impulsive[2] > baseline[2]);
        assert!(impulsive[9] > baseline[9]);
    }

    #[test]
    fn crest_factor_is_capped() {
        let config = FeatureConfig { crest_factor_ceiling: 5.0, ..FeatureConfig::default() };
        let mut x = vec![0.0; 1000];
        x[0] = 1.0;
        let f = time_features(&x, &config);
        assert_eq!(f[2], 5.0);
    }
}
