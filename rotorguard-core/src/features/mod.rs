//! Multi-domain feature extraction
//!
//! ## Overview
//!
//! Every window is summarized by 30 features, ten per domain:
//!
//! | Domain    | What it captures                                        |
//! |-----------|---------------------------------------------------------|
//! | Time      | Amplitude statistics, impulsiveness (bearing impacts)   |
//! | Frequency | Where energy sits in the spectrum (imbalance, mesh)     |
//! | Wavelet   | Energy and disorder per scale (transients, early wear)  |
//!
//! The layout is fixed, but consumers should address features through
//! [`Feature`] or [`Feature::name`] rather than by position: normalization
//! statistics and detector artifacts record feature names and are checked
//! against [`Feature::ALL`] when loaded.
//!
//! ## Numeric contract
//!
//! Extraction is a pure function of the window. A NaN or infinity anywhere in
//! the output fails the window with [`ComputationError::NonFiniteFeature`];
//! the caller drops that window and moves on.
//!
//! ```rust
//! use rotorguard_core::features::{Feature, FeatureExtractor, FeatureConfig};
//! use rotorguard_core::window::Window;
//!
//! let samples: Vec<f64> = (0..1024)
//!     .map(|i| (2.0 * std::f64::consts::PI * 50.0 * i as f64 / 20_000.0).sin())
//!     .collect();
//! let window = Window::new(0, 0, 512, samples);
//!
//! let extractor = FeatureExtractor::new(FeatureConfig::default()).unwrap();
//! let features = extractor.extract(&window).unwrap();
//! assert!((features.get(Feature::Rms) - 1.0 / 2f64.sqrt()).abs() < 0.01);
//! ```

mod spectral;
mod time;
mod wavelet;

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{ComputationError, InputError};
use crate::time::Timestamp;
use crate::window::Window;

pub use spectral::{Complex, Spectrum};
pub use wavelet::{Db4, DecompositionLevel};

/// Number of features per window
pub const FEATURE_COUNT: usize = 30;

/// Default acquisition rate in Hz
pub const DEFAULT_SAMPLE_RATE: f64 = 20_000.0;

/// Guard added to denominators
pub(crate) const EPSILON: f64 = 1e-12;

/// Feature domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureDomain {
    /// Statistics of the raw waveform
    Time,
    /// Statistics of the tapered power spectrum
    Frequency,
    /// Statistics of the multiresolution decomposition
    Wavelet,
}

macro_rules! features {
    ($($variant:ident => ($name:literal, $domain:ident)),+ $(,)?) => {
        /// Named position in a [`FeatureVector`]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Feature {
            $(
                #[doc = $name]
                $variant,
            )+
        }

        impl Feature {
            /// Every feature in vector order
            pub const ALL: [Feature; FEATURE_COUNT] = [$(Feature::$variant),+];

            /// Stable name used in artifacts and reports
            pub const fn name(self) -> &'static str {
                match self {
                    $(Feature::$variant => $name,)+
                }
            }

            /// Domain the feature belongs to
            pub const fn domain(self) -> FeatureDomain {
                match self {
                    $(Feature::$variant => FeatureDomain::$domain,)+
                }
            }
        }
    };
}

features! {
    Rms => ("rms", Time),
    Peak => ("peak", Time),
    CrestFactor => ("crest_factor", Time),
    Kurtosis => ("kurtosis", Time),
    Skewness => ("skewness", Time),
    StdDev => ("std_dev", Time),
    Energy => ("energy", Time),
    MeanAbsValue => ("mean_abs_value", Time),
    PeakToPeak => ("peak_to_peak", Time),
    ImpulseFactor => ("impulse_factor", Time),
    DominantFreq => ("dominant_freq", Frequency),
    SpectralCentroid => ("spectral_centroid", Frequency),
    SpectralRolloff85 => ("spectral_rolloff_85", Frequency),
    SpectralSpread => ("spectral_spread", Frequency),
    BandPower0To1k => ("band_power_0_1k", Frequency),
    BandPower1kTo2k => ("band_power_1_2k", Frequency),
    BandPower2kTo5k => ("band_power_2_5k", Frequency),
    BandPower5kTo10k => ("band_power_5_10k", Frequency),
    FreqVariance => ("freq_variance", Frequency),
    SpectralKurtosis => ("spectral_kurtosis", Frequency),
    WaveletDetailEnergy1 => ("wavelet_detail_energy_1", Wavelet),
    WaveletDetailEnergy2 => ("wavelet_detail_energy_2", Wavelet),
    WaveletDetailEnergy3 => ("wavelet_detail_energy_3", Wavelet),
    WaveletDetailEnergy4 => ("wavelet_detail_energy_4", Wavelet),
    WaveletApproxEnergy4 => ("wavelet_approx_energy_4", Wavelet),
    WaveletEntropy1 => ("wavelet_entropy_1", Wavelet),
    WaveletEntropy2 => ("wavelet_entropy_2", Wavelet),
    WaveletEntropy3 => ("wavelet_entropy_3", Wavelet),
    WaveletEntropy4 => ("wavelet_entropy_4", Wavelet),
    WaveletVariance => ("wavelet_variance", Wavelet),
}

impl Feature {
    /// Position in the vector layout
    pub fn index(self) -> usize {
        self as usize
    }

    /// Look a feature up by its stable name
    pub fn from_name(name: &str) -> Option<Feature> {
        Feature::ALL.iter().copied().find(|f| f.name() == name)
    }

    /// Feature names in vector order
    pub fn names() -> Vec<String> {
        Feature::ALL.iter().map(|f| f.name().to_string()).collect()
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 30 finite features computed from one window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    values: [f64; FEATURE_COUNT],
    window_index: u64,
    window_start: Timestamp,
}

impl FeatureVector {
    /// Build a vector, rejecting any non-finite value
    pub fn new(
        values: [f64; FEATURE_COUNT],
        window_index: u64,
        window_start: Timestamp,
    ) -> Result<Self, ComputationError> {
        if let Some(feature) = Feature::ALL.iter().find(|f| !values[f.index()].is_finite()) {
            return Err(ComputationError::NonFiniteFeature { feature: feature.name() });
        }
        Ok(Self { values, window_index, window_start })
    }

    /// Value of one feature
    pub fn get(&self, feature: Feature) -> f64 {
        self.values[feature.index()]
    }

    /// Value by stable name
    pub fn by_name(&self, name: &str) -> Option<f64> {
        Feature::from_name(name).map(|f| self.get(f))
    }

    /// Raw values in layout order
    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.values
    }

    /// Features of one domain, in layout order
    pub fn domain(&self, domain: FeatureDomain) -> impl Iterator<Item = (Feature, f64)> + '_ {
        Feature::ALL
            .iter()
            .copied()
            .filter(move |f| f.domain() == domain)
            .map(move |f| (f, self.get(f)))
    }

    /// Index of the source window
    pub fn window_index(&self) -> u64 {
        self.window_index
    }

    /// Start timestamp of the source window
    pub fn window_start(&self) -> Timestamp {
        self.window_start
    }
}

/// Frequency band `[low, high)` in Hz
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    /// Inclusive lower edge
    pub low: f64,
    /// Exclusive upper edge
    pub high: f64,
}

impl Band {
    /// Create a band
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// True when `freq` falls inside the band
    pub fn contains(&self, freq: f64) -> bool {
        freq >= self.low && freq < self.high
    }
}

/// Feature extraction parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Acquisition rate in Hz
    pub sample_rate: f64,

    /// Band edges for the four band-power features
    pub bands: [Band; 4],

    /// Value reported for crest factor when RMS is near zero, and its upper cap
    pub crest_factor_ceiling: f64,

    /// Value reported for impulse factor when MAV is near zero, and its upper cap
    pub impulse_factor_ceiling: f64,

    /// Cumulative energy fraction defining spectral rolloff
    pub rolloff_fraction: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            bands: [
                Band::new(0.0, 1_000.0),
                Band::new(1_000.0, 2_000.0),
                Band::new(2_000.0, 5_000.0),
                Band::new(5_000.0, 10_000.0),
            ],
            crest_factor_ceiling: 100.0,
            impulse_factor_ceiling: 100.0,
            rolloff_fraction: 0.85,
        }
    }
}

impl FeatureConfig {
    /// Check parameters
    pub fn validate(&self) -> Result<(), InputError> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(InputError::InvalidConfig(format!(
                "sample_rate must be positive, got {}",
                self.sample_rate
            )));
        }
        for band in &self.bands {
            if !(band.low >= 0.0 && band.high > band.low) {
                return Err(InputError::InvalidConfig(format!(
                    "band [{}, {}) is empty or negative",
                    band.low, band.high
                )));
            }
        }
        if self.crest_factor_ceiling <= 0.0 || self.impulse_factor_ceiling <= 0.0 {
            return Err(InputError::InvalidConfig("factor ceilings must be positive".into()));
        }
        if !(self.rolloff_fraction > 0.0 && self.rolloff_fraction <= 1.0) {
            return Err(InputError::InvalidConfig(format!(
                "rolloff_fraction must be in (0, 1], got {}",
                self.rolloff_fraction
            )));
        }
        Ok(())
    }
}

/// Window to [`FeatureVector`] transform
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    config: FeatureConfig,
    wavelet: Db4,
}

impl FeatureExtractor {
    /// Create an extractor after validating `config`
    pub fn new(config: FeatureConfig) -> Result<Self, InputError> {
        config.validate()?;
        Ok(Self { config, wavelet: Db4::new() })
    }

    /// Parameters in use
    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Compute all 30 features of `window`
    pub fn extract(&self, window: &Window) -> Result<FeatureVector, ComputationError> {
        let samples = window.samples();
        let mut values = [0.0; FEATURE_COUNT];

        let time = time::time_features(samples, &self.config);
        values[..10].copy_from_slice(&time);

        let spectrum = Spectrum::of(samples, self.config.sample_rate);
        let freq = spectral::spectral_features(&spectrum, &self.config);
        values[10..20].copy_from_slice(&freq);

        let wave = wavelet::wavelet_features(&self.wavelet, samples);
        values[20..].copy_from_slice(&wave);

        FeatureVector::new(values, window.index(), window.start())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_names() {
        assert_eq!(Feature::ALL.len(), FEATURE_COUNT);
        for (i, feature) in Feature::ALL.iter().enumerate() {
            assert_eq!(feature.index(), i);
            assert_eq!(Feature::from_name(feature.name()), Some(*feature));
        }
        assert_eq!(Feature::BandPower5kTo10k.name(), "band_power_5_10k");
        assert_eq!(Feature::WaveletVariance.domain(), FeatureDomain::Wavelet);
    }

    #[test]
    fn ten_features_per_domain() {
        for domain in [FeatureDomain::Time, FeatureDomain::Frequency, FeatureDomain::Wavelet] {
            let count = Feature::ALL.iter().filter(|f| f.domain() == domain).count();
            assert_eq!(count, 10);
        }
    }

    #[test]
    fn non_finite_vector_rejected() {
        let mut values = [0.0; FEATURE_COUNT];
        values[Feature::Kurtosis.index()] = f64::NAN;
        assert_eq!(
            FeatureVector::new(values, 0, 0),
            Err(ComputationError::NonFiniteFeature { feature: "kurtosis" })
        );
    }

    #[test]
    fn nan_sample_fails_only_that_window() {
        let extractor = FeatureExtractor::new(FeatureConfig::default()).unwrap();
        let mut samples = vec![0.5; 64];
        samples[10] = f64::NAN;
        let bad = Window::new(0, 0, 32, samples);
        assert!(matches!(
            extractor.extract(&bad),
            Err(ComputationError::NonFiniteFeature { .. })
        ));

        let good = Window::new(1, 0, 32, vec![0.5; 64]);
        assert!(extractor.extract(&good).is_ok());
    }

    #[test]
    fn lookup_by_name() {
        let mut values = [0.0; FEATURE_COUNT];
        values[Feature::SpectralCentroid.index()] = 123.0;
        let vector = FeatureVector::new(values, 4, 99).unwrap();
        assert_eq!(vector.by_name("spectral_centroid"), Some(123.0));
        assert_eq!(vector.by_name("unknown"), None);
        assert_eq!(vector.window_index(), 4);
        assert_eq!(vector.domain(FeatureDomain::Frequency).count(), 10);
    }

    #[test]
    fn config_validation() {
        let mut config = FeatureConfig::default();
        assert!(config.validate().is_ok());
        config.bands[2] = Band::new(5_000.0, 2_000.0);
        assert!(config.validate().is_err());
    }
}
