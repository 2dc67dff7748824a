//! Hearing-aid gain profile derivation from a six-point pure-tone audiogram.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod audiogram;
pub mod methods;

pub use audiogram::{construct_audiogram, Audiogram, AudiogramPoint, Ear, EarRecord};
pub use methods::{list_methods, MethodInfo, MethodKind, ReferenceMethod, SmoothingMethod};

pub const FREQ_COUNT: usize = 6;

/// Audiometric test frequencies in Hz, ascending. Every six-element array in
/// this crate is indexed in this order.
pub const FREQS: [u32; FREQ_COUNT] = [250, 500, 1000, 2000, 4000, 8000];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GainError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("missing threshold for {0} Hz")]
    MissingThreshold(u32),
}

/// Column label used for a frequency in flat measurement rows.
pub fn threshold_column(freq_hz: u32) -> String {
    format!("threshold_{freq_hz}")
}

/// One ear's pure-tone thresholds in dB HL.
///
/// Values are not range checked; negative thresholds are legitimate.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "ThresholdColumns", into = "ThresholdColumns")]
pub struct AudiometricThresholds([f64; FREQ_COUNT]);

impl AudiometricThresholds {
    pub fn new(values: [f64; FREQ_COUNT]) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[f64; FREQ_COUNT] {
        &self.0
    }

    pub fn get(&self, freq_hz: u32) -> Option<f64> {
        FREQS
            .iter()
            .position(|&f| f == freq_hz)
            .map(|idx| self.0[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        FREQS.iter().copied().zip(self.0.iter().copied())
    }

    /// Build from any keyed source using the `threshold_<hz>` column labels.
    pub fn from_lookup<F>(mut lookup: F) -> Result<Self, GainError>
    where
        F: FnMut(&str) -> Option<f64>,
    {
        let mut values = [0.0; FREQ_COUNT];
        for (slot, &freq) in values.iter_mut().zip(FREQS.iter()) {
            *slot = lookup(&threshold_column(freq)).ok_or(GainError::MissingThreshold(freq))?;
        }
        Ok(Self(values))
    }
}

impl From<[f64; FREQ_COUNT]> for AudiometricThresholds {
    fn from(values: [f64; FREQ_COUNT]) -> Self {
        Self(values)
    }
}

impl TryFrom<&HashMap<String, f64>> for AudiometricThresholds {
    type Error = GainError;

    fn try_from(row: &HashMap<String, f64>) -> Result<Self, Self::Error> {
        Self::from_lookup(|key| row.get(key).copied())
    }
}

impl TryFrom<&BTreeMap<String, f64>> for AudiometricThresholds {
    type Error = GainError;

    fn try_from(row: &BTreeMap<String, f64>) -> Result<Self, Self::Error> {
        Self::from_lookup(|key| row.get(key).copied())
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
struct ThresholdColumns {
    threshold_250: f64,
    threshold_500: f64,
    threshold_1000: f64,
    threshold_2000: f64,
    threshold_4000: f64,
    threshold_8000: f64,
}

impl From<ThresholdColumns> for AudiometricThresholds {
    fn from(c: ThresholdColumns) -> Self {
        Self([
            c.threshold_250,
            c.threshold_500,
            c.threshold_1000,
            c.threshold_2000,
            c.threshold_4000,
            c.threshold_8000,
        ])
    }
}

impl From<AudiometricThresholds> for ThresholdColumns {
    fn from(t: AudiometricThresholds) -> Self {
        let [threshold_250, threshold_500, threshold_1000, threshold_2000, threshold_4000, threshold_8000] =
            t.0;
        Self {
            threshold_250,
            threshold_500,
            threshold_1000,
            threshold_2000,
            threshold_4000,
            threshold_8000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeriveParams {
    pub reference_method: ReferenceMethod,
    pub compression_ratio: f64,
    pub max_gain: f64,
    pub smoothing_method: SmoothingMethod,
}

impl Default for DeriveParams {
    fn default() -> Self {
        Self {
            reference_method: ReferenceMethod::Pta4,
            compression_ratio: 0.5,
            max_gain: 25.0,
            smoothing_method: SmoothingMethod::Ma3,
        }
    }
}

impl DeriveParams {
    /// SHA-256 of the canonical JSON form, stable across runs.
    pub fn params_hash_sha256(&self) -> Result<String, GainError> {
        let bytes =
            serde_json::to_vec(self).map_err(|e| GainError::InvalidArgument(e.to_string()))?;
        Ok(methods::sha256_hex(&bytes))
    }
}

/// One output row: the gain at a frequency plus the parameters that produced it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GainEntry {
    pub freq_hz: u32,
    pub gain: f64,
    pub reference_threshold: f64,
    pub compression_ratio: f64,
    pub max_gain: f64,
    pub reference_method: ReferenceMethod,
    pub smoothing: SmoothingMethod,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GainProfile {
    pub entries: [GainEntry; FREQ_COUNT],
    /// `None` when the parameters could not be serialized for hashing.
    pub params_hash: Option<String>,
}

impl GainProfile {
    pub fn gains(&self) -> [f64; FREQ_COUNT] {
        let mut out = [0.0; FREQ_COUNT];
        for (slot, entry) in out.iter_mut().zip(self.entries.iter()) {
            *slot = entry.gain;
        }
        out
    }

    pub fn reference_threshold(&self) -> f64 {
        self.entries[0].reference_threshold
    }

    pub fn iter(&self) -> impl Iterator<Item = &GainEntry> {
        self.entries.iter()
    }
}

/// Round to two decimals, halves away from zero.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Derive the gain profile for one ear.
///
/// The pipeline is reference selection, deficit, cap, smoothing, rounding.
/// Deficits are floored at zero and capped at `max_gain` after scaling by
/// `compression_ratio`; smoothing only averages values already in range, so
/// every gain stays within `[0, max_gain]` for non-negative parameters.
///
/// NaN thresholds are not skipped: a NaN anywhere the reference method looks
/// makes `tref` NaN, and a NaN threshold yields a NaN gain at its frequency
/// (and at its neighbours under `ma3`).
pub fn derive_gain_profile(thresholds: &AudiometricThresholds, params: &DeriveParams) -> GainProfile {
    let tref = params.reference_method.reference_threshold(thresholds.values());

    let mut raw = [0.0; FREQ_COUNT];
    for (gain, &threshold) in raw.iter_mut().zip(thresholds.values().iter()) {
        let deficit = nan_max(threshold - tref, 0.0);
        *gain = nan_min(params.compression_ratio * deficit, params.max_gain);
    }

    let smoothed = params.smoothing_method.apply(&raw);

    let entries = std::array::from_fn(|i| GainEntry {
        freq_hz: FREQS[i],
        gain: round2(smoothed[i]),
        reference_threshold: tref,
        compression_ratio: params.compression_ratio,
        max_gain: params.max_gain,
        reference_method: params.reference_method,
        smoothing: params.smoothing_method,
    });

    GainProfile {
        entries,
        params_hash: params.params_hash_sha256().ok(),
    }
}

// `f64::max`/`f64::min` return the non-NaN operand; these keep the NaN.
pub(crate) fn nan_max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.max(b)
    }
}

pub(crate) fn nan_min(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.min(b)
    }
}

/// String-selector entry point over a keyed measurement row.
pub fn derive_gain_profile_from_row(
    row: &HashMap<String, f64>,
    reference: &str,
    compression_ratio: f64,
    max_gain: f64,
    smoothing: &str,
) -> Result<GainProfile, GainError> {
    let thresholds = AudiometricThresholds::try_from(row)?;
    let params = DeriveParams {
        reference_method: reference.parse()?,
        compression_ratio,
        max_gain,
        smoothing_method: smoothing.parse()?,
    };
    Ok(derive_gain_profile(&thresholds, &params))
}
