use std::fmt;
use std::str::FromStr;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{nan_min, GainError, FREQ_COUNT};

/// How the reference threshold `tref` is picked from an audiogram.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ReferenceMethod {
    #[serde(rename = "min")]
    Min,
    #[serde(rename = "median_mid")]
    MedianMid,
    #[serde(rename = "pta4")]
    Pta4,
}

impl Default for ReferenceMethod {
    fn default() -> Self {
        ReferenceMethod::Pta4
    }
}

impl ReferenceMethod {
    pub const ALL: [ReferenceMethod; 3] = [
        ReferenceMethod::Min,
        ReferenceMethod::MedianMid,
        ReferenceMethod::Pta4,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            ReferenceMethod::Min => "min",
            ReferenceMethod::MedianMid => "median_mid",
            ReferenceMethod::Pta4 => "pta4",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ReferenceMethod::Min => "Best threshold",
            ReferenceMethod::MedianMid => "Mid-frequency median",
            ReferenceMethod::Pta4 => "Four-frequency pure-tone average",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ReferenceMethod::Min => "Minimum of all six thresholds (250-8000 Hz).",
            ReferenceMethod::MedianMid => "Median of the 500, 1000 and 2000 Hz thresholds.",
            ReferenceMethod::Pta4 => "Mean of the 500, 1000, 2000 and 4000 Hz thresholds.",
        }
    }

    /// Reference threshold for `thresholds` in ascending frequency order.
    pub fn reference_threshold(&self, thresholds: &[f64; FREQ_COUNT]) -> f64 {
        match self {
            ReferenceMethod::Min => thresholds.iter().copied().fold(f64::INFINITY, nan_min),
            ReferenceMethod::MedianMid => {
                let mut mid = [thresholds[1], thresholds[2], thresholds[3]];
                if mid.iter().any(|v| v.is_nan()) {
                    return f64::NAN;
                }
                mid.sort_by_key(|v| OrderedFloat(*v));
                mid[1]
            }
            ReferenceMethod::Pta4 => {
                (thresholds[1] + thresholds[2] + thresholds[3] + thresholds[4]) / 4.0
            }
        }
    }
}

impl FromStr for ReferenceMethod {
    type Err = GainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "min" => Ok(ReferenceMethod::Min),
            "median_mid" => Ok(ReferenceMethod::MedianMid),
            "pta4" => Ok(ReferenceMethod::Pta4),
            other => Err(GainError::InvalidArgument(format!(
                "reference must be one of: min, median_mid, pta4 (got '{other}')"
            ))),
        }
    }
}

impl fmt::Display for ReferenceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Post-cap smoothing applied across the six-point gain curve.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SmoothingMethod {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "ma3")]
    Ma3,
}

impl Default for SmoothingMethod {
    fn default() -> Self {
        SmoothingMethod::Ma3
    }
}

impl SmoothingMethod {
    pub const ALL: [SmoothingMethod; 2] = [SmoothingMethod::None, SmoothingMethod::Ma3];

    pub fn id(&self) -> &'static str {
        match self {
            SmoothingMethod::None => "none",
            SmoothingMethod::Ma3 => "ma3",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SmoothingMethod::None => "No smoothing",
            SmoothingMethod::Ma3 => "Three-point moving average",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SmoothingMethod::None => "Capped gains are passed through unchanged.",
            SmoothingMethod::Ma3 => {
                "Average of each gain with its neighbours; edges replicate themselves and still divide by 3."
            }
        }
    }

    pub fn apply(&self, gains: &[f64; FREQ_COUNT]) -> [f64; FREQ_COUNT] {
        match self {
            SmoothingMethod::None => *gains,
            SmoothingMethod::Ma3 => moving_average_3(gains),
        }
    }
}

impl FromStr for SmoothingMethod {
    type Err = GainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "none" => Ok(SmoothingMethod::None),
            "ma3" => Ok(SmoothingMethod::Ma3),
            other => Err(GainError::InvalidArgument(format!(
                "smoothing must be 'none' or 'ma3' (got '{other}')"
            ))),
        }
    }
}

impl fmt::Display for SmoothingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

// Missing neighbours at either end are replaced by the centre value; the
// window never shrinks to two.
fn moving_average_3(gains: &[f64; FREQ_COUNT]) -> [f64; FREQ_COUNT] {
    let mut out = [0.0; FREQ_COUNT];
    for i in 0..FREQ_COUNT {
        let mid = gains[i];
        let left = if i > 0 { gains[i - 1] } else { mid };
        let right = if i + 1 < FREQ_COUNT { gains[i + 1] } else { mid };
        out[i] = (left + mid + right) / 3.0;
    }
    out
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum MethodKind {
    #[serde(rename = "reference")]
    Reference,
    #[serde(rename = "smoothing")]
    Smoothing,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MethodInfo {
    pub kind: MethodKind,
    pub id: String,
    pub name: String,
    pub description: String,
    pub is_default: bool,
}

/// Catalogue of every selectable reference and smoothing method.
pub fn list_methods() -> Vec<MethodInfo> {
    let reference = ReferenceMethod::ALL.iter().map(|m| MethodInfo {
        kind: MethodKind::Reference,
        id: m.id().to_string(),
        name: m.name().to_string(),
        description: m.description().to_string(),
        is_default: *m == ReferenceMethod::default(),
    });
    let smoothing = SmoothingMethod::ALL.iter().map(|m| MethodInfo {
        kind: MethodKind::Smoothing,
        id: m.id().to_string(),
        name: m.name().to_string(),
        description: m.description().to_string(),
        is_default: *m == SmoothingMethod::default(),
    });
    reference.chain(smoothing).collect()
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: [f64; FREQ_COUNT] = [10.0, 15.0, 20.0, 30.0, 40.0, 45.0];

    #[test]
    fn pta4_is_mean_of_four_frequencies() {
        assert_eq!(ReferenceMethod::Pta4.reference_threshold(&SAMPLE), 26.25);
    }

    #[test]
    fn median_mid_ignores_outer_frequencies() {
        let thresholds = [-10.0, 60.0, 5.0, 35.0, 120.0, 0.0];
        assert_eq!(ReferenceMethod::MedianMid.reference_threshold(&thresholds), 35.0);
    }

    #[test]
    fn min_scans_all_six() {
        let thresholds = [30.0, 25.0, 20.0, 15.0, 10.0, -5.0];
        assert_eq!(ReferenceMethod::Min.reference_threshold(&thresholds), -5.0);
        assert_eq!(ReferenceMethod::Min.reference_threshold(&SAMPLE), 10.0);
    }

    #[test]
    fn nan_is_not_skipped_by_reference_methods() {
        let thresholds = [f64::NAN, 15.0, 20.0, 30.0, 40.0, 45.0];
        assert!(ReferenceMethod::Min.reference_threshold(&thresholds).is_nan());
        // 250 Hz is outside the mid and pta4 sets
        assert_eq!(ReferenceMethod::MedianMid.reference_threshold(&thresholds), 20.0);
        assert_eq!(ReferenceMethod::Pta4.reference_threshold(&thresholds), 26.25);

        let mid_nan = [10.0, 15.0, f64::NAN, 30.0, 40.0, 45.0];
        assert!(ReferenceMethod::MedianMid.reference_threshold(&mid_nan).is_nan());
        assert!(ReferenceMethod::Pta4.reference_threshold(&mid_nan).is_nan());
    }

    #[test]
    fn ma3_replicates_edges_instead_of_shrinking_window() {
        let gains = [3.0, 0.0, 0.0, 0.0, 0.0, 6.0];
        let smoothed = SmoothingMethod::Ma3.apply(&gains);
        // (3 + 3 + 0) / 3, not (3 + 0) / 2
        assert!((smoothed[0] - 2.0).abs() < 1e-12);
        assert!((smoothed[1] - 1.0).abs() < 1e-12);
        assert!((smoothed[4] - 2.0).abs() < 1e-12);
        // (0 + 6 + 6) / 3, not (0 + 6) / 2
        assert!((smoothed[5] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn none_passes_through() {
        let gains = [0.0, 1.0, 2.5, 7.0, 0.0, 25.0];
        assert_eq!(SmoothingMethod::None.apply(&gains), gains);
    }

    #[test]
    fn parse_rejects_unknown_selectors() {
        assert_eq!("median_mid".parse::<ReferenceMethod>().unwrap(), ReferenceMethod::MedianMid);
        assert_eq!(" ma3 ".parse::<SmoothingMethod>().unwrap(), SmoothingMethod::Ma3);
        assert!(matches!(
            "pta3".parse::<ReferenceMethod>(),
            Err(GainError::InvalidArgument(_))
        ));
        assert!(matches!(
            "MA3".parse::<SmoothingMethod>(),
            Err(GainError::InvalidArgument(_))
        ));
    }

    #[test]
    fn catalogue_marks_defaults() {
        let methods = list_methods();
        assert_eq!(methods.len(), 5);
        let defaults: Vec<&str> = methods
            .iter()
            .filter(|m| m.is_default)
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(defaults, vec!["pta4", "ma3"]);
    }

    #[test]
    fn serde_uses_wire_ids() {
        let json = serde_json::to_string(&ReferenceMethod::MedianMid).unwrap();
        assert_eq!(json, "\"median_mid\"");
        let parsed: SmoothingMethod = serde_json::from_str("\"none\"").unwrap();
        assert_eq!(parsed, SmoothingMethod::None);
    }

    #[test]
    fn sha256_hex_is_lowercase_64_chars() {
        let hex = sha256_hex(b"abc");
        assert_eq!(
            hex,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
