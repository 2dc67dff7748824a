//! Per-ear measurement records and the audiogram table built from them.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{derive_gain_profile, AudiometricThresholds, DeriveParams, GainProfile, FREQS, FREQ_COUNT};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Ear {
    Left,
    Right,
}

impl fmt::Display for Ear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ear::Left => f.write_str("left"),
            Ear::Right => f.write_str("right"),
        }
    }
}

/// A single measurement row: optional identifying metadata plus the six
/// thresholds, serialized with flat `threshold_<hz>` columns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EarRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ear: Option<Ear>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_tested: Option<NaiveDate>,
    #[serde(flatten)]
    pub thresholds: AudiometricThresholds,
}

impl EarRecord {
    pub fn new(thresholds: AudiometricThresholds) -> Self {
        Self {
            participant_id: None,
            ear: None,
            date_tested: None,
            thresholds,
        }
    }

    pub fn derive(&self, params: &DeriveParams) -> GainProfile {
        derive_gain_profile(&self.thresholds, params)
    }

    /// "Audiogram: <participant> <ear> <date>", skipping absent parts.
    pub fn caption(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(pid) = self.participant_id.as_deref().filter(|p| !p.is_empty()) {
            parts.push(pid.to_string());
        }
        if let Some(ear) = self.ear {
            parts.push(ear.to_string());
        }
        if let Some(date) = self.date_tested {
            parts.push(date.format("%Y-%m-%d").to_string());
        }
        if parts.is_empty() {
            "Audiogram".to_string()
        } else {
            format!("Audiogram: {}", parts.join(" "))
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AudiogramPoint {
    pub freq_hz: u32,
    pub threshold: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Audiogram {
    pub caption: String,
    pub points: [AudiogramPoint; FREQ_COUNT],
}

/// Tabulate a record as (frequency, threshold) points for a chart renderer.
pub fn construct_audiogram(record: &EarRecord) -> Audiogram {
    let values = record.thresholds.values();
    Audiogram {
        caption: record.caption(),
        points: std::array::from_fn(|i| AudiogramPoint {
            freq_hz: FREQS[i],
            threshold: values[i],
        }),
    }
}
