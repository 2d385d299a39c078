//! Core types for the bandscore engine
//!
//! Band identifiers, pass-through sensor values, fallback flags and the
//! serializable snapshot emitted once per cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ComputeError;

/// Number of canonical EEG bands
pub const BAND_COUNT: usize = 5;

/// Canonical EEG frequency band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    Delta,
    Theta,
    Alpha,
    Beta,
    Gamma,
}

impl Band {
    /// All bands in declaration order
    pub const ALL: [Band; BAND_COUNT] = [
        Band::Delta,
        Band::Theta,
        Band::Alpha,
        Band::Beta,
        Band::Gamma,
    ];

    /// Position of the band in [`Band::ALL`]
    pub fn index(self) -> usize {
        match self {
            Band::Delta => 0,
            Band::Theta => 1,
            Band::Alpha => 2,
            Band::Beta => 3,
            Band::Gamma => 4,
        }
    }

    /// Band at a position in [`Band::ALL`]
    pub fn from_index(index: usize) -> Result<Band, ComputeError> {
        Band::ALL
            .get(index)
            .copied()
            .ok_or_else(|| ComputeError::UnknownBand(format!("index {}", index)))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Band::Delta => "delta",
            Band::Theta => "theta",
            Band::Alpha => "alpha",
            Band::Beta => "beta",
            Band::Gamma => "gamma",
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Band {
    type Err = ComputeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Band::ALL
            .iter()
            .copied()
            .find(|band| band.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ComputeError::UnknownBand(s.to_string()))
    }
}

/// Accelerometer vector, stored as received
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Accelerometer {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Fallback applied during normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalizationFlag {
    /// Percentile range collapsed; the configured fallback score was used
    DegenerateRange { band: Band },
    /// `10^x` was clamped at the configured maximum exponent
    PowerSaturated { band: Band },
    /// Total power was zero or non-finite; proportions were made uniform
    ZeroTotalPower,
}

/// Producer information embedded in every snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Producer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Per-band output row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandReading {
    pub band: Band,
    /// Last raw sample
    pub absolute_power: f64,
    /// Share of total power (0-1)
    pub relative_power: f64,
    /// Normalized score (0-1)
    pub score: f64,
    /// Samples recorded since the engine was created
    pub samples_seen: u64,
    /// Current size of the percentile history
    pub history_len: usize,
    /// Most recent samples in arrival order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recent: Option<Vec<f64>>,
}

/// State of all bands at a cycle boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub producer: Producer,
    pub computed_at_utc: DateTime<Utc>,
    pub cycle: u64,
    pub headband_attached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accelerometer: Option<Accelerometer>,
    pub bands: Vec<BandReading>,
    #[serde(default)]
    pub flags: Vec<NormalizationFlag>,
}

impl EngineSnapshot {
    /// Reading for a band, if present
    pub fn reading(&self, band: Band) -> Option<&BandReading> {
        self.bands.iter().find(|r| r.band == band)
    }
}
