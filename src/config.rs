//! Engine configuration
//!
//! Every field has a default matching the headband integration, so an empty
//! JSON object is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::error::ComputeError;

/// Default percentile history capacity per band
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Default sliding window capacity per band
pub const DEFAULT_WINDOW_CAPACITY: usize = 100;

/// Default percentile cutoff
pub const DEFAULT_CUTOFF: f64 = 0.2;

/// Score reported when the percentile range collapses
pub const DEFAULT_DEGENERATE_SCORE: f64 = 0.5;

/// Largest exponent passed to `10^x` in the relative power pass
pub const DEFAULT_MAX_EXPONENT: f64 = 300.0;

/// Upper bound for `max_exponent`; five terms of `10^307` still sum to a finite f64
const MAX_EXPONENT_LIMIT: f64 = 307.0;

/// How the percentile history behaves once it reaches capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryMode {
    /// Keep the first `history_capacity` samples forever
    #[default]
    Frozen,
    /// Evict the oldest sample to make room for each new one
    Rolling,
}

/// Per-band normalization settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticConfig {
    pub history_capacity: usize,
    pub window_capacity: usize,
    pub cutoff: f64,
    pub history_mode: HistoryMode,
    pub degenerate_score: f64,
}

impl Default for StatisticConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            cutoff: DEFAULT_CUTOFF,
            history_mode: HistoryMode::Frozen,
            degenerate_score: DEFAULT_DEGENERATE_SCORE,
        }
    }
}

impl StatisticConfig {
    pub fn validate(&self) -> Result<(), ComputeError> {
        if self.history_capacity == 0 {
            return Err(ComputeError::InvalidConfig(
                "history_capacity must be at least 1".to_string(),
            ));
        }
        if self.window_capacity == 0 {
            return Err(ComputeError::InvalidConfig(
                "window_capacity must be at least 1".to_string(),
            ));
        }
        if !(self.cutoff >= 0.0 && self.cutoff < 0.5) {
            return Err(ComputeError::InvalidConfig(format!(
                "cutoff must be in [0, 0.5), got {}",
                self.cutoff
            )));
        }
        if !(0.0..=1.0).contains(&self.degenerate_score) {
            return Err(ComputeError::InvalidConfig(format!(
                "degenerate_score must be in [0, 1], got {}",
                self.degenerate_score
            )));
        }
        Ok(())
    }
}

/// Engine-wide settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub statistic: StatisticConfig,
    pub max_exponent: f64,
    /// Only recompute relative powers while the headband reports contact
    pub gate_on_headband: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            statistic: StatisticConfig::default(),
            max_exponent: DEFAULT_MAX_EXPONENT,
            gate_on_headband: true,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ComputeError> {
        self.statistic.validate()?;
        if !(self.max_exponent > 0.0 && self.max_exponent <= MAX_EXPONENT_LIMIT) {
            return Err(ComputeError::InvalidConfig(format!(
                "max_exponent must be in (0, {}], got {}",
                MAX_EXPONENT_LIMIT, self.max_exponent
            )));
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ComputeError> {
        serde_json::to_string_pretty(self).map_err(|e| ComputeError::EncodingError(e.to_string()))
    }
}
