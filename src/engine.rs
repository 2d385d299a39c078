//! Engine facade
//!
//! [`BandEngine`] is what a host drives: samples arrive through the inbound
//! methods in any order, and the host closes each update cycle with
//! [`BandEngine::advance_cycle`] at whatever cadence it controls.

use chrono::Utc;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::band_set::BandSet;
use crate::config::EngineConfig;
use crate::error::ComputeError;
use crate::routing::{Route, SampleMessage};
use crate::statistic::BandStatistic;
use crate::types::{Accelerometer, Band, BandReading, EngineSnapshot, NormalizationFlag, Producer};
use crate::{PRODUCER_NAME, VERSION};

/// Persisted engine state
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EngineState {
    config: EngineConfig,
    bands: BandSet,
    headband_attached: bool,
    accelerometer: Option<Accelerometer>,
    cycle: u64,
}

/// Stateful normalization engine for one headband
pub struct BandEngine {
    config: EngineConfig,
    bands: BandSet,
    headband_attached: bool,
    accelerometer: Option<Accelerometer>,
    cycle: u64,
    /// Fallbacks applied by the last relative power pass
    power_flags: Vec<NormalizationFlag>,
    instance_id: String,
}

impl Default for BandEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl BandEngine {
    /// Create an engine with default settings
    pub fn new() -> Self {
        Self::from_valid_config(EngineConfig::default())
    }

    /// Create an engine with a specific configuration
    pub fn with_config(config: EngineConfig) -> Result<Self, ComputeError> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: EngineConfig) -> Self {
        Self {
            bands: BandSet::new(config.statistic, config.max_exponent),
            config,
            headband_attached: false,
            accelerometer: None,
            cycle: 0,
            power_flags: Vec::new(),
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    // ------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------

    /// Record one raw sample for a band and return its new score
    pub fn record(&mut self, band: Band, sample: f64) -> f64 {
        self.bands.get_mut(band).record(sample)
    }

    /// Record the mean of a per-sensor payload for a band
    pub fn on_sample(&mut self, band: Band, values: &[f64]) -> Result<f64, ComputeError> {
        if values.is_empty() {
            return Err(ComputeError::InvalidPayload(format!(
                "{} payload has no values",
                band
            )));
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(ComputeError::InvalidPayload(format!(
                "{} payload contains non-finite value {}",
                band, bad
            )));
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        if !mean.is_finite() {
            return Err(ComputeError::InvalidPayload(format!(
                "{} payload mean overflows",
                band
            )));
        }
        Ok(self.record(band, mean))
    }

    /// Store the headband contact flag; only `1` means attached
    pub fn set_headband_status(&mut self, status: i64) {
        self.headband_attached = status == 1;
    }

    pub fn set_accelerometer(&mut self, x: f64, y: f64, z: f64) {
        self.accelerometer = Some(Accelerometer { x, y, z });
    }

    /// Validate a routed message and apply it
    pub fn handle_message(&mut self, message: &SampleMessage) -> Result<Route, ComputeError> {
        let route = message.validate().map_err(|e| {
            warn!("dropping message {}: {}", message.address, e);
            e
        })?;

        match route {
            Route::AbsolutePower(band) => {
                self.on_sample(band, &message.args)?;
            }
            Route::HeadbandStatus => self.set_headband_status(message.args[0] as i64),
            Route::Accelerometer => {
                self.set_accelerometer(message.args[0], message.args[1], message.args[2])
            }
        }

        Ok(route)
    }

    // ------------------------------------------------------------------
    // Cycle boundary
    // ------------------------------------------------------------------

    /// Close the current cycle.
    ///
    /// Relative powers are recomputed only while the headband is attached,
    /// unless `gate_on_headband` is disabled. Returns whether the pass ran.
    pub fn advance_cycle(&mut self) -> bool {
        self.cycle += 1;

        if self.config.gate_on_headband && !self.headband_attached {
            return false;
        }

        self.power_flags = self.bands.recompute_relative_powers();
        true
    }

    // ------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------

    pub fn score(&self, band: Band) -> f64 {
        self.bands.get(band).score()
    }

    pub fn relative_power(&self, band: Band) -> f64 {
        self.bands.get(band).relative_power()
    }

    pub fn absolute_power(&self, band: Band) -> f64 {
        self.bands.get(band).current_absolute_power()
    }

    pub fn headband_attached(&self) -> bool {
        self.headband_attached
    }

    pub fn accelerometer(&self) -> Option<Accelerometer> {
        self.accelerometer
    }

    pub fn band(&self, band: Band) -> &BandStatistic {
        self.bands.get(band)
    }

    pub fn bands(&self) -> &BandSet {
        &self.bands
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Fallbacks currently in effect: degenerate scores plus the last power pass
    pub fn flags(&self) -> Vec<NormalizationFlag> {
        let mut flags: Vec<NormalizationFlag> = self
            .bands
            .iter()
            .filter(|(_, stat)| stat.is_degenerate())
            .map(|(band, _)| NormalizationFlag::DegenerateRange { band })
            .collect();
        flags.extend(self.power_flags.iter().copied());
        flags
    }

    /// Capture every band's outputs
    pub fn snapshot(&self, include_recent: bool) -> EngineSnapshot {
        let bands = self
            .bands
            .iter()
            .map(|(band, stat)| BandReading {
                band,
                absolute_power: stat.current_absolute_power(),
                relative_power: stat.relative_power(),
                score: stat.score(),
                samples_seen: stat.samples_seen(),
                history_len: stat.history().len(),
                recent: include_recent.then(|| stat.recent_window().iter().copied().collect()),
            })
            .collect();

        EngineSnapshot {
            producer: Producer {
                name: PRODUCER_NAME.to_string(),
                version: VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            computed_at_utc: Utc::now(),
            cycle: self.cycle,
            headband_attached: self.headband_attached,
            accelerometer: self.accelerometer,
            bands,
            flags: self.flags(),
        }
    }

    pub fn snapshot_json(&self, include_recent: bool) -> Result<String, ComputeError> {
        serde_json::to_string(&self.snapshot(include_recent))
            .map_err(|e| ComputeError::EncodingError(e.to_string()))
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    /// Save band histories, outputs and status to JSON
    pub fn save_state(&self) -> Result<String, ComputeError> {
        let state = EngineState {
            config: self.config,
            bands: self.bands.clone(),
            headband_attached: self.headband_attached,
            accelerometer: self.accelerometer,
            cycle: self.cycle,
        };
        serde_json::to_string(&state).map_err(|e| ComputeError::EncodingError(e.to_string()))
    }

    /// Replace the engine state with a previously saved one
    pub fn load_state(&mut self, json: &str) -> Result<(), ComputeError> {
        let state: EngineState =
            serde_json::from_str(json).map_err(|e| ComputeError::ParseError(e.to_string()))?;
        let EngineState {
            config,
            mut bands,
            headband_attached,
            accelerometer,
            cycle,
        } = state;
        config.validate()?;
        bands.restore(&config)?;

        info!(
            "loaded engine state at cycle {} ({} samples)",
            cycle,
            bands
                .iter()
                .map(|(_, stat)| stat.samples_seen())
                .sum::<u64>()
        );

        self.config = config;
        self.bands = bands;
        self.headband_attached = headband_attached;
        self.accelerometer = accelerometer;
        self.cycle = cycle;
        self.power_flags.clear();
        Ok(())
    }
}
