//! Message addresses and replay records
//!
//! The transport layer hands the engine messages that are already
//! demultiplexed into an address and a list of float arguments. This module
//! maps those addresses onto engine inputs and checks argument arity.

use serde::{Deserialize, Serialize};

use crate::error::ComputeError;
use crate::types::Band;

const ELEMENTS_PREFIX: &str = "/muse/elements/";
const ABSOLUTE_SUFFIX: &str = "_absolute";
const HEADBAND_ADDRESS: &str = "/muse/elements/touching_forehead";
const ACCELEROMETER_ADDRESS: &str = "/muse/acc";

/// Engine input a message address resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    AbsolutePower(Band),
    HeadbandStatus,
    Accelerometer,
}

impl Route {
    pub fn from_address(address: &str) -> Result<Route, ComputeError> {
        match address {
            HEADBAND_ADDRESS => return Ok(Route::HeadbandStatus),
            ACCELEROMETER_ADDRESS => return Ok(Route::Accelerometer),
            _ => {}
        }

        address
            .strip_prefix(ELEMENTS_PREFIX)
            .and_then(|rest| rest.strip_suffix(ABSOLUTE_SUFFIX))
            .and_then(|name| name.parse::<Band>().ok())
            .map(Route::AbsolutePower)
            .ok_or_else(|| ComputeError::UnknownAddress(address.to_string()))
    }

    /// Canonical address for this route
    pub fn address(&self) -> String {
        match self {
            Route::AbsolutePower(band) => {
                format!("{}{}{}", ELEMENTS_PREFIX, band.as_str(), ABSOLUTE_SUFFIX)
            }
            Route::HeadbandStatus => HEADBAND_ADDRESS.to_string(),
            Route::Accelerometer => ACCELEROMETER_ADDRESS.to_string(),
        }
    }
}

/// A demultiplexed message as recorded in a replay log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleMessage {
    pub address: String,
    #[serde(default)]
    pub args: Vec<f64>,
    /// Host frame the message arrived in; a change of frame closes a cycle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<u64>,
}

impl SampleMessage {
    pub fn new(route: Route, args: Vec<f64>) -> Self {
        Self {
            address: route.address(),
            args,
            frame: None,
        }
    }

    pub fn with_frame(mut self, frame: u64) -> Self {
        self.frame = Some(frame);
        self
    }

    /// Resolve the address and check the arguments fit the route
    pub fn validate(&self) -> Result<Route, ComputeError> {
        let route = Route::from_address(&self.address)?;

        if let Some(bad) = self.args.iter().find(|v| !v.is_finite()) {
            return Err(ComputeError::InvalidPayload(format!(
                "{}: non-finite argument {}",
                self.address, bad
            )));
        }

        match route {
            Route::AbsolutePower(_) if self.args.is_empty() => {
                Err(ComputeError::InvalidPayload(format!(
                    "{}: expected at least 1 argument",
                    self.address
                )))
            }
            Route::HeadbandStatus if self.args.len() != 1 => {
                Err(ComputeError::InvalidPayload(format!(
                    "{}: expected 1 argument, got {}",
                    self.address,
                    self.args.len()
                )))
            }
            Route::HeadbandStatus if self.args[0] != 0.0 && self.args[0] != 1.0 => {
                Err(ComputeError::InvalidPayload(format!(
                    "{}: status must be 0 or 1, got {}",
                    self.address, self.args[0]
                )))
            }
            Route::Accelerometer if self.args.len() != 3 => {
                Err(ComputeError::InvalidPayload(format!(
                    "{}: expected 3 arguments, got {}",
                    self.address,
                    self.args.len()
                )))
            }
            _ => Ok(route),
        }
    }
}

/// Result of validating one message in a batch
#[derive(Debug)]
pub struct MessageValidation {
    pub index: usize,
    pub address: String,
    pub error: ComputeError,
}

/// Parse newline-delimited JSON messages, skipping blank lines
pub fn parse_ndjson(input: &str) -> Result<Vec<SampleMessage>, ComputeError> {
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str(line).map_err(ComputeError::from))
        .collect()
}

/// Parse a JSON array of messages
pub fn parse_array(input: &str) -> Result<Vec<SampleMessage>, ComputeError> {
    Ok(serde_json::from_str(input)?)
}

/// Validate a batch, returning only the failures
pub fn validate_messages(messages: &[SampleMessage]) -> Vec<MessageValidation> {
    messages
        .iter()
        .enumerate()
        .filter_map(|(index, message)| {
            message.validate().err().map(|error| MessageValidation {
                index,
                address: message.address.clone(),
                error,
            })
        })
        .collect()
}
