//! bandscore - adaptive engagement scores for EEG headband band powers
//!
//! Raw per-band absolute power samples are turned into two comparable outputs:
//!
//! - a **score** in `[0, 1]` per band, placing each sample between the
//!   `cutoff` and `1 - cutoff` percentiles of that band's history, and
//! - a **relative power** per band, the band's share of the total after
//!   converting each log-domain power back to the linear domain.
//!
//! ## Modules
//!
//! - **statistic / band_set**: the normalization core
//! - **engine**: the stateful facade a host drives once per update cycle
//! - **routing**: mapping of demultiplexed message addresses onto the engine
//! - **replay**: frame-grouped replay of recorded message logs
//! - **ffi**: C bindings for embedding in a host application

pub mod band_set;
pub mod config;
pub mod engine;
pub mod error;
pub mod replay;
pub mod routing;
pub mod statistic;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use band_set::BandSet;
pub use config::{EngineConfig, HistoryMode, StatisticConfig};
pub use engine::BandEngine;
pub use error::ComputeError;
pub use replay::FrameReplayer;
pub use routing::{Route, SampleMessage};
pub use statistic::{percentile, BandStatistic};
pub use types::{Band, EngineSnapshot, NormalizationFlag};

/// Library version embedded in all snapshots
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for snapshots
pub const PRODUCER_NAME: &str = "bandscore";
