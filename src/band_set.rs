//! The fixed collection of five band statistics
//!
//! Besides lookup, [`BandSet`] owns the cross-band relative power pass: each
//! absolute power is treated as a base-10 log quantity and converted to a
//! linear share of the total.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, StatisticConfig, DEFAULT_MAX_EXPONENT};
use crate::error::ComputeError;
use crate::statistic::BandStatistic;
use crate::types::{Band, NormalizationFlag, BAND_COUNT};

/// One [`BandStatistic`] per [`Band`], indexed by [`Band::index`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandSet {
    bands: [BandStatistic; BAND_COUNT],
    /// Owned by the engine config; reapplied by [`BandSet::restore`]
    #[serde(skip)]
    max_exponent: f64,
}

impl Default for BandSet {
    fn default() -> Self {
        Self::new(StatisticConfig::default(), DEFAULT_MAX_EXPONENT)
    }
}

impl BandSet {
    pub fn new(config: StatisticConfig, max_exponent: f64) -> Self {
        Self {
            bands: std::array::from_fn(|_| BandStatistic::new(config)),
            max_exponent,
        }
    }

    pub fn get(&self, band: Band) -> &BandStatistic {
        &self.bands[band.index()]
    }

    pub fn get_mut(&mut self, band: Band) -> &mut BandStatistic {
        &mut self.bands[band.index()]
    }

    /// Look up a band by name
    pub fn lookup(&self, name: &str) -> Result<&BandStatistic, ComputeError> {
        let band: Band = name.parse()?;
        Ok(self.get(band))
    }

    /// Look up a band by its position in [`Band::ALL`]
    pub fn lookup_index(&self, index: usize) -> Result<&BandStatistic, ComputeError> {
        let band = Band::from_index(index)?;
        Ok(self.get(band))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Band, &BandStatistic)> {
        Band::ALL.into_iter().zip(self.bands.iter())
    }

    pub fn max_exponent(&self) -> f64 {
        self.max_exponent
    }

    /// Attach the engine config to a deserialized set
    pub(crate) fn restore(&mut self, config: &EngineConfig) -> Result<(), ComputeError> {
        for (band, stat) in Band::ALL.into_iter().zip(self.bands.iter_mut()) {
            stat.restore(config.statistic)
                .map_err(|e| ComputeError::ParseError(format!("{}: {}", band, e)))?;
        }
        self.max_exponent = config.max_exponent;
        Ok(())
    }

    /// Recompute every band's share of total power from its latest absolute power.
    ///
    /// Reads whatever each band currently holds; bands that received no sample
    /// this cycle contribute their previous value. Exponents above
    /// `max_exponent` are clamped, and a zero or non-finite total yields
    /// uniform proportions. Returns the fallbacks that were applied.
    pub fn recompute_relative_powers(&mut self) -> Vec<NormalizationFlag> {
        let mut flags = Vec::new();
        let mut powers = [0.0_f64; BAND_COUNT];

        for (band, stat) in Band::ALL.into_iter().zip(self.bands.iter()) {
            let exponent = stat.current_absolute_power();
            powers[band.index()] = if exponent.is_nan() {
                0.0
            } else if exponent > self.max_exponent {
                warn!(
                    "{} absolute power {} saturated at 10^{}",
                    band, exponent, self.max_exponent
                );
                flags.push(NormalizationFlag::PowerSaturated { band });
                10f64.powf(self.max_exponent)
            } else {
                10f64.powf(exponent)
            };
        }

        let total: f64 = powers.iter().sum();

        if !(total > 0.0 && total.is_finite()) {
            warn!("total band power {} unusable, using uniform proportions", total);
            flags.push(NormalizationFlag::ZeroTotalPower);
            for stat in self.bands.iter_mut() {
                stat.set_relative_power(1.0 / BAND_COUNT as f64);
            }
            return flags;
        }

        for (stat, power) in self.bands.iter_mut().zip(powers.iter()) {
            stat.set_relative_power(power / total);
        }

        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record_all(set: &mut BandSet, values: [f64; BAND_COUNT]) {
        for (band, value) in Band::ALL.iter().zip(values) {
            set.get_mut(*band).record(value);
        }
    }

    fn relative_sum(set: &BandSet) -> f64 {
        set.iter().map(|(_, stat)| stat.relative_power()).sum()
    }

    #[test]
    fn test_equal_zero_powers_are_uniform() {
        let mut set = BandSet::default();
        record_all(&mut set, [0.0; BAND_COUNT]);

        let flags = set.recompute_relative_powers();
        assert!(flags.is_empty());
        for (_, stat) in set.iter() {
            assert_eq!(stat.relative_power(), 0.2);
        }
    }

    #[test]
    fn test_unrecorded_bands_count_as_zero() {
        let mut set = BandSet::default();
        set.recompute_relative_powers();
        for (_, stat) in set.iter() {
            assert_eq!(stat.relative_power(), 0.2);
        }
    }

    #[test]
    fn test_power_domain_proportion() {
        let mut set = BandSet::default();
        // 10, 1, 1, 1, 1 in the linear domain
        record_all(&mut set, [1.0, 0.0, 0.0, 0.0, 0.0]);
        set.recompute_relative_powers();

        assert!((set.get(Band::Delta).relative_power() - 10.0 / 14.0).abs() < 1e-12);
        assert!((set.get(Band::Gamma).relative_power() - 1.0 / 14.0).abs() < 1e-12);
    }

    #[test]
    fn test_relative_powers_sum_to_one() {
        let cases = [
            [0.5, -0.2, 1.3, 0.9, -1.1],
            [-3.0, -2.5, -4.0, -3.3, -2.9],
            [12.0, 11.5, 13.0, 10.0, 9.0],
            [0.0, 0.0, 0.0, 0.0, 250.0],
        ];
        for values in cases {
            let mut set = BandSet::default();
            record_all(&mut set, values);
            set.recompute_relative_powers();
            assert!(
                (relative_sum(&set) - 1.0).abs() < 1e-5,
                "sum {} for {:?}",
                relative_sum(&set),
                values
            );
        }
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let mut set = BandSet::default();
        record_all(&mut set, [0.4, 0.1, 0.9, 0.3, -0.2]);

        set.recompute_relative_powers();
        let first: Vec<f64> = set.iter().map(|(_, s)| s.relative_power()).collect();
        set.recompute_relative_powers();
        let second: Vec<f64> = set.iter().map(|(_, s)| s.relative_power()).collect();

        assert_eq!(first, second);
    }

    #[test]
    fn test_overflow_saturates() {
        let mut set = BandSet::default();
        record_all(&mut set, [1000.0, 0.0, 0.0, 0.0, 1000.0]);

        let flags = set.recompute_relative_powers();
        assert_eq!(
            flags,
            vec![
                NormalizationFlag::PowerSaturated { band: Band::Delta },
                NormalizationFlag::PowerSaturated { band: Band::Gamma },
            ]
        );
        for (_, stat) in set.iter() {
            assert!(stat.relative_power().is_finite());
        }
        assert!((set.get(Band::Delta).relative_power() - 0.5).abs() < 1e-9);
        assert!((relative_sum(&set) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_underflow_falls_back_to_uniform() {
        let mut set = BandSet::default();
        record_all(&mut set, [f64::NEG_INFINITY; BAND_COUNT]);

        let flags = set.recompute_relative_powers();
        assert_eq!(flags, vec![NormalizationFlag::ZeroTotalPower]);
        for (_, stat) in set.iter() {
            assert_eq!(stat.relative_power(), 0.2);
        }
    }

    #[test]
    fn test_lookup() {
        let mut set = BandSet::default();
        set.get_mut(Band::Alpha).record(0.75);

        let alpha = set.lookup("alpha").unwrap();
        assert_eq!(alpha.current_absolute_power(), 0.75);
        assert_eq!(set.lookup_index(2).unwrap().current_absolute_power(), 0.75);

        assert!(matches!(set.lookup("mu"), Err(ComputeError::UnknownBand(_))));
        assert!(matches!(
            set.lookup_index(7),
            Err(ComputeError::UnknownBand(_))
        ));
    }
}
