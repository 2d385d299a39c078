//! Per-band adaptive normalization
//!
//! A [`BandStatistic`] turns a raw, slowly drifting absolute power signal into
//! a score in `[0, 1]`. The dynamic range is estimated from a bounded history
//! of the band using nearest-rank percentiles: the sample is placed linearly
//! between the `cutoff` and `1 - cutoff` percentiles and clamped.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::config::{HistoryMode, StatisticConfig};
use crate::error::ComputeError;

/// Nearest-rank percentile of an ascending slice.
///
/// The index is `floor(p * (len - 1))`, so a single-element slice always
/// yields its only value. Returns `None` for an empty slice.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let index = (p * (sorted.len() - 1) as f64).floor() as usize;
    sorted.get(index.min(sorted.len() - 1)).copied()
}

/// Rolling statistic and latest outputs for one band
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandStatistic {
    absolute_power: f64,
    relative_power: f64,
    score: f64,
    /// Percentile reference, bounded to `history_capacity`
    history: VecDeque<f64>,
    /// Most recent samples, bounded to `window_capacity`
    recent_window: VecDeque<f64>,
    samples_seen: u64,
    /// Last score used the degenerate-range fallback
    degenerate: bool,
    /// Owned by the engine config; reapplied by [`BandStatistic::restore`]
    #[serde(skip)]
    config: StatisticConfig,
}

impl Default for BandStatistic {
    fn default() -> Self {
        Self::new(StatisticConfig::default())
    }
}

impl BandStatistic {
    pub fn new(config: StatisticConfig) -> Self {
        Self {
            absolute_power: 0.0,
            relative_power: 0.0,
            score: 0.0,
            history: VecDeque::with_capacity(config.history_capacity),
            recent_window: VecDeque::with_capacity(config.window_capacity + 1),
            samples_seen: 0,
            degenerate: false,
            config,
        }
    }

    /// Record a raw sample and return the new score
    pub fn record(&mut self, sample: f64) -> f64 {
        if self.history.len() < self.config.history_capacity {
            self.history.push_back(sample);
        } else if self.config.history_mode == HistoryMode::Rolling {
            self.history.pop_front();
            self.history.push_back(sample);
        }

        self.recent_window.push_back(sample);
        while self.recent_window.len() > self.config.window_capacity {
            self.recent_window.pop_front();
        }

        self.absolute_power = sample;
        self.samples_seen += 1;

        self.score = self.compute_score(sample);
        self.score
    }

    fn compute_score(&mut self, sample: f64) -> f64 {
        let Some((lower, upper)) = self.limits() else {
            self.degenerate = true;
            return self.config.degenerate_score;
        };

        let range = upper - lower;
        let t = (sample - lower) / range;

        if !(range > 0.0 && range.is_finite()) || t.is_nan() {
            debug!(
                "degenerate percentile range [{}, {}] for sample {}",
                lower, upper, sample
            );
            self.degenerate = true;
            return self.config.degenerate_score;
        }

        self.degenerate = false;
        t.clamp(0.0, 1.0)
    }

    /// Current `(lower, upper)` percentile limits of the history
    pub fn limits(&self) -> Option<(f64, f64)> {
        let mut sorted: Vec<f64> = self.history.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);

        let lower = percentile(&sorted, self.config.cutoff)?;
        let upper = percentile(&sorted, 1.0 - self.config.cutoff)?;
        Some((lower, upper))
    }

    /// Last recorded sample, or 0 before any sample
    pub fn current_absolute_power(&self) -> f64 {
        self.absolute_power
    }

    pub fn relative_power(&self) -> f64 {
        self.relative_power
    }

    pub(crate) fn set_relative_power(&mut self, value: f64) {
        self.relative_power = value;
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn history(&self) -> &VecDeque<f64> {
        &self.history
    }

    pub fn recent_window(&self) -> &VecDeque<f64> {
        &self.recent_window
    }

    pub fn samples_seen(&self) -> u64 {
        self.samples_seen
    }

    pub fn is_degenerate(&self) -> bool {
        self.degenerate
    }

    pub fn config(&self) -> &StatisticConfig {
        &self.config
    }

    /// Attach a config to deserialized state and check the state fits it
    pub(crate) fn restore(&mut self, config: StatisticConfig) -> Result<(), ComputeError> {
        if self.history.len() > config.history_capacity {
            return Err(ComputeError::ParseError(format!(
                "history holds {} samples, capacity is {}",
                self.history.len(),
                config.history_capacity
            )));
        }
        if self.recent_window.len() > config.window_capacity {
            return Err(ComputeError::ParseError(format!(
                "recent window holds {} samples, capacity is {}",
                self.recent_window.len(),
                config.window_capacity
            )));
        }
        if !(0.0..=1.0).contains(&self.score) {
            return Err(ComputeError::ParseError(format!(
                "score {} outside [0, 1]",
                self.score
            )));
        }
        if !(0.0..=1.0).contains(&self.relative_power) {
            return Err(ComputeError::ParseError(format!(
                "relative power {} outside [0, 1]",
                self.relative_power
            )));
        }
        self.config = config;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn small_config(history: usize, window: usize) -> StatisticConfig {
        StatisticConfig {
            history_capacity: history,
            window_capacity: window,
            ..Default::default()
        }
    }

    #[test]
    fn test_percentile_nearest_rank() {
        let sorted: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        assert_eq!(percentile(&sorted, 0.2), Some(2.0));
        assert_eq!(percentile(&sorted, 0.8), Some(8.0));
        assert_eq!(percentile(&sorted, 0.0), Some(1.0));
        assert_eq!(percentile(&sorted, 1.0), Some(10.0));
    }

    #[test]
    fn test_percentile_single_and_empty() {
        assert_eq!(percentile(&[4.2], 0.0), Some(4.2));
        assert_eq!(percentile(&[4.2], 0.8), Some(4.2));
        assert_eq!(percentile(&[], 0.5), None);
    }

    #[test]
    fn test_ascending_ramp_scenario() {
        let mut stat = BandStatistic::default();

        // First sample: lower == upper, fallback applies
        let first = stat.record(1.0);
        assert_eq!(first, 0.5);
        assert!(stat.is_degenerate());

        let mut last = 0.0;
        for v in 2..=10 {
            last = stat.record(v as f64);
        }

        assert_eq!(stat.limits(), Some((2.0, 8.0)));
        assert_eq!(last, 1.0);
        assert!(!stat.is_degenerate());
    }

    #[test]
    fn test_score_inside_range() {
        let mut stat = BandStatistic::default();
        for v in 1..=10 {
            stat.record(v as f64);
        }
        // Sorted history is now [1, 2, 3, 4, 5, 5, 6, 7, 8, 9, 10]
        let score = stat.record(5.0);
        assert_eq!(stat.limits(), Some((3.0, 8.0)));
        assert!((score - 0.4).abs() < 1e-12);

        let low = stat.record(-3.0);
        assert_eq!(low, 0.0);
    }

    #[test]
    fn test_score_always_bounded() {
        let mut stat = BandStatistic::new(small_config(50, 10));
        let samples = [
            0.3, -1.2, 5.0, 5.0, 0.0, 1e6, -1e6, 0.7, 0.71, 0.69, 2.5, -0.4, 3.3,
        ];
        for _ in 0..10 {
            for &s in &samples {
                let score = stat.record(s);
                assert!((0.0..=1.0).contains(&score), "score {} out of range", score);
            }
        }
    }

    #[test]
    fn test_constant_signal_is_degenerate() {
        let mut stat = BandStatistic::default();
        for _ in 0..20 {
            assert_eq!(stat.record(0.8), 0.5);
        }
        assert!(stat.is_degenerate());
    }

    #[test]
    fn test_custom_degenerate_score() {
        let mut stat = BandStatistic::new(StatisticConfig {
            degenerate_score: 0.0,
            ..Default::default()
        });
        assert_eq!(stat.record(3.0), 0.0);
    }

    #[test]
    fn test_nan_sample_falls_back() {
        let mut stat = BandStatistic::default();
        for v in 1..=10 {
            stat.record(v as f64);
        }
        let score = stat.record(f64::NAN);
        assert_eq!(score, 0.5);
        assert!(stat.is_degenerate());
    }

    #[test]
    fn test_frozen_history() {
        let mut stat = BandStatistic::new(small_config(5, 3));
        for v in 0..5 {
            stat.record(v as f64);
        }
        assert_eq!(stat.history().len(), 5);

        for v in 100..110 {
            stat.record(v as f64);
        }
        assert_eq!(stat.history().len(), 5);
        assert_eq!(
            stat.history().iter().copied().collect::<Vec<_>>(),
            vec![0.0, 1.0, 2.0, 3.0, 4.0]
        );
        // Baseline calcified: late samples all score at the top
        assert_eq!(stat.score(), 1.0);
    }

    #[test]
    fn test_rolling_history() {
        let mut stat = BandStatistic::new(StatisticConfig {
            history_mode: HistoryMode::Rolling,
            ..small_config(5, 3)
        });
        for v in 0..12 {
            stat.record(v as f64);
        }
        assert_eq!(
            stat.history().iter().copied().collect::<Vec<_>>(),
            vec![7.0, 8.0, 9.0, 10.0, 11.0]
        );
    }

    #[test]
    fn test_recent_window_slides() {
        let mut stat = BandStatistic::new(small_config(100, 4));
        for calls in 1..=10u32 {
            stat.record(calls as f64);
            let expected: Vec<f64> = ((calls.saturating_sub(4) + 1)..=calls)
                .map(|v| v as f64)
                .collect();
            assert_eq!(stat.recent_window().len(), (calls as usize).min(4));
            assert_eq!(
                stat.recent_window().iter().copied().collect::<Vec<_>>(),
                expected
            );
        }
    }

    #[test]
    fn test_absolute_power_default_and_update() {
        let mut stat = BandStatistic::default();
        assert_eq!(stat.current_absolute_power(), 0.0);
        assert_eq!(stat.samples_seen(), 0);

        stat.record(0.42);
        stat.record(-0.1);
        assert_eq!(stat.current_absolute_power(), -0.1);
        assert_eq!(stat.samples_seen(), 2);
    }

    #[test]
    fn test_restore_applies_config() {
        let mut stat = BandStatistic::new(small_config(5, 3));
        for v in 0..8 {
            stat.record(v as f64);
        }
        let json = serde_json::to_string(&stat).unwrap();
        assert!(!json.contains("degenerate_score"));

        let mut restored: BandStatistic = serde_json::from_str(&json).unwrap();
        restored.restore(small_config(5, 3)).unwrap();
        assert_eq!(restored.config(), &small_config(5, 3));
        assert_eq!(restored.history().len(), 5);
    }

    #[test]
    fn test_restore_rejects_oversized_buffers() {
        let mut stat = BandStatistic::new(small_config(10, 10));
        for v in 0..8 {
            stat.record(v as f64);
        }
        let json = serde_json::to_string(&stat).unwrap();

        let mut restored: BandStatistic = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            restored.restore(small_config(4, 10)),
            Err(ComputeError::ParseError(_))
        ));

        let mut restored: BandStatistic = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            restored.restore(small_config(10, 4)),
            Err(ComputeError::ParseError(_))
        ));
    }

    #[test]
    fn test_restore_rejects_out_of_range_score() {
        let stat = BandStatistic::default();
        let json = serde_json::to_string(&stat)
            .unwrap()
            .replace("\"score\":0.0", "\"score\":7.0");

        let mut restored: BandStatistic = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.score(), 7.0);
        assert!(restored.restore(StatisticConfig::default()).is_err());
    }

    #[test]
    fn test_higher_cutoff_never_widens_range() {
        let samples = [0.9, -0.3, 1.7, 0.2, 0.2, 3.1, -1.5, 0.8, 2.2, 0.05, 1.1];
        let mut previous: Option<(f64, f64)> = None;

        for cutoff in [0.0, 0.1, 0.2, 0.3, 0.4, 0.49] {
            let mut stat = BandStatistic::new(StatisticConfig {
                cutoff,
                ..Default::default()
            });
            for &s in &samples {
                stat.record(s);
            }
            let (lower, upper) = stat.limits().unwrap();
            if let Some((prev_lower, prev_upper)) = previous {
                assert!(lower >= prev_lower);
                assert!(upper <= prev_upper);
            }
            previous = Some((lower, upper));
        }
    }
}
