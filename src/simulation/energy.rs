//! Synthetic energy-consumption stream.
//!
//! Hourly samples built from a base load, daily and weekly sine
//! seasonality, linear concept drift and uniform noise. A small fraction of
//! points get a large positive or negative offset and carry the
//! `is_true_anomaly` label.

use crate::detector::Observation;
use crate::error::{DetectorError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Bernoulli, Distribution, Uniform};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use tracing::trace;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    pub base_consumption: f64,
    pub daily_period: u64,
    pub daily_amplitude: f64,
    pub weekly_period: u64,
    pub weekly_amplitude: f64,
    /// Added per step.
    pub drift_rate: f64,
    /// Noise is uniform in `[-noise_amplitude, noise_amplitude]`.
    pub noise_amplitude: f64,
    pub anomaly_probability: f64,
    pub anomaly_min_magnitude: f64,
    pub anomaly_max_magnitude: f64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            base_consumption: 100.0,
            daily_period: 24,
            daily_amplitude: 12.0,
            weekly_period: 168, // 7 * 24
            weekly_amplitude: 6.0,
            drift_rate: 0.001,
            noise_amplitude: 2.0,
            anomaly_probability: 0.02,
            anomaly_min_magnitude: 30.0,
            anomaly_max_magnitude: 50.0,
        }
    }
}

impl StreamConfig {
    pub fn validate(&self) -> Result<()> {
        if self.daily_period == 0 {
            return Err(DetectorError::invalid("daily_period", "must be greater than 0"));
        }
        if self.weekly_period == 0 {
            return Err(DetectorError::invalid("weekly_period", "must be greater than 0"));
        }
        if !(self.noise_amplitude >= 0.0) {
            return Err(DetectorError::invalid(
                "noise_amplitude",
                format!("must be non-negative, got {}", self.noise_amplitude),
            ));
        }
        if !(0.0..=1.0).contains(&self.anomaly_probability) {
            return Err(DetectorError::invalid(
                "anomaly_probability",
                format!("must be in [0, 1], got {}", self.anomaly_probability),
            ));
        }
        if !(self.anomaly_min_magnitude >= 0.0
            && self.anomaly_min_magnitude <= self.anomaly_max_magnitude)
        {
            return Err(DetectorError::invalid(
                "anomaly_min_magnitude",
                format!(
                    "must satisfy 0 <= min <= max, got [{}, {}]",
                    self.anomaly_min_magnitude, self.anomaly_max_magnitude
                ),
            ));
        }
        Ok(())
    }

    /// Deterministic part of the signal at step `time`.
    pub fn baseline(&self, time: u64) -> f64 {
        let daily = self.daily_amplitude
            * (TAU * (time % self.daily_period) as f64 / self.daily_period as f64).sin();
        let weekly = self.weekly_amplitude
            * (TAU * (time % self.weekly_period) as f64 / self.weekly_period as f64).sin();
        let drift = self.drift_rate * time as f64;

        self.base_consumption + daily + weekly + drift
    }
}

/// Infinite observation source. Iterate with `.take(n)` for a bounded run.
pub struct EnergyStream {
    config: StreamConfig,
    rng: StdRng,
    noise: Uniform<f64>,
    injection: Bernoulli,
    magnitude: Uniform<f64>,
    time: u64,
}

impl EnergyStream {
    /// Stream seeded from OS entropy.
    pub fn new(config: StreamConfig) -> Result<Self> {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// Reproducible stream: the same seed and config yield the same values.
    pub fn seeded(config: StreamConfig, seed: u64) -> Result<Self> {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: StreamConfig, rng: StdRng) -> Result<Self> {
        config.validate()?;

        let noise = Uniform::new_inclusive(-config.noise_amplitude, config.noise_amplitude)
            .map_err(|e| DetectorError::invalid("noise_amplitude", e.to_string()))?;
        let injection = Bernoulli::new(config.anomaly_probability)
            .map_err(|e| DetectorError::invalid("anomaly_probability", e.to_string()))?;
        let magnitude =
            Uniform::new_inclusive(config.anomaly_min_magnitude, config.anomaly_max_magnitude)
                .map_err(|e| DetectorError::invalid("anomaly_min_magnitude", e.to_string()))?;

        Ok(Self {
            config,
            rng,
            noise,
            injection,
            magnitude,
            time: 0,
        })
    }

    /// Step index of the next sample (one step per simulated hour).
    pub fn time(&self) -> u64 {
        self.time
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }
}

impl Iterator for EnergyStream {
    type Item = Observation;

    fn next(&mut self) -> Option<Observation> {
        let mut value = self.config.baseline(self.time) + self.noise.sample(&mut self.rng);

        let is_true_anomaly = self.injection.sample(&mut self.rng);
        if is_true_anomaly {
            let direction = if self.rng.random_bool(0.5) { 1.0 } else { -1.0 };
            value += direction * self.magnitude.sample(&mut self.rng);
            trace!(time = self.time, value, "anomaly injected");
        }

        self.time += 1;
        Some(Observation::labelled(value, is_true_anomaly))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (usize::MAX, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_stream_is_reproducible() {
        let a: Vec<_> = EnergyStream::seeded(StreamConfig::default(), 7)
            .unwrap()
            .take(500)
            .collect();
        let b: Vec<_> = EnergyStream::seeded(StreamConfig::default(), 7)
            .unwrap()
            .take(500)
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_noise_free_stream_matches_baseline() {
        let config = StreamConfig {
            noise_amplitude: 0.0,
            anomaly_probability: 0.0,
            ..StreamConfig::default()
        };
        let stream = EnergyStream::seeded(config.clone(), 1).unwrap();

        for (t, obs) in stream.take(200).enumerate() {
            assert_eq!(obs.value, config.baseline(t as u64));
            assert!(!obs.is_true_anomaly);
        }
    }

    #[test]
    fn test_baseline_shape() {
        let config = StreamConfig::default();
        // sin(0) terms vanish at t = 0
        assert_eq!(config.baseline(0), 100.0);
        // quarter of a day: daily term at its peak
        let quarter = config.baseline(6);
        let weekly = 6.0 * (TAU * 6.0 / 168.0).sin();
        assert!((quarter - (100.0 + 12.0 + weekly + 0.006)).abs() < 1e-9);
    }

    #[test]
    fn test_injected_anomalies_are_labelled_and_large() {
        let config = StreamConfig {
            noise_amplitude: 0.0,
            anomaly_probability: 1.0,
            drift_rate: 0.0,
            ..StreamConfig::default()
        };
        let stream = EnergyStream::seeded(config.clone(), 3).unwrap();

        for (t, obs) in stream.take(100).enumerate() {
            assert!(obs.is_true_anomaly);
            let offset = (obs.value - config.baseline(t as u64)).abs();
            assert!((30.0 - 1e-9..=50.0 + 1e-9).contains(&offset), "offset {offset}");
        }
    }

    #[test]
    fn test_anomaly_rate_near_configured_probability() {
        let stream = EnergyStream::seeded(StreamConfig::default(), 42).unwrap();
        let labelled = stream.take(20_000).filter(|o| o.is_true_anomaly).count();

        // 2% of 20k = 400
        assert!((300..500).contains(&labelled), "labelled {labelled}");
    }

    #[test]
    fn test_invalid_stream_config() {
        let bad = [
            StreamConfig { daily_period: 0, ..StreamConfig::default() },
            StreamConfig { weekly_period: 0, ..StreamConfig::default() },
            StreamConfig { noise_amplitude: -1.0, ..StreamConfig::default() },
            StreamConfig { anomaly_probability: 1.5, ..StreamConfig::default() },
            StreamConfig {
                anomaly_min_magnitude: 60.0,
                ..StreamConfig::default()
            },
        ];
        for config in bad {
            assert!(EnergyStream::seeded(config, 0).is_err());
        }
    }

    #[test]
    fn test_time_advances_per_sample() {
        let mut stream = EnergyStream::seeded(StreamConfig::default(), 0).unwrap();
        assert_eq!(stream.time(), 0);
        stream.next();
        stream.next();
        assert_eq!(stream.time(), 2);
    }
}
