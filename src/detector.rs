//! Adaptive EWMA Anomaly Detector
//!
//! Turns an ordered stream of scalar observations into an equally ordered
//! stream of verdicts. The detector runs in two phases:
//!
//! - Warming up: the first `min(warmup_size, MAX_SEED_WINDOW)` observations
//!   are echoed back as placeholder verdicts (`ewma = value`, `std_dev = 0`,
//!   never anomalous) and buffered as the seed window.
//! - Steady: each observation is tested against the statistics carried over
//!   from the previous step, then absorbed. The verdict reports the
//!   statistics after absorption.
//!
//! The stream is lazy and consumes its source; replaying requires a fresh
//! detector.

use crate::algo::ewma::AdaptiveEwma;
use crate::error::{DetectorError, Result};
use serde::{Deserialize, Serialize};
use std::iter::FusedIterator;
use tracing::{debug, warn};

/// Upper bound on the seed window, whatever `warmup_size` asks for.
pub const MAX_SEED_WINDOW: usize = 10;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(default)]
pub struct DetectorConfig {
    /// Smoothing factor in (0, 1]. Higher adapts faster.
    pub alpha: f64,
    /// Standard deviations beyond which a point is flagged.
    pub threshold: f64,
    /// Requested warm-up length. Seeding uses at most `MAX_SEED_WINDOW`.
    pub warmup_size: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            alpha: 0.2,
            threshold: 3.0,
            warmup_size: 30,
        }
    }
}

impl DetectorConfig {
    pub fn new(alpha: f64, threshold: f64, warmup_size: usize) -> Self {
        Self {
            alpha,
            threshold,
            warmup_size,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(DetectorError::invalid(
                "alpha",
                format!("must be in (0, 1], got {}", self.alpha),
            ));
        }
        if !(self.threshold > 0.0) || !self.threshold.is_finite() {
            return Err(DetectorError::invalid(
                "threshold",
                format!("must be a positive finite number, got {}", self.threshold),
            ));
        }
        if self.warmup_size == 0 {
            return Err(DetectorError::invalid("warmup_size", "must be greater than 0"));
        }
        Ok(())
    }

    /// Number of observations actually used to seed the statistics.
    pub fn seed_window(&self) -> usize {
        self.warmup_size.min(MAX_SEED_WINDOW)
    }
}

/// A single value pulled from the source, with its optional ground-truth tag.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Observation {
    pub value: f64,
    /// Injected-anomaly label. Passed through, never read by detection.
    pub is_true_anomaly: bool,
}

impl Observation {
    pub fn normal(value: f64) -> Self {
        Self {
            value,
            is_true_anomaly: false,
        }
    }

    pub fn labelled(value: f64, is_true_anomaly: bool) -> Self {
        Self {
            value,
            is_true_anomaly,
        }
    }
}

impl From<f64> for Observation {
    fn from(value: f64) -> Self {
        Self::normal(value)
    }
}

impl From<(f64, bool)> for Observation {
    fn from((value, is_true_anomaly): (f64, bool)) -> Self {
        Self::labelled(value, is_true_anomaly)
    }
}

/// Per-observation outcome.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Verdict {
    pub value: f64,
    /// Level after absorbing `value` (the raw value during warm-up).
    pub ewma: f64,
    /// Dispersion after absorbing `value` (0 during warm-up).
    pub std_dev: f64,
    pub is_anomaly: bool,
    pub is_true_anomaly: bool,
}

impl Verdict {
    /// `(value, ewma, std_dev, is_anomaly, is_true_anomaly)`
    pub fn into_tuple(self) -> (f64, f64, f64, bool, bool) {
        (
            self.value,
            self.ewma,
            self.std_dev,
            self.is_anomaly,
            self.is_true_anomaly,
        )
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    WarmingUp,
    Steady,
}

/// Validated detector configuration. Each call to [`Detector::process`]
/// starts a session with empty history.
#[derive(Clone, Debug)]
pub struct Detector {
    config: DetectorConfig,
}

impl Detector {
    pub fn new(config: DetectorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Wraps `source` in a lazy verdict stream. Each `next()` pulls at most
    /// one observation.
    pub fn process<I, T>(self, source: I) -> Verdicts<I::IntoIter>
    where
        I: IntoIterator<Item = T>,
        T: Into<Observation>,
    {
        let window = self.config.seed_window();
        Verdicts {
            config: self.config,
            source: source.into_iter(),
            seed: Vec::with_capacity(window),
            stats: None,
            emitted: 0,
            finished: false,
        }
    }
}

/// Verdict stream produced by [`Detector::process`].
///
/// Yields `Err(SourceExhausted)` once if the source ends before the seed
/// window fills, then stops. Ending after warm-up is a normal `None`.
pub struct Verdicts<I> {
    config: DetectorConfig,
    source: I,
    seed: Vec<f64>,
    stats: Option<AdaptiveEwma>,
    emitted: u64,
    finished: bool,
}

impl<I> Verdicts<I> {
    pub fn phase(&self) -> Phase {
        if self.stats.is_some() {
            Phase::Steady
        } else {
            Phase::WarmingUp
        }
    }

    /// Running statistics, available once the seed window is filled.
    pub fn stats(&self) -> Option<&AdaptiveEwma> {
        self.stats.as_ref()
    }

    /// Verdicts emitted so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    fn warm_up(&mut self, obs: Observation) -> Verdict {
        self.seed.push(obs.value);

        if self.seed.len() == self.config.seed_window() {
            let seed = std::mem::take(&mut self.seed);
            self.stats = AdaptiveEwma::seeded(self.config.alpha, &seed);
            if let Some(stats) = &self.stats {
                debug!(
                    window = seed.len(),
                    ewma = stats.mean(),
                    std_dev = stats.std_dev(),
                    "seed window filled, detection enabled"
                );
            }
        }

        Verdict {
            value: obs.value,
            ewma: obs.value,
            std_dev: 0.0,
            is_anomaly: false,
            is_true_anomaly: obs.is_true_anomaly,
        }
    }
}

fn steady_step(stats: &mut AdaptiveEwma, threshold: f64, index: u64, obs: Observation) -> Verdict {
    // Decide against the pre-update estimate, report the post-update one.
    let is_anomaly = stats.exceeds(obs.value, threshold);
    if is_anomaly {
        debug!(
            index,
            value = obs.value,
            expected = stats.mean(),
            std_dev = stats.std_dev(),
            "anomaly detected"
        );
    }

    stats.absorb(obs.value);

    Verdict {
        value: obs.value,
        ewma: stats.mean(),
        std_dev: stats.std_dev(),
        is_anomaly,
        is_true_anomaly: obs.is_true_anomaly,
    }
}

impl<I, T> Iterator for Verdicts<I>
where
    I: Iterator<Item = T>,
    T: Into<Observation>,
{
    type Item = Result<Verdict>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let Some(obs) = self.source.next() else {
            self.finished = true;
            if self.stats.is_none() {
                let required = self.config.seed_window();
                let received = self.seed.len();
                warn!(required, received, "source exhausted before warm-up completed");
                return Some(Err(DetectorError::SourceExhausted { required, received }));
            }
            return None;
        };
        let obs = obs.into();

        let verdict = match self.stats.as_mut() {
            Some(stats) => steady_step(stats, self.config.threshold, self.emitted, obs),
            None => self.warm_up(obs),
        };
        self.emitted += 1;

        Some(Ok(verdict))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.finished {
            return (0, Some(0));
        }
        let (lower, upper) = self.source.size_hint();
        // One extra error item is possible while warming up.
        let extra = usize::from(self.stats.is_none());
        (lower, upper.and_then(|u| u.checked_add(extra)))
    }
}

impl<I, T> FusedIterator for Verdicts<I>
where
    I: Iterator<Item = T>,
    T: Into<Observation>,
{
}
