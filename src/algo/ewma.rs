use serde::{Deserialize, Serialize};

/// Exponentially weighted level and dispersion estimate.
///
/// Seeded from a batch mean/variance, then updated one sample at a time.
/// `variance` is itself an EWMA of squared deviations, so it never goes
/// negative.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AdaptiveEwma {
    alpha: f64,
    ewma: f64,
    variance: f64,
    count: u64,
}

impl AdaptiveEwma {
    /// Builds the estimate from an unweighted seed window.
    ///
    /// Returns `None` for an empty window.
    pub fn seeded(alpha: f64, seed: &[f64]) -> Option<Self> {
        if seed.is_empty() {
            return None;
        }

        let n = seed.len() as f64;
        let mean = seed.iter().sum::<f64>() / n;
        let variance = seed.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;

        Some(Self {
            alpha,
            ewma: mean,
            variance,
            count: seed.len() as u64,
        })
    }

    /// Absolute distance from the current level.
    pub fn deviation(&self, sample: f64) -> f64 {
        (sample - self.ewma).abs()
    }

    /// True when `sample` lies strictly beyond `threshold` standard
    /// deviations of the current level.
    pub fn exceeds(&self, sample: f64, threshold: f64) -> bool {
        self.deviation(sample) > threshold * self.std_dev()
    }

    /// Folds `sample` into the estimate. The level moves first and the
    /// variance update measures against the new level.
    pub fn absorb(&mut self, sample: f64) {
        self.ewma = self.alpha * sample + (1.0 - self.alpha) * self.ewma;

        let diff = sample - self.ewma;
        self.variance = self.alpha * diff * diff + (1.0 - self.alpha) * self.variance;

        self.count += 1;
    }

    pub fn mean(&self) -> f64 {
        self.ewma
    }

    pub fn variance(&self) -> f64 {
        self.variance
    }

    pub fn std_dev(&self) -> f64 {
        self.variance.sqrt()
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}
