//! Detection quality against the source's ground-truth labels.

use crate::detector::Verdict;
use serde::{Deserialize, Serialize};

/// Confusion counts accumulated over a verdict sequence.
///
/// Warm-up verdicts are counted like any other (they are never flagged,
/// so labelled warm-up points show up as false negatives).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Evaluation {
    pub true_positives: u64,
    pub false_positives: u64,
    pub false_negatives: u64,
    pub true_negatives: u64,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Summary {
    pub observations: u64,
    pub detected: u64,
    pub labelled: u64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl Evaluation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, verdict: &Verdict) {
        match (verdict.is_anomaly, verdict.is_true_anomaly) {
            (true, true) => self.true_positives += 1,
            (true, false) => self.false_positives += 1,
            (false, true) => self.false_negatives += 1,
            (false, false) => self.true_negatives += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.true_positives + self.false_positives + self.false_negatives + self.true_negatives
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 }
    }

    pub fn summary(&self) -> Summary {
        Summary {
            observations: self.total(),
            detected: self.true_positives + self.false_positives,
            labelled: self.true_positives + self.false_negatives,
            precision: self.precision(),
            recall: self.recall(),
            f1: self.f1(),
        }
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den > 0 { num as f64 / den as f64 } else { 0.0 }
}

impl Extend<Verdict> for Evaluation {
    fn extend<T: IntoIterator<Item = Verdict>>(&mut self, iter: T) {
        for verdict in iter {
            self.record(&verdict);
        }
    }
}

impl<'a> Extend<&'a Verdict> for Evaluation {
    fn extend<T: IntoIterator<Item = &'a Verdict>>(&mut self, iter: T) {
        for verdict in iter {
            self.record(verdict);
        }
    }
}

impl FromIterator<Verdict> for Evaluation {
    fn from_iter<T: IntoIterator<Item = Verdict>>(iter: T) -> Self {
        let mut eval = Self::new();
        eval.extend(iter);
        eval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(is_anomaly: bool, is_true_anomaly: bool) -> Verdict {
        Verdict {
            value: 0.0,
            ewma: 0.0,
            std_dev: 0.0,
            is_anomaly,
            is_true_anomaly,
        }
    }

    #[test]
    fn test_empty_evaluation_scores_zero() {
        let eval = Evaluation::new();
        assert_eq!(eval.precision(), 0.0);
        assert_eq!(eval.recall(), 0.0);
        assert_eq!(eval.f1(), 0.0);
    }

    #[test]
    fn test_confusion_counts() {
        let eval: Evaluation = vec![
            verdict(true, true),
            verdict(true, true),
            verdict(true, false),
            verdict(false, true),
            verdict(false, false),
            verdict(false, false),
        ]
        .into_iter()
        .collect();

        assert_eq!(eval.true_positives, 2);
        assert_eq!(eval.false_positives, 1);
        assert_eq!(eval.false_negatives, 1);
        assert_eq!(eval.true_negatives, 2);
        assert_eq!(eval.total(), 6);

        assert!((eval.precision() - 2.0 / 3.0).abs() < 1e-12);
        assert!((eval.recall() - 2.0 / 3.0).abs() < 1e-12);
        assert!((eval.f1() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_summary_snapshot() {
        let mut eval = Evaluation::new();
        eval.extend(&[verdict(true, false), verdict(false, true)]);

        let summary = eval.summary();
        assert_eq!(summary.observations, 2);
        assert_eq!(summary.detected, 1);
        assert_eq!(summary.labelled, 1);
        assert_eq!(summary.precision, 0.0);
        assert_eq!(summary.recall, 0.0);
        assert_eq!(summary.f1, 0.0);
    }
}
