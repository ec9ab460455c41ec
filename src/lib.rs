//! Streaming anomaly detection with an adaptive EWMA.
//!
//! ```
//! use ewma_watch::{Detector, DetectorConfig};
//!
//! let detector = Detector::new(DetectorConfig::default()).unwrap();
//! let mut values = vec![100.0; 12];
//! values.push(200.0);
//!
//! let last = detector.process(values).last().unwrap().unwrap();
//! assert!(last.is_anomaly);
//! ```

pub mod algo;
pub mod detector;
pub mod error;
pub mod evaluation;
pub mod simulation;

pub use algo::ewma::AdaptiveEwma;
pub use detector::{Detector, DetectorConfig, MAX_SEED_WINDOW, Observation, Phase, Verdict, Verdicts};
pub use error::{DetectorError, Result};
pub use evaluation::{Evaluation, Summary};
