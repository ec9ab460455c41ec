use ewma_watch::{Detector, DetectorConfig, MAX_SEED_WINDOW, Verdict};
use proptest::prelude::*;

fn config_strategy() -> impl Strategy<Value = DetectorConfig> {
    (0.001f64..=1.0, 0.1f64..10.0, 1usize..50)
        .prop_map(|(alpha, threshold, warmup)| DetectorConfig::new(alpha, threshold, warmup))
}

fn values_strategy() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(
        prop_oneof![
            8 => -1.0e3f64..1.0e3,
            1 => -1.0e6f64..1.0e6,
            1 => Just(0.0),
        ],
        MAX_SEED_WINDOW..300,
    )
}

fn verdicts(config: DetectorConfig, values: &[f64]) -> Vec<Verdict> {
    Detector::new(config)
        .unwrap()
        .process(values.iter().copied())
        .map(|r| r.unwrap())
        .collect()
}

proptest! {
    #[test]
    fn variance_never_negative(config in config_strategy(), values in values_strategy()) {
        let mut stream = Detector::new(config).unwrap().process(values.iter().copied());
        while let Some(result) = stream.next() {
            let verdict = result.unwrap();
            prop_assert!(verdict.std_dev >= 0.0);
            if let Some(stats) = stream.stats() {
                prop_assert!(stats.variance() >= 0.0);
            }
        }
    }

    #[test]
    fn one_verdict_per_observation_in_order(config in config_strategy(), values in values_strategy()) {
        let out = verdicts(config, &values);
        prop_assert_eq!(out.len(), values.len());
        for (v, x) in out.iter().zip(&values) {
            prop_assert_eq!(v.value.to_bits(), x.to_bits());
        }
    }

    #[test]
    fn warmup_verdicts_never_flag(config in config_strategy(), values in values_strategy()) {
        let out = verdicts(config, &values);
        for v in &out[..config.seed_window()] {
            prop_assert!(!v.is_anomaly);
            prop_assert_eq!(v.std_dev, 0.0);
            prop_assert_eq!(v.ewma.to_bits(), v.value.to_bits());
        }
    }

    #[test]
    fn deterministic_across_runs(config in config_strategy(), values in values_strategy()) {
        let a = verdicts(config, &values);
        let b = verdicts(config, &values);
        for (x, y) in a.iter().zip(&b) {
            prop_assert_eq!(x.ewma.to_bits(), y.ewma.to_bits());
            prop_assert_eq!(x.std_dev.to_bits(), y.std_dev.to_bits());
            prop_assert_eq!(x.is_anomaly, y.is_anomaly);
        }
    }

    #[test]
    fn short_sources_report_exhaustion(config in config_strategy(), len in 0usize..MAX_SEED_WINDOW) {
        prop_assume!(len < config.seed_window());
        let results: Vec<_> = Detector::new(config)
            .unwrap()
            .process(std::iter::repeat(1.0).take(len))
            .collect();
        prop_assert_eq!(results.len(), len + 1);
        prop_assert!(results[..len].iter().all(|r| r.is_ok()));
        prop_assert!(results[len].is_err());
    }
}
