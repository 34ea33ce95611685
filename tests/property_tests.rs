//! Property-based tests for correction operators, variance estimates and
//! cross-validation.
//!
//! These tests verify invariants that should hold for all valid inputs,
//! using randomly generated series.

use chrono::{DateTime, Duration, TimeZone, Utc};
use corrclim::core::{Formula, TimeseriesFrame};
use corrclim::error::{CorrectionError, Result};
use corrclim::models::{
    BoxedModel, ConditionalVarianceModel, FitStatus, RegressionModel, SplineModel,
    SplineRegression, TimeseriesModel,
};
use corrclim::operator::Operator;
use corrclim::utils::{cross_val_predict, fold_splits, FoldScheme};
use proptest::prelude::*;
use std::collections::HashSet;

fn make_timestamps(n: usize) -> Vec<DateTime<Utc>> {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (0..n).map(|i| base + Duration::hours(i as i64)).collect()
}

/// Four aligned vectors of the same random length.
fn scenario_strategy() -> impl Strategy<Value = (Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>)> {
    (1usize..40).prop_flat_map(|len| {
        (
            prop::collection::vec(-1e3..1e3_f64, len),
            prop::collection::vec(-1e3..1e3_f64, len),
            prop::collection::vec(-1e3..1e3_f64, len),
            prop::collection::vec(0.0..50.0_f64, len),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn additive_preserves_the_anomaly((y, p_obs, p_tgt, _) in scenario_strategy()) {
        let corrected = Operator::Additive.correct(&y, &p_obs, &p_tgt, None, None).unwrap();
        for i in 0..y.len() {
            let anomaly_before = y[i] - p_obs[i];
            let anomaly_after = corrected[i] - p_tgt[i];
            prop_assert!((anomaly_before - anomaly_after).abs() < 1e-9);
        }
    }

    #[test]
    fn target_ignores_observations((y, p_obs, p_tgt, _) in scenario_strategy()) {
        let shifted: Vec<f64> = y.iter().map(|v| v * 3.0 + 1.0).collect();
        let a = Operator::Target.correct(&y, &p_obs, &p_tgt, None, None).unwrap();
        let b = Operator::Target.correct(&shifted, &p_obs, &p_tgt, None, None).unwrap();
        prop_assert_eq!(&a, &p_tgt);
        prop_assert_eq!(a, b);
    }

    #[test]
    fn multiplicative_preserves_the_ratio((y, p_obs, p_tgt, _) in scenario_strategy()) {
        let p_obs: Vec<f64> = p_obs.iter().map(|v| v.abs() + 1.0).collect();
        let corrected = Operator::Multiplicative.correct(&y, &p_obs, &p_tgt, None, None).unwrap();
        for i in 0..y.len() {
            let expected = y[i] * p_tgt[i] / p_obs[i];
            prop_assert!((corrected[i] - expected).abs() <= 1e-9 * (1.0 + expected.abs()));
        }
    }

    #[test]
    fn two_moment_with_equal_stds_matches_additive(
        (y, p_obs, p_tgt, std) in scenario_strategy()
    ) {
        let two_moment = Operator::TwoMoment
            .correct(&y, &p_obs, &p_tgt, Some(&std), Some(&std))
            .unwrap();
        let additive = Operator::Additive.correct(&y, &p_obs, &p_tgt, None, None).unwrap();
        for (a, b) in two_moment.iter().zip(&additive) {
            prop_assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn two_moment_zero_stds_stay_finite(
        (y, p_obs, p_tgt, std) in scenario_strategy(),
        zero_mask in prop::collection::vec(any::<bool>(), 40)
    ) {
        let std_obs: Vec<f64> = std
            .iter()
            .zip(&zero_mask)
            .map(|(s, z)| if *z { 0.0 } else { *s + 0.5 })
            .collect();
        let corrected = Operator::TwoMoment
            .correct(&y, &p_obs, &p_tgt, Some(&std_obs), Some(&vec![0.0; y.len()]))
            .unwrap();
        for (i, value) in corrected.iter().enumerate() {
            prop_assert!(value.is_finite());
            if zero_mask[i] {
                // both stds are clamped to 1
                prop_assert!((value - (p_tgt[i] + y[i] - p_obs[i])).abs() < 1e-9);
            }
        }
    }
}

fn noisy_frames(noise: &[f64]) -> (TimeseriesFrame, TimeseriesFrame) {
    let n = noise.len();
    let t = make_timestamps(n);
    let x: Vec<f64> = (0..n).map(|i| (i % 11) as f64).collect();
    let y: Vec<f64> = x.iter().zip(noise).map(|(x, e)| 3.0 * x + e).collect();
    let outputs = TimeseriesFrame::outputs(t.clone(), y).unwrap();
    let inputs = TimeseriesFrame::new(t)
        .with_column("x", x)
        .unwrap()
        .with_fold_column("fold", FoldScheme::Contiguous { k: 4 })
        .unwrap();
    (outputs, inputs)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    #[test]
    fn conditional_std_is_never_negative(
        noise in prop::collection::vec(-5.0..5.0_f64, 40..80),
        probe in prop::collection::vec(-50.0..50.0_f64, 1..20)
    ) {
        let (outputs, inputs) = noisy_frames(&noise);
        let expectation = SplineModel::spline("y ~ x").unwrap();
        let variance = TimeseriesModel::new(
            Formula::parse("y ~ s(x)").unwrap(),
            SplineRegression::new().with_knots(3),
        )
        .unwrap();
        let mut model = ConditionalVarianceModel::new(variance, expectation);
        model.fit(&outputs, &inputs, "fold").unwrap();

        let probe_frame = TimeseriesFrame::new(make_timestamps(probe.len()))
            .with_column("x", probe)
            .unwrap();
        for s in model.predict(&probe_frame).unwrap() {
            prop_assert!(s >= 0.0);
        }
    }

    #[test]
    fn fold_splits_partition_the_rows(folds in prop::collection::vec(0u8..6, 2..60)) {
        let folds: Vec<f64> = folds.into_iter().map(f64::from).collect();
        let splits = fold_splits(&folds);
        let distinct: HashSet<u64> = folds.iter().map(|f| f.to_bits()).collect();
        prop_assert_eq!(splits.len(), distinct.len());

        let mut tested = HashSet::new();
        for split in &splits {
            for row in &split.test {
                prop_assert!(!split.train.contains(row));
                prop_assert!(tested.insert(*row));
            }
            prop_assert_eq!(split.train.len() + split.test.len(), folds.len());
        }
        prop_assert_eq!(tested.len(), folds.len());
    }
}

/// Predicts 1 for any timestamp it was trained on, 0 otherwise.
#[derive(Debug, Clone)]
struct LeakDetector {
    formula: Formula,
    seen: Option<HashSet<DateTime<Utc>>>,
}

impl LeakDetector {
    fn new() -> Self {
        Self {
            formula: Formula::parse("y ~ x").unwrap(),
            seen: None,
        }
    }
}

impl RegressionModel for LeakDetector {
    fn fit(&mut self, outputs: &TimeseriesFrame, _inputs: &TimeseriesFrame) -> Result<()> {
        self.seen = Some(outputs.timestamps().iter().copied().collect());
        Ok(())
    }

    fn predict(&self, inputs: &TimeseriesFrame) -> Result<Vec<f64>> {
        let seen = self.seen.as_ref().ok_or(CorrectionError::NotFitted)?;
        Ok(inputs
            .timestamps()
            .iter()
            .map(|t| if seen.contains(t) { 1.0 } else { 0.0 })
            .collect())
    }

    fn status(&self) -> FitStatus {
        if self.seen.is_some() {
            FitStatus::Fitted
        } else {
            FitStatus::Unfitted
        }
    }

    fn formula(&self) -> &Formula {
        &self.formula
    }

    fn name(&self) -> &str {
        "LeakDetector"
    }

    fn unfitted_copy(&self) -> BoxedModel {
        Box::new(Self::new())
    }

    fn box_clone(&self) -> BoxedModel {
        Box::new(self.clone())
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn out_of_fold_predictions_never_see_their_row(
        len in 6usize..60,
        k in 2usize..6,
        seed in any::<u64>()
    ) {
        prop_assume!(k <= len);
        let frame = TimeseriesFrame::new(make_timestamps(len))
            .with_column("y", vec![0.0; len])
            .unwrap()
            .with_column("x", vec![0.0; len])
            .unwrap()
            .with_fold_column("fold", FoldScheme::Shuffled { k, seed })
            .unwrap();
        let predictions = cross_val_predict(&LeakDetector::new(), &frame, "fold").unwrap();
        prop_assert_eq!(predictions, vec![0.0; len]);
    }
}
