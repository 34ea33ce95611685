//! Penalised regression spline estimator.
//!
//! Each `s(x)` term expands into a truncated linear basis
//! `x, (x - k_1)+, ..., (x - k_m)+` with knots at interior quantiles of the
//! training values. Linear terms enter the design as-is. Coefficients are
//! estimated by ridge-penalised least squares.

use crate::core::{quantile_sorted, Formula, Term, TimeseriesFrame};
use crate::error::{CorrectionError, Result};
use crate::models::timeseries_model::TimeseriesModel;
use crate::models::traits::Estimator;
use crate::utils::least_squares::{weighted_least_squares, LinearFit, SolverOptions};
use serde::{Deserialize, Serialize};

/// Basis expansion of one formula term, fixed at fit time.
#[derive(Debug, Clone, PartialEq)]
pub enum TermBasis {
    Linear { variable: String },
    Spline { variable: String, knots: Vec<f64> },
}

impl TermBasis {
    pub fn variable(&self) -> &str {
        match self {
            TermBasis::Linear { variable } | TermBasis::Spline { variable, .. } => variable,
        }
    }

    fn width(&self) -> usize {
        match self {
            TermBasis::Linear { .. } => 1,
            TermBasis::Spline { knots, .. } => 1 + knots.len(),
        }
    }

    fn expand(&self, x: &[f64], design: &mut Vec<Vec<f64>>) {
        design.push(x.to_vec());
        if let TermBasis::Spline { knots, .. } = self {
            for &knot in knots {
                design.push(x.iter().map(|v| (v - knot).max(0.0)).collect());
            }
        }
    }
}

/// Fitted spline parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SplineParams {
    pub bases: Vec<TermBasis>,
    pub fit: LinearFit,
}

/// Spline regression estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplineRegression {
    /// Interior knots per smooth term.
    n_knots: usize,
    /// Ridge penalty on every basis coefficient.
    penalty: f64,
}

impl Default for SplineRegression {
    fn default() -> Self {
        Self {
            n_knots: 5,
            penalty: 1e-6,
        }
    }
}

impl SplineRegression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_knots(mut self, n_knots: usize) -> Self {
        self.n_knots = n_knots;
        self
    }

    /// Set the ridge penalty. Must be non-negative and finite.
    pub fn with_penalty(mut self, penalty: f64) -> Result<Self> {
        if !(penalty.is_finite() && penalty >= 0.0) {
            return Err(CorrectionError::Configuration(format!(
                "spline penalty must be non-negative, got {}",
                penalty
            )));
        }
        self.penalty = penalty;
        Ok(self)
    }

    pub fn n_knots(&self) -> usize {
        self.n_knots
    }

    pub fn penalty(&self) -> f64 {
        self.penalty
    }

    /// Interior quantile knots strictly between the extremes of `x`.
    fn knots(&self, x: &[f64]) -> Vec<f64> {
        let mut sorted: Vec<f64> = x.iter().copied().filter(|v| v.is_finite()).collect();
        if sorted.len() < 2 {
            return Vec::new();
        }
        sorted.sort_by(|a, b| a.total_cmp(b));
        let (min, max) = (sorted[0], sorted[sorted.len() - 1]);

        let mut knots: Vec<f64> = Vec::with_capacity(self.n_knots);
        for i in 1..=self.n_knots {
            let q = i as f64 / (self.n_knots + 1) as f64;
            let knot = quantile_sorted(&sorted, q);
            if knot > min && knot < max && knots.last().map_or(true, |&last| knot > last) {
                knots.push(knot);
            }
        }
        knots
    }
}

impl Estimator for SplineRegression {
    type Params = SplineParams;

    fn name(&self) -> &str {
        "SplineRegression"
    }

    fn fit_params(&self, formula: &Formula, frame: &TimeseriesFrame) -> Result<SplineParams> {
        let y = frame.column(formula.response())?;

        let mut bases = Vec::with_capacity(formula.terms().len());
        for term in formula.terms() {
            let basis = match term {
                Term::Linear(variable) => TermBasis::Linear {
                    variable: variable.clone(),
                },
                Term::Spline(variable) => TermBasis::Spline {
                    variable: variable.clone(),
                    knots: self.knots(frame.column(variable)?),
                },
            };
            bases.push(basis);
        }

        let design = build_design(&bases, frame)?;
        let needed = design.len() + 1;
        if y.len() < needed {
            return Err(CorrectionError::InsufficientData {
                needed,
                got: y.len(),
            });
        }

        let columns: Vec<&[f64]> = design.iter().map(Vec::as_slice).collect();
        let options = SolverOptions {
            intercept: true,
            ridge: self.penalty,
        };
        let fit = weighted_least_squares(y, &columns, None, options)?;
        Ok(SplineParams { bases, fit })
    }

    fn predict_params(
        &self,
        params: &SplineParams,
        _formula: &Formula,
        frame: &TimeseriesFrame,
    ) -> Result<Vec<f64>> {
        let design = build_design(&params.bases, frame)?;
        let columns: Vec<&[f64]> = design.iter().map(Vec::as_slice).collect();
        if columns.is_empty() {
            return Ok(vec![params.fit.intercept; frame.len()]);
        }
        params.fit.predict(&columns)
    }
}

fn build_design(bases: &[TermBasis], frame: &TimeseriesFrame) -> Result<Vec<Vec<f64>>> {
    let width = bases.iter().map(TermBasis::width).sum();
    let mut design = Vec::with_capacity(width);
    for basis in bases {
        basis.expand(frame.column(basis.variable())?, &mut design);
    }
    Ok(design)
}

/// Regression model backed by [`SplineRegression`].
pub type SplineModel = TimeseriesModel<SplineRegression>;

impl TimeseriesModel<SplineRegression> {
    /// Spline model with default settings from a formula string.
    pub fn spline(formula: &str) -> Result<Self> {
        Self::new(Formula::parse(formula)?, SplineRegression::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Granularity, TimeseriesFrame};
    use crate::models::{ByInstant, RegressionModel};
    use approx::assert_relative_eq;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn hourly(n: usize) -> Vec<DateTime<Utc>> {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n).map(|i| base + Duration::hours(i as i64)).collect()
    }

    fn dataset<F: Fn(f64) -> f64>(n: usize, f: F) -> (TimeseriesFrame, TimeseriesFrame) {
        let t = hourly(n);
        let temperature: Vec<f64> = (0..n).map(|i| -5.0 + 30.0 * i as f64 / n as f64).collect();
        let y: Vec<f64> = temperature.iter().map(|&x| f(x)).collect();
        (
            TimeseriesFrame::outputs(t.clone(), y).unwrap(),
            TimeseriesFrame::new(t).with_column("temperature", temperature).unwrap(),
        )
    }

    #[test]
    fn knots_are_interior_and_increasing() {
        let x: Vec<f64> = (0..101).map(|i| i as f64).collect();
        let knots = SplineRegression::new().with_knots(4).knots(&x);
        assert_eq!(knots, vec![20.0, 40.0, 60.0, 80.0]);

        let constant = SplineRegression::new().knots(&[3.0; 10]);
        assert!(constant.is_empty());
    }

    #[test]
    fn recovers_linear_relationship() {
        let (outputs, inputs) = dataset(200, |t| 50.0 - 1.5 * t);
        let mut model = SplineModel::spline("y ~ temperature").unwrap();
        model.fit(&outputs, &inputs).unwrap();
        let p = model.params().unwrap().for_instant(0).unwrap();
        assert_relative_eq!(p.fit.intercept, 50.0, epsilon = 1e-4);
        assert_relative_eq!(p.fit.coefficients[0], -1.5, epsilon = 1e-4);
    }

    #[test]
    fn captures_heating_hinge() {
        // Load rises below 15 degrees and is flat above
        let n = 310;
        let t = hourly(n);
        let temperature: Vec<f64> = (0..n).map(|i| (i % 31) as f64).collect();
        let y: Vec<f64> = temperature
            .iter()
            .map(|x| 100.0 + 4.0 * (15.0 - x).max(0.0))
            .collect();
        let outputs = TimeseriesFrame::outputs(t.clone(), y).unwrap();
        let inputs = TimeseriesFrame::new(t).with_column("temperature", temperature).unwrap();

        let mut model = SplineModel::new(
            Formula::parse("y ~ s(temperature)").unwrap(),
            SplineRegression::new().with_knots(3),
        )
        .unwrap();
        model.fit(&outputs, &inputs).unwrap();
        match model.params().unwrap() {
            crate::models::FittedParams::Global(p) => match &p.bases[0] {
                TermBasis::Spline { knots, .. } => assert_eq!(knots, &vec![7.0, 15.0, 23.0]),
                other => panic!("unexpected basis {:?}", other),
            },
            other => panic!("unexpected params {:?}", other),
        }

        let probe = TimeseriesFrame::new(hourly(3))
            .with_column("temperature", vec![0.0, 15.0, 22.0])
            .unwrap();
        let predictions = model.predict(&probe).unwrap();
        assert_relative_eq!(predictions[0], 160.0, epsilon = 1e-2);
        assert_relative_eq!(predictions[1], 100.0, epsilon = 1e-2);
        assert_relative_eq!(predictions[2], 100.0, epsilon = 1e-2);
    }

    #[test]
    fn nan_covariate_gives_nan_prediction() {
        let (outputs, inputs) = dataset(50, |t| 2.0 * t);
        let mut model = SplineModel::spline("y ~ s(temperature)").unwrap();
        model.fit(&outputs, &inputs).unwrap();
        let probe = TimeseriesFrame::new(hourly(2))
            .with_column("temperature", vec![f64::NAN, 1.0])
            .unwrap();
        let predictions = model.predict(&probe).unwrap();
        assert!(predictions[0].is_nan());
        assert!(predictions[1].is_finite());
    }

    #[test]
    fn too_few_rows() {
        let (outputs, inputs) = dataset(3, |t| t);
        let mut model = SplineModel::spline("y ~ s(temperature)").unwrap();
        assert!(matches!(
            model.fit(&outputs, &inputs),
            Err(CorrectionError::InsufficientData { .. })
        ));
    }

    #[test]
    fn per_instant_spline() {
        let n = 24 * 20;
        let t = hourly(n);
        let temperature: Vec<f64> = (0..n).map(|i| (i % 17) as f64).collect();
        let y: Vec<f64> = (0..n)
            .map(|i| (i % 24) as f64 + 2.0 * temperature[i])
            .collect();
        let outputs = TimeseriesFrame::outputs(t.clone(), y).unwrap();
        let inputs = TimeseriesFrame::new(t).with_column("temperature", temperature).unwrap();

        let mut model = SplineModel::spline("y ~ temperature")
            .unwrap()
            .with_by_instant(ByInstant::per(Granularity::Hour))
            .unwrap();
        model.fit(&outputs, &inputs).unwrap();
        let p = model.params().unwrap().for_instant(7 * 60).unwrap();
        assert_relative_eq!(p.fit.intercept, 7.0, epsilon = 1e-3);
        assert_relative_eq!(p.fit.coefficients[0], 2.0, epsilon = 1e-3);
    }

    #[test]
    fn rejects_negative_penalty_and_intercept_only_formula() {
        assert!(SplineRegression::new().with_penalty(-1.0).is_err());
        assert!(matches!(
            SplineModel::spline("y ~ 1"),
            Err(CorrectionError::Configuration(_))
        ));
    }
}
