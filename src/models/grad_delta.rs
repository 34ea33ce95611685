//! Gradient/delta estimator.
//!
//! Fits a linear model with intercept and keeps only the slopes. Predictions
//! are `sum(gradient_i * x_i)`: the part of the response explained by the
//! covariates, without a level. Differences of such predictions between two
//! weather scenarios are what the correction operators consume.

use crate::core::{Formula, TimeseriesFrame};
use crate::error::{CorrectionError, Result};
use crate::models::timeseries_model::{FittedParams, TimeseriesModel};
use crate::models::traits::Estimator;
use crate::utils::least_squares::{
    huber_regression, weighted_least_squares, HuberConfig, SolverOptions,
};
use serde::{Deserialize, Serialize};

/// Linear fitting method.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum LinearMethod {
    /// Ordinary (weighted) least squares.
    LeastSquares,
    /// L2-penalised least squares.
    Ridge { alpha: f64 },
    /// Huber M-estimation.
    #[default]
    Robust,
}

/// Fitted slopes of one group, in formula order.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradients {
    pub variables: Vec<String>,
    pub values: Vec<f64>,
    /// Level of the underlying fit; not used for prediction.
    pub intercept: f64,
}

impl Gradients {
    pub fn get(&self, variable: &str) -> Option<f64> {
        self.variables
            .iter()
            .position(|v| v == variable)
            .map(|i| self.values[i])
    }
}

/// Gradient/delta estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradDelta {
    method: LinearMethod,
    /// Minimum rows per fitted group.
    n_min: usize,
    /// Optional column of observation weights.
    weights: Option<String>,
}

impl Default for GradDelta {
    fn default() -> Self {
        Self {
            method: LinearMethod::Robust,
            n_min: 30,
            weights: None,
        }
    }
}

impl GradDelta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fitting method. A ridge `alpha` must be non-negative.
    pub fn with_method(mut self, method: LinearMethod) -> Result<Self> {
        if let LinearMethod::Ridge { alpha } = method {
            if !(alpha.is_finite() && alpha >= 0.0) {
                return Err(CorrectionError::Configuration(format!(
                    "ridge alpha must be non-negative, got {}",
                    alpha
                )));
            }
        }
        self.method = method;
        Ok(self)
    }

    pub fn with_min_observations(mut self, n_min: usize) -> Self {
        self.n_min = n_min;
        self
    }

    pub fn with_weights(mut self, column: impl Into<String>) -> Self {
        self.weights = Some(column.into());
        self
    }

    pub fn method(&self) -> LinearMethod {
        self.method
    }

    pub fn min_observations(&self) -> usize {
        self.n_min
    }
}

impl Estimator for GradDelta {
    type Params = Gradients;

    fn name(&self) -> &str {
        "GradDelta"
    }

    fn validate(&self, formula: &Formula) -> Result<()> {
        if let Some(term) = formula.terms().iter().find(|t| t.is_spline()) {
            return Err(CorrectionError::Configuration(format!(
                "gradient model only supports linear terms, got {}",
                term
            )));
        }
        Ok(())
    }

    fn fit_columns(&self) -> Vec<&str> {
        self.weights.iter().map(String::as_str).collect()
    }

    fn fit_params(&self, formula: &Formula, frame: &TimeseriesFrame) -> Result<Gradients> {
        if frame.len() < self.n_min {
            return Err(CorrectionError::InsufficientData {
                needed: self.n_min,
                got: frame.len(),
            });
        }

        let y = frame.column(formula.response())?;
        let variables = formula.explanatory_variables();
        let columns = variables
            .iter()
            .map(|v| frame.column(v))
            .collect::<Result<Vec<_>>>()?;
        let weights = match &self.weights {
            Some(name) => Some(frame.column(name)?),
            None => None,
        };

        let fit = match self.method {
            LinearMethod::LeastSquares => {
                weighted_least_squares(y, &columns, weights, SolverOptions::default())?
            }
            LinearMethod::Ridge { alpha } => {
                let options = SolverOptions {
                    intercept: true,
                    ridge: alpha,
                };
                weighted_least_squares(y, &columns, weights, options)?
            }
            LinearMethod::Robust => huber_regression(
                y,
                &columns,
                weights,
                SolverOptions::default(),
                HuberConfig::default(),
            )?,
        };

        Ok(Gradients {
            variables: variables.into_iter().map(str::to_string).collect(),
            values: fit.coefficients,
            intercept: fit.intercept,
        })
    }

    fn predict_params(
        &self,
        params: &Gradients,
        _formula: &Formula,
        frame: &TimeseriesFrame,
    ) -> Result<Vec<f64>> {
        let mut predictions = vec![0.0; frame.len()];
        for (variable, gradient) in params.variables.iter().zip(&params.values) {
            let x = frame.column(variable)?;
            for (p, xi) in predictions.iter_mut().zip(x) {
                *p += gradient * xi;
            }
        }
        Ok(predictions)
    }
}

/// Regression model backed by [`GradDelta`].
pub type GradDeltaModel = TimeseriesModel<GradDelta>;

impl TimeseriesModel<GradDelta> {
    /// Gradient model with default settings from a formula string.
    pub fn grad_delta(formula: &str) -> Result<Self> {
        Self::new(Formula::parse(formula)?, GradDelta::default())
    }

    /// Fitted gradients, globally or per instant.
    pub fn gradients(&self) -> Option<&FittedParams<Gradients>> {
        self.params()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Granularity;
    use crate::models::{ByInstant, RegressionModel};
    use approx::assert_relative_eq;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn hourly(n: usize) -> Vec<DateTime<Utc>> {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n).map(|i| base + Duration::hours(i as i64)).collect()
    }

    fn dataset(n: usize) -> (TimeseriesFrame, TimeseriesFrame) {
        let t = hourly(n);
        let temperature: Vec<f64> = (0..n).map(|i| (i % 13) as f64).collect();
        let wind: Vec<f64> = (0..n).map(|i| (i % 7) as f64).collect();
        let y: Vec<f64> = (0..n)
            .map(|i| 500.0 - 3.0 * temperature[i] + 0.5 * wind[i])
            .collect();
        let outputs = TimeseriesFrame::outputs(t.clone(), y).unwrap();
        let inputs = TimeseriesFrame::new(t)
            .with_column("temperature", temperature)
            .unwrap()
            .with_column("wind", wind)
            .unwrap();
        (outputs, inputs)
    }

    #[test]
    fn gradients_exclude_intercept() {
        let (outputs, inputs) = dataset(100);
        for method in [
            LinearMethod::LeastSquares,
            LinearMethod::Ridge { alpha: 1e-6 },
            LinearMethod::Robust,
        ] {
            let mut model = GradDeltaModel::new(
                Formula::parse("y ~ temperature + wind").unwrap(),
                GradDelta::new().with_method(method).unwrap(),
            )
            .unwrap();
            model.fit(&outputs, &inputs).unwrap();

            let FittedParams::Global(g) = model.gradients().unwrap() else {
                panic!("expected a global fit");
            };
            assert_relative_eq!(g.get("temperature").unwrap(), -3.0, epsilon = 1e-4);
            assert_relative_eq!(g.get("wind").unwrap(), 0.5, epsilon = 1e-4);
            assert_relative_eq!(g.intercept, 500.0, epsilon = 1e-3);

            let predictions = model.predict(&inputs).unwrap();
            assert_relative_eq!(predictions[5], -15.0 + 2.5, epsilon = 1e-3);
        }
    }

    #[test]
    fn too_few_observations() {
        let (outputs, inputs) = dataset(20);
        let mut model = GradDeltaModel::grad_delta("y ~ temperature").unwrap();
        assert_eq!(
            model.fit(&outputs, &inputs),
            Err(CorrectionError::InsufficientData { needed: 30, got: 20 })
        );
        assert!(!model.is_fitted());
    }

    #[test]
    fn per_instant_groups_need_enough_rows() {
        let (outputs, inputs) = dataset(24 * 10);
        let mut model = GradDeltaModel::new(
            Formula::parse("y ~ temperature").unwrap(),
            GradDelta::new().with_min_observations(10),
        )
        .unwrap()
        .with_by_instant(ByInstant::per(Granularity::Hour))
        .unwrap();
        model.fit(&outputs, &inputs).unwrap();
        assert_eq!(model.gradients().unwrap().instants().len(), 24);

        let mut strict = GradDeltaModel::grad_delta("y ~ temperature")
            .unwrap()
            .with_by_instant(ByInstant::per(Granularity::Hour))
            .unwrap();
        assert_eq!(
            strict.fit(&outputs, &inputs),
            Err(CorrectionError::InsufficientData { needed: 30, got: 10 })
        );
    }

    #[test]
    fn weights_column_is_required_and_used() {
        let (outputs, inputs) = dataset(60);
        let estimator = GradDelta::new()
            .with_method(LinearMethod::LeastSquares)
            .unwrap()
            .with_weights("w");
        let mut model =
            GradDeltaModel::new(Formula::parse("y ~ temperature").unwrap(), estimator).unwrap();
        assert_eq!(
            model.fit(&outputs, &inputs),
            Err(CorrectionError::MissingVariable(vec!["w".into()]))
        );

        let weighted = inputs.clone().with_column("w", vec![1.0; 60]).unwrap();
        model.fit(&outputs, &weighted).unwrap();
        // Weights are only needed to fit
        assert_eq!(model.predict(&inputs.without(&["w"])).unwrap().len(), 60);
    }

    #[test]
    fn configuration_errors() {
        assert!(matches!(
            GradDeltaModel::grad_delta("y ~ s(temperature)"),
            Err(CorrectionError::Configuration(_))
        ));
        assert!(GradDelta::new()
            .with_method(LinearMethod::Ridge { alpha: -1.0 })
            .is_err());
    }

    #[test]
    fn method_config_serializes() {
        let json = serde_json::to_string(&LinearMethod::Ridge { alpha: 0.5 }).unwrap();
        assert_eq!(json, r#"{"method":"ridge","alpha":0.5}"#);
        let back: LinearMethod = serde_json::from_str(r#"{"method":"robust"}"#).unwrap();
        assert_eq!(back, LinearMethod::Robust);
    }
}
