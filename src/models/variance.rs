//! Conditional standard deviation from cross-validated squared residuals.

use crate::core::{JoinKind, TimeseriesFrame, RESPONSE_COLUMN};
use crate::error::{CorrectionError, Result};
use crate::models::traits::{BoxedModel, FitStatus, RegressionModel};
use crate::utils::cross_validation::cross_val_predict;

/// Models the conditional variance of the response around a
/// conditional-expectation model.
///
/// Residual targets come from out-of-fold predictions: the expectation model
/// never predicts a row it was trained on. The expectation model passed in is
/// only used as a template for the per-fold scratch models and stays unfitted.
#[derive(Debug, Clone)]
pub struct ConditionalVarianceModel {
    variance_model: BoxedModel,
    expectation_model: BoxedModel,
}

impl ConditionalVarianceModel {
    /// `variance_model` is fitted on squared residuals of
    /// `expectation_model`.
    pub fn new(
        variance_model: impl RegressionModel + 'static,
        expectation_model: impl RegressionModel + 'static,
    ) -> Self {
        Self::from_boxed(Box::new(variance_model), Box::new(expectation_model))
    }

    pub fn from_boxed(variance_model: BoxedModel, expectation_model: BoxedModel) -> Self {
        Self {
            variance_model,
            expectation_model,
        }
    }

    /// Fit the variance regression on out-of-fold squared residuals.
    ///
    /// `fold_varname` names the column of `inputs` partitioning rows into
    /// folds; each distinct value is one fold.
    ///
    /// An expectation model fitted per instant needs every instant key of a
    /// fold to appear in the other folds as well. Otherwise the fit fails
    /// with `UnknownInstant`: contiguous folds over one year with monthly
    /// instants leave whole months out of training, shuffled folds do not.
    pub fn fit(
        &mut self,
        outputs: &TimeseriesFrame,
        inputs: &TimeseriesFrame,
        fold_varname: &str,
    ) -> Result<()> {
        if !inputs.has_column(fold_varname) {
            return Err(CorrectionError::MissingFoldVariable(fold_varname.to_string()));
        }
        outputs.validate_outputs()?;
        tracing::info!(
            model = self.variance_model.name(),
            fold = fold_varname,
            "fitting conditional variance model"
        );

        let merged = outputs
            .deduplicated()
            .merge(&inputs.deduplicated(), JoinKind::Inner);
        if merged.is_empty() {
            return Err(CorrectionError::EmptyData);
        }

        let cv_predictions =
            cross_val_predict(self.expectation_model.as_ref(), &merged, fold_varname)?;
        let squared_residuals: Vec<f64> = merged
            .column(RESPONSE_COLUMN)?
            .iter()
            .zip(&cv_predictions)
            .map(|(y, p)| (y - p).powi(2))
            .collect();

        let residual_outputs =
            TimeseriesFrame::outputs(merged.timestamps().to_vec(), squared_residuals)?;
        let residual_inputs = merged.without(&[RESPONSE_COLUMN]);
        self.variance_model.fit(&residual_outputs, &residual_inputs)
    }

    /// Conditional standard deviation per row of `inputs`.
    ///
    /// Negative variance estimates are clamped to zero before the square
    /// root; `NaN` stays `NaN`.
    pub fn predict(&self, inputs: &TimeseriesFrame) -> Result<Vec<f64>> {
        Ok(self
            .predict_variance(inputs)?
            .into_iter()
            .map(|v| v.sqrt())
            .collect())
    }

    /// Conditional variance per row of `inputs`, clamped at zero.
    pub fn predict_variance(&self, inputs: &TimeseriesFrame) -> Result<Vec<f64>> {
        let raw = self.variance_model.predict(inputs)?;
        let negatives = raw.iter().filter(|v| **v < 0.0).count();
        if negatives > 0 {
            tracing::debug!(negatives, "clamping negative variance estimates");
        }
        Ok(raw
            .into_iter()
            .map(|v| if v < 0.0 { 0.0 } else { v })
            .collect())
    }

    pub fn status(&self) -> FitStatus {
        self.variance_model.status()
    }

    pub fn is_fitted(&self) -> bool {
        self.variance_model.is_fitted()
    }

    pub fn variance_model(&self) -> &dyn RegressionModel {
        self.variance_model.as_ref()
    }

    pub fn expectation_model(&self) -> &dyn RegressionModel {
        self.expectation_model.as_ref()
    }
}
