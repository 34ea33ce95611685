//! Climatic correction of weather-sensitive series.

use crate::core::TimeseriesFrame;
use crate::error::{CorrectionError, Result};
use crate::models::{BoxedModel, ConditionalVarianceModel, FitStatus, RegressionModel};
use crate::operator::Operator;

/// Corrects an observed series to what it would have been under a target
/// weather scenario.
///
/// Holds one regression model, an optional conditional variance model and
/// one [`Operator`]. Operators that need moments require the variance model
/// and no other operator accepts one; both mismatches are rejected when the
/// corrector is built.
///
/// # Example
/// ```
/// use corrclim::core::TimeseriesFrame;
/// use corrclim::corrector::ClimaticCorrector;
/// use corrclim::models::SplineModel;
/// use chrono::{Duration, TimeZone, Utc};
///
/// let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
/// let timestamps: Vec<_> = (0..48).map(|i| base + Duration::hours(i)).collect();
/// let observed: Vec<f64> = (0..48).map(|i| (i % 12) as f64).collect();
/// let load: Vec<f64> = observed.iter().map(|t| 100.0 - 2.0 * t).collect();
///
/// let outputs = TimeseriesFrame::outputs(timestamps.clone(), load).unwrap();
/// let observed = TimeseriesFrame::new(timestamps.clone())
///     .with_column("temperature", observed)
///     .unwrap();
/// let target = TimeseriesFrame::new(timestamps)
///     .with_column("temperature", vec![5.0; 48])
///     .unwrap();
///
/// let mut corrector = ClimaticCorrector::new(SplineModel::spline("y ~ temperature").unwrap());
/// corrector.fit(&outputs, &observed, None).unwrap();
/// let corrected = corrector.apply(&outputs, &observed, &target).unwrap();
/// let values = corrected.column("y_climate_corrected").unwrap();
/// assert!(values.iter().all(|v| (v - 90.0).abs() < 1e-3));
/// ```
#[derive(Debug, Clone)]
pub struct ClimaticCorrector {
    model: BoxedModel,
    std_model: Option<ConditionalVarianceModel>,
    operator: Operator,
    status: FitStatus,
}

/// Builder for [`ClimaticCorrector`].
#[derive(Debug, Clone)]
pub struct ClimaticCorrectorBuilder {
    model: BoxedModel,
    std_model: Option<ConditionalVarianceModel>,
    operator: Operator,
}

impl ClimaticCorrectorBuilder {
    pub fn std_model(mut self, std_model: ConditionalVarianceModel) -> Self {
        self.std_model = Some(std_model);
        self
    }

    pub fn operator(mut self, operator: Operator) -> Self {
        self.operator = operator;
        self
    }

    /// Validate the operator / variance model pairing.
    pub fn build(self) -> Result<ClimaticCorrector> {
        match (&self.std_model, self.operator.requires_moments()) {
            (Some(_), false) => {
                return Err(CorrectionError::Configuration(format!(
                    "a conditional variance model needs an operator using moments, got {}",
                    self.operator
                )))
            }
            (None, true) => {
                return Err(CorrectionError::Configuration(format!(
                    "the {} operator needs a conditional variance model",
                    self.operator
                )))
            }
            _ => {}
        }
        Ok(ClimaticCorrector {
            model: self.model,
            std_model: self.std_model,
            operator: self.operator,
            status: FitStatus::Unfitted,
        })
    }
}

impl ClimaticCorrector {
    /// Corrector with the additive operator and no variance model.
    pub fn new(model: impl RegressionModel + 'static) -> Self {
        Self {
            model: Box::new(model),
            std_model: None,
            operator: Operator::default(),
            status: FitStatus::Unfitted,
        }
    }

    pub fn builder(model: impl RegressionModel + 'static) -> ClimaticCorrectorBuilder {
        Self::builder_boxed(Box::new(model))
    }

    pub fn builder_boxed(model: BoxedModel) -> ClimaticCorrectorBuilder {
        ClimaticCorrectorBuilder {
            model,
            std_model: None,
            operator: Operator::default(),
        }
    }

    /// Fit the variance model (when present) then the regression model.
    ///
    /// `fold_varname` names the fold column of `observed_weather`; it is
    /// required when a variance model is configured. The corrector is fitted
    /// only if every step succeeds.
    pub fn fit(
        &mut self,
        outputs: &TimeseriesFrame,
        observed_weather: &TimeseriesFrame,
        fold_varname: Option<&str>,
    ) -> Result<()> {
        self.status = FitStatus::Unfitted;
        outputs.validate_outputs()?;
        tracing::info!(
            operator = %self.operator,
            model = self.model.name(),
            "fitting climatic corrector"
        );

        if let Some(std_model) = self.std_model.as_mut() {
            let fold = fold_varname
                .ok_or_else(|| CorrectionError::MissingFoldVariable(String::new()))?;
            std_model.fit(outputs, observed_weather, fold)?;
        }
        self.model.fit(outputs, observed_weather)?;

        self.status = FitStatus::Fitted;
        tracing::info!("climatic corrector fitted");
        Ok(())
    }

    /// Correct `outputs` from the observed to the target weather.
    ///
    /// The three frames are first restricted to their common timestamps, in
    /// the row order of `outputs`. The result is the aligned outputs frame
    /// with the `y_climate_corrected` column added.
    pub fn apply(
        &self,
        outputs: &TimeseriesFrame,
        observed_weather: &TimeseriesFrame,
        target_weather: &TimeseriesFrame,
    ) -> Result<TimeseriesFrame> {
        if self.status != FitStatus::Fitted {
            return Err(CorrectionError::NotFitted);
        }
        outputs.validate_outputs()?;
        tracing::info!(operator = %self.operator, "climate correction");

        let (outputs, aligned) = outputs.align(&[target_weather, observed_weather])?;
        let (target, observed) = (&aligned[0], &aligned[1]);

        tracing::info!(rows = outputs.len(), "prediction with the target weather");
        let pred_target = self.model.predict(target)?;
        tracing::info!("prediction with the observed weather");
        let pred_observed = self.model.predict(observed)?;

        let (std_target, std_observed) = match &self.std_model {
            Some(std_model) => {
                tracing::info!("conditional standard deviations");
                (Some(std_model.predict(target)?), Some(std_model.predict(observed)?))
            }
            None => (None, None),
        };

        let corrected = self.operator.apply(
            &outputs,
            &pred_observed,
            &pred_target,
            std_observed.as_deref(),
            std_target.as_deref(),
        )?;
        tracing::info!("climate correction ended");
        Ok(corrected)
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn model(&self) -> &dyn RegressionModel {
        self.model.as_ref()
    }

    pub fn std_model(&self) -> Option<&ConditionalVarianceModel> {
        self.std_model.as_ref()
    }

    pub fn status(&self) -> FitStatus {
        self.status
    }

    pub fn is_fitted(&self) -> bool {
        self.status == FitStatus::Fitted
    }
}
