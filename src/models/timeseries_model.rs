//! Generic regression model: derivation, smoothing, instant grouping and the
//! fit/predict state machine shared by every estimator.

use crate::core::{
    compute_instant, is_shifted, shifted_base, CalendarDeriver, CovariateDeriver, Formula,
    JoinKind, TimeseriesFrame, INSTANT_COLUMN,
};
use crate::error::{CorrectionError, Result};
use crate::models::traits::{BoxedModel, ByInstant, Estimator, FitStatus, RegressionModel};
use crate::smoothing::Smoother;
use std::collections::BTreeMap;

/// Parameters of a fitted model.
#[derive(Debug, Clone, PartialEq)]
pub enum FittedParams<P> {
    /// One parameter set for every row.
    Global(P),
    /// One parameter set per instant key.
    PerInstant(BTreeMap<i64, P>),
}

impl<P> FittedParams<P> {
    /// Parameters for an instant key, or the global set.
    pub fn for_instant(&self, instant: i64) -> Option<&P> {
        match self {
            FittedParams::Global(p) => Some(p),
            FittedParams::PerInstant(map) => map.get(&instant),
        }
    }

    /// Instant keys seen at fit time (empty for a global fit).
    pub fn instants(&self) -> Vec<i64> {
        match self {
            FittedParams::Global(_) => Vec::new(),
            FittedParams::PerInstant(map) => map.keys().copied().collect(),
        }
    }
}

#[derive(Debug, Clone)]
enum ModelState<P> {
    Unfitted,
    Fitted(FittedParams<P>),
}

/// A regression model built from a formula and an [`Estimator`].
///
/// # Example
/// ```
/// use corrclim::core::TimeseriesFrame;
/// use corrclim::models::{RegressionModel, SplineModel};
/// use chrono::{Duration, TimeZone, Utc};
///
/// let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
/// let timestamps: Vec<_> = (0..48).map(|i| base + Duration::hours(i)).collect();
/// let temperature: Vec<f64> = (0..48).map(|i| (i % 24) as f64).collect();
/// let load: Vec<f64> = temperature.iter().map(|t| 100.0 - 2.0 * t).collect();
///
/// let outputs = TimeseriesFrame::outputs(timestamps.clone(), load).unwrap();
/// let inputs = TimeseriesFrame::new(timestamps)
///     .with_column("temperature", temperature)
///     .unwrap();
///
/// let mut model = SplineModel::spline("y ~ s(temperature)").unwrap();
/// model.fit(&outputs, &inputs).unwrap();
/// let predictions = model.predict(&inputs).unwrap();
/// assert!((predictions[10] - 80.0).abs() < 1e-3);
/// ```
#[derive(Debug, Clone)]
pub struct TimeseriesModel<E: Estimator> {
    formula: Formula,
    estimator: E,
    by_instant: ByInstant,
    deriver: Box<dyn CovariateDeriver>,
    smoother: Option<Box<dyn Smoother>>,
    state: ModelState<E::Params>,
}

impl<E: Estimator> TimeseriesModel<E> {
    /// Create an unfitted model with a global fit and the calendar deriver.
    pub fn new(formula: Formula, estimator: E) -> Result<Self> {
        estimator.validate(&formula)?;
        Ok(Self {
            formula,
            estimator,
            by_instant: ByInstant::disabled(),
            deriver: Box::new(CalendarDeriver::default()),
            smoother: None,
            state: ModelState::Unfitted,
        })
    }

    /// Configure instant grouping.
    pub fn with_by_instant(mut self, by_instant: ByInstant) -> Result<Self> {
        by_instant.validate()?;
        self.by_instant = by_instant;
        Ok(self)
    }

    pub fn with_deriver(mut self, deriver: impl CovariateDeriver + 'static) -> Self {
        self.deriver = Box::new(deriver);
        self
    }

    pub fn with_smoother(mut self, smoother: impl Smoother + 'static) -> Self {
        self.smoother = Some(Box::new(smoother));
        self
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    pub fn by_instant(&self) -> ByInstant {
        self.by_instant
    }

    /// Fitted parameters, if any.
    pub fn params(&self) -> Option<&FittedParams<E::Params>> {
        match &self.state {
            ModelState::Fitted(params) => Some(params),
            ModelState::Unfitted => None,
        }
    }

    fn fit_variables(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for name in self
            .formula
            .all_variables()
            .into_iter()
            .chain(self.estimator.fit_columns())
        {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        if self.by_instant.activate {
            names.push(INSTANT_COLUMN.to_string());
        }
        names
    }

    fn predict_variables(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .formula
            .explanatory_variables()
            .into_iter()
            .map(str::to_string)
            .collect();
        if self.by_instant.activate {
            names.push(INSTANT_COLUMN.to_string());
        }
        names
    }

    /// Derive every required variable or fail with `MissingVariable`.
    ///
    /// When lagged variables are still missing after the first pass, one more
    /// pass is run that also requests their bases, since a lag can depend on
    /// a variable the first pass did not know it needed.
    fn prepare(
        &self,
        frame: &TimeseriesFrame,
        required: &[&str],
        is_fitting: bool,
    ) -> Result<TimeseriesFrame> {
        let mut frame = if self.by_instant.activate && !frame.has_column(INSTANT_COLUMN) {
            compute_instant(frame, self.by_instant.granularity)?
        } else {
            frame.clone()
        };

        frame = self.deriver.derive(&frame, required, is_fitting)?;
        let missing = missing_variables(&frame, required);
        if missing.is_empty() {
            return Ok(frame);
        }

        if missing.iter().any(|name| is_shifted(name)) {
            let mut retry = missing.clone();
            for base in missing.iter().copied().filter_map(shifted_base) {
                if !retry.contains(&base) {
                    retry.push(base);
                }
            }
            tracing::debug!(variables = ?retry, "retrying derivation for lagged variables");
            frame = self.deriver.derive(&frame, &retry, is_fitting)?;
        }

        let missing = missing_variables(&frame, required);
        if !missing.is_empty() {
            return Err(CorrectionError::MissingVariable(
                missing.into_iter().map(str::to_string).collect(),
            ));
        }
        Ok(frame)
    }

    fn predict_group(
        &self,
        params: &E::Params,
        frame: &TimeseriesFrame,
    ) -> Result<Vec<f64>> {
        let predictions = self
            .estimator
            .predict_params(params, &self.formula, frame)?;
        if predictions.len() != frame.len() {
            return Err(CorrectionError::DimensionMismatch {
                expected: frame.len(),
                got: predictions.len(),
            });
        }
        Ok(predictions)
    }
}

impl<E: Estimator> RegressionModel for TimeseriesModel<E> {
    fn fit(&mut self, outputs: &TimeseriesFrame, inputs: &TimeseriesFrame) -> Result<()> {
        tracing::info!(model = self.estimator.name(), formula = %self.formula, "fitting model");
        self.state = ModelState::Unfitted;
        outputs.validate_outputs()?;

        let merged = outputs
            .deduplicated()
            .merge(&inputs.deduplicated(), JoinKind::Inner);
        if merged.is_empty() {
            return Err(CorrectionError::EmptyData);
        }

        let required = self.fit_variables();
        let required: Vec<&str> = required.iter().map(String::as_str).collect();
        let mut frame = self.prepare(&merged, &required, true)?;

        if let Some(smoother) = self.smoother.as_mut() {
            frame = smoother.fit_smooth(&frame, None)?;
        }

        let (frame, dropped) = frame.drop_non_finite(&required)?;
        if dropped > 0 {
            tracing::warn!(dropped, "rows with missing values excluded from fitting");
        }
        if frame.is_empty() {
            return Err(CorrectionError::EmptyData);
        }

        let params = if self.by_instant.activate {
            let mut per_instant = BTreeMap::new();
            for (instant, rows) in group_by_instant(&frame)? {
                tracing::debug!(instant, rows = rows.len(), "fitting instant");
                let params = self
                    .estimator
                    .fit_params(&self.formula, &frame.take(&rows))?;
                per_instant.insert(instant, params);
            }
            FittedParams::PerInstant(per_instant)
        } else {
            FittedParams::Global(self.estimator.fit_params(&self.formula, &frame)?)
        };

        self.state = ModelState::Fitted(params);
        tracing::info!(model = self.estimator.name(), rows = frame.len(), "model fitted");
        Ok(())
    }

    fn predict(&self, inputs: &TimeseriesFrame) -> Result<Vec<f64>> {
        let params = match &self.state {
            ModelState::Fitted(params) => params,
            ModelState::Unfitted => return Err(CorrectionError::NotFitted),
        };
        tracing::debug!(model = self.estimator.name(), rows = inputs.len(), "predicting");

        let required = self.predict_variables();
        let required: Vec<&str> = required.iter().map(String::as_str).collect();
        let mut frame = self.prepare(inputs, &required, false)?;
        if let Some(smoother) = &self.smoother {
            frame = smoother.smooth(&frame)?;
        }

        match params {
            FittedParams::Global(p) => self.predict_group(p, &frame),
            FittedParams::PerInstant(per_instant) => {
                let mut predictions = vec![f64::NAN; frame.len()];
                for (instant, rows) in group_by_instant(&frame)? {
                    let p = per_instant
                        .get(&instant)
                        .ok_or(CorrectionError::UnknownInstant(instant))?;
                    let group = self.predict_group(p, &frame.take(&rows))?;
                    for (row, value) in rows.into_iter().zip(group) {
                        predictions[row] = value;
                    }
                }
                Ok(predictions)
            }
        }
    }

    fn derive_covariates(&self, frame: &TimeseriesFrame) -> Result<TimeseriesFrame> {
        let required = self.fit_variables();
        let required: Vec<&str> = required.iter().map(String::as_str).collect();
        self.prepare(frame, &required, true)
    }

    fn status(&self) -> FitStatus {
        match self.state {
            ModelState::Unfitted => FitStatus::Unfitted,
            ModelState::Fitted(_) => FitStatus::Fitted,
        }
    }

    fn formula(&self) -> &Formula {
        &self.formula
    }

    fn name(&self) -> &str {
        self.estimator.name()
    }

    fn unfitted_copy(&self) -> BoxedModel {
        let mut copy = self.clone();
        copy.state = ModelState::Unfitted;
        Box::new(copy)
    }

    fn box_clone(&self) -> BoxedModel {
        Box::new(self.clone())
    }
}

fn missing_variables<'a>(frame: &TimeseriesFrame, required: &[&'a str]) -> Vec<&'a str> {
    required
        .iter()
        .copied()
        .filter(|name| !frame.has_column(name))
        .collect()
}

/// Row indices per instant key; rows with a non-finite key are skipped.
fn group_by_instant(frame: &TimeseriesFrame) -> Result<BTreeMap<i64, Vec<usize>>> {
    let keys = frame.column(INSTANT_COLUMN)?;
    let mut groups: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (row, key) in keys.iter().enumerate() {
        if key.is_finite() {
            groups.entry(key.round() as i64).or_default().push(row);
        }
    }
    Ok(groups)
}
