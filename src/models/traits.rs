//! RegressionModel trait defining the common interface for all models.

use crate::core::{Formula, Granularity, TimeseriesFrame};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FitStatus {
    #[default]
    Unfitted,
    Fitted,
}

/// Whether a model is fitted once globally or once per instant key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ByInstant {
    pub activate: bool,
    pub granularity: Granularity,
}

impl ByInstant {
    /// A single global fit.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// One fit per instant of `granularity`.
    pub fn per(granularity: Granularity) -> Self {
        Self {
            activate: true,
            granularity,
        }
    }

    /// Fails when grouping is active on a granularity without a cycle.
    pub fn validate(&self) -> Result<()> {
        if self.activate {
            self.granularity.validate_for_instants()?;
        }
        Ok(())
    }
}

/// Common interface for all regression models.
///
/// This trait is object-safe and can be used with `Box<dyn RegressionModel>`.
/// Implementations are `Send + Sync` so that independent instances can be
/// fitted on separate threads.
pub trait RegressionModel: Send + Sync + fmt::Debug {
    /// Fit on an outputs frame (response `y`) and an inputs frame of
    /// covariates, joined on time. Re-fitting replaces any previous state.
    fn fit(&mut self, outputs: &TimeseriesFrame, inputs: &TimeseriesFrame) -> Result<()>;

    /// One prediction per row of `inputs`, in row order.
    fn predict(&self, inputs: &TimeseriesFrame) -> Result<Vec<f64>>;

    /// `frame` extended with the covariates this model derives at fit time.
    ///
    /// Callers that fit on row subsets run this on the full frame first, so
    /// that lagged covariates are looked up among every row rather than the
    /// subset. Columns already present are kept, which makes the later
    /// derivation inside [`fit`](Self::fit) and [`predict`](Self::predict) a
    /// no-op for them.
    fn derive_covariates(&self, frame: &TimeseriesFrame) -> Result<TimeseriesFrame> {
        Ok(frame.clone())
    }

    fn status(&self) -> FitStatus;

    /// Check if the model has been fitted.
    fn is_fitted(&self) -> bool {
        self.status() == FitStatus::Fitted
    }

    fn formula(&self) -> &Formula;

    /// Get the model name.
    fn name(&self) -> &str;

    /// A new unfitted instance with the same configuration.
    fn unfitted_copy(&self) -> BoxedModel;

    /// Clone into a boxed trait object, fitted state included.
    fn box_clone(&self) -> BoxedModel;
}

/// Type alias for boxed model trait objects.
pub type BoxedModel = Box<dyn RegressionModel>;

impl Clone for BoxedModel {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Variant-specific fitting routine plugged into
/// [`TimeseriesModel`](crate::models::TimeseriesModel).
///
/// Estimators receive frames that already carry every required variable,
/// with non-finite training rows removed.
pub trait Estimator: Clone + Send + Sync + fmt::Debug + 'static {
    /// Fitted parameters for one group of rows.
    type Params: Clone + Send + Sync + fmt::Debug + 'static;

    fn name(&self) -> &str;

    /// Reject formulas this estimator cannot handle.
    fn validate(&self, formula: &Formula) -> Result<()> {
        let _ = formula;
        Ok(())
    }

    /// Columns needed at fit time besides the formula variables.
    fn fit_columns(&self) -> Vec<&str> {
        Vec::new()
    }

    fn fit_params(&self, formula: &Formula, frame: &TimeseriesFrame) -> Result<Self::Params>;

    /// One value per row of `frame`.
    fn predict_params(
        &self,
        params: &Self::Params,
        formula: &Formula,
        frame: &TimeseriesFrame,
    ) -> Result<Vec<f64>>;
}
