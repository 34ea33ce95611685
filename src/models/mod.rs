//! Regression models.

mod traits;

pub mod grad_delta;
pub mod spline;
pub mod timeseries_model;
pub mod variance;

pub use grad_delta::{GradDelta, GradDeltaModel, Gradients, LinearMethod};
pub use spline::{SplineModel, SplineParams, SplineRegression, TermBasis};
pub use timeseries_model::{FittedParams, TimeseriesModel};
pub use traits::{BoxedModel, ByInstant, Estimator, FitStatus, RegressionModel};
pub use variance::ConditionalVarianceModel;
