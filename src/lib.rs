//! # corrclim
//!
//! Climatic correction of weather-sensitive time series.
//!
//! A regression model learns how a response (energy demand, production)
//! depends on weather and calendar covariates. The observed series is then
//! corrected to a target weather scenario by combining model predictions
//! under both scenarios through a correction [`Operator`], optionally
//! rescaled by conditional standard deviations estimated from
//! cross-validated residuals.

pub mod core;
pub mod corrector;
pub mod error;
pub mod models;
pub mod operator;
pub mod smoothing;
pub mod utils;

pub use error::{CorrectionError, Result};
pub use operator::Operator;

pub mod prelude {
    pub use crate::core::{
        CalendarDeriver, Formula, Granularity, TimeseriesFrame, CORRECTED_COLUMN,
        RESPONSE_COLUMN,
    };
    pub use crate::corrector::ClimaticCorrector;
    pub use crate::error::{CorrectionError, Result};
    pub use crate::models::{
        ByInstant, ConditionalVarianceModel, FitStatus, GradDeltaModel, RegressionModel,
        SplineModel,
    };
    pub use crate::operator::Operator;
    pub use crate::utils::FoldScheme;
}
