//! Correction operators: how predictions under two weather scenarios turn an
//! observed series into its climate-corrected counterpart.

use crate::core::{TimeseriesFrame, CORRECTED_COLUMN, RESPONSE_COLUMN};
use crate::error::{CorrectionError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Correction rule.
///
/// With `y` the observed response, `p_obs` / `p_tgt` the predictions under the
/// observed and target weather, and `s_obs` / `s_tgt` the matching
/// conditional standard deviations:
///
/// | Operator | Corrected value |
/// |---|---|
/// | `Target` | `p_tgt` |
/// | `Additive` | `y + (p_tgt - p_obs)` |
/// | `Multiplicative` | `y * (p_tgt / p_obs)` |
/// | `TwoMoment` | `p_tgt + (s_tgt / s_obs) * (y - p_obs)` |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Target,
    #[default]
    Additive,
    /// No guard on `p_obs == 0`: the result follows IEEE arithmetic.
    Multiplicative,
    /// Rescales the anomaly `y - p_obs` by the ratio of conditional standard
    /// deviations. A standard deviation of exactly zero is replaced by 1,
    /// element-wise, before the ratio is taken.
    TwoMoment,
}

impl Operator {
    /// Whether the operator consumes conditional standard deviations.
    pub fn requires_moments(&self) -> bool {
        matches!(self, Operator::TwoMoment)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operator::Target => "target",
            Operator::Additive => "additive",
            Operator::Multiplicative => "multiplicative",
            Operator::TwoMoment => "two_moment",
        }
    }

    /// Corrected values from plain vectors.
    pub fn correct(
        &self,
        observed: &[f64],
        pred_observed: &[f64],
        pred_target: &[f64],
        std_observed: Option<&[f64]>,
        std_target: Option<&[f64]>,
    ) -> Result<Vec<f64>> {
        let n = observed.len();
        check_len(n, pred_observed)?;
        check_len(n, pred_target)?;

        let corrected = match self {
            Operator::Target => pred_target.to_vec(),
            Operator::Additive => (0..n)
                .map(|i| observed[i] + (pred_target[i] - pred_observed[i]))
                .collect(),
            Operator::Multiplicative => (0..n)
                .map(|i| observed[i] * (pred_target[i] / pred_observed[i]))
                .collect(),
            Operator::TwoMoment => {
                let (std_observed, std_target) = match (std_observed, std_target) {
                    (Some(o), Some(t)) => (o, t),
                    _ => {
                        return Err(CorrectionError::Configuration(
                            "two-moment correction needs standard deviations for both scenarios"
                                .to_string(),
                        ))
                    }
                };
                check_len(n, std_observed)?;
                check_len(n, std_target)?;
                (0..n)
                    .map(|i| {
                        let ratio = nonzero(std_target[i]) / nonzero(std_observed[i]);
                        pred_target[i] + ratio * (observed[i] - pred_observed[i])
                    })
                    .collect()
            }
        };
        Ok(corrected)
    }

    /// Corrected frame: `observed` with every column kept and
    /// `y_climate_corrected` added.
    pub fn apply(
        &self,
        observed: &TimeseriesFrame,
        pred_observed: &[f64],
        pred_target: &[f64],
        std_observed: Option<&[f64]>,
        std_target: Option<&[f64]>,
    ) -> Result<TimeseriesFrame> {
        let corrected = self.correct(
            observed.column(RESPONSE_COLUMN)?,
            pred_observed,
            pred_target,
            std_observed,
            std_target,
        )?;
        observed.clone().with_column(CORRECTED_COLUMN, corrected)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn check_len(expected: usize, values: &[f64]) -> Result<()> {
    if values.len() != expected {
        return Err(CorrectionError::DimensionMismatch {
            expected,
            got: values.len(),
        });
    }
    Ok(())
}

fn nonzero(std: f64) -> f64 {
    if std == 0.0 {
        1.0
    } else {
        std
    }
}
