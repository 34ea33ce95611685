//! Outlier filtering on the quantile range of a lagged response.

use crate::core::formula::SHIFTED_SUFFIX;
use crate::core::frame::TimeseriesFrame;
use crate::error::{CorrectionError, Result};
use serde::{Deserialize, Serialize};

/// Which side of the threshold rows must lie on to be kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdSide {
    /// `variable <= threshold` and `variable - variable_shifted <= threshold`.
    #[default]
    Below,
    /// `variable >= threshold` and `variable - variable_shifted >= threshold`.
    Above,
}

/// Row filter selecting a weather regime, then discarding response outliers.
///
/// Rows are first restricted to those where `response` and `variable` are
/// finite and `variable` sits on the configured side of `threshold`, both
/// in level and in change since the lagged value. Among them, with `lo` and
/// `hi` the `q_min` / `q_max` quantiles of `response`, only rows strictly
/// inside `(lo - w, hi + w)` survive, where `w = range_width * (hi - lo)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierFilter {
    response: String,
    variable: String,
    variable_shifted: String,
    threshold: f64,
    #[serde(default)]
    side: ThresholdSide,
    q_min: f64,
    q_max: f64,
    range_width: f64,
}

impl OutlierFilter {
    /// Filter on `response` within the regime `variable <= threshold`.
    ///
    /// The lagged variable defaults to `<variable>_shifted`; quantiles to 0.2
    /// and 0.8 with a range width of 1.5.
    pub fn new(response: impl Into<String>, variable: impl Into<String>, threshold: f64) -> Self {
        let variable = variable.into();
        Self {
            response: response.into(),
            variable_shifted: format!("{}{}", variable, SHIFTED_SUFFIX),
            variable,
            threshold,
            side: ThresholdSide::Below,
            q_min: 0.2,
            q_max: 0.8,
            range_width: 1.5,
        }
    }

    pub fn with_side(mut self, side: ThresholdSide) -> Self {
        self.side = side;
        self
    }

    pub fn with_variable_shifted(mut self, name: impl Into<String>) -> Self {
        self.variable_shifted = name.into();
        self
    }

    /// Quantiles bounding the central range. Requires
    /// `0 <= q_min <= q_max <= 1`.
    pub fn with_quantiles(mut self, q_min: f64, q_max: f64) -> Result<Self> {
        if !(0.0 <= q_min && q_min <= q_max && q_max <= 1.0) {
            return Err(CorrectionError::Configuration(format!(
                "quantiles must satisfy 0 <= q_min <= q_max <= 1, got {} and {}",
                q_min, q_max
            )));
        }
        self.q_min = q_min;
        self.q_max = q_max;
        Ok(self)
    }

    /// Widening of the central range, as a multiple of its width.
    pub fn with_range_width(mut self, range_width: f64) -> Result<Self> {
        if !(range_width.is_finite() && range_width >= 0.0) {
            return Err(CorrectionError::Configuration(format!(
                "range width must be non-negative, got {}",
                range_width
            )));
        }
        self.range_width = range_width;
        Ok(self)
    }

    fn in_regime(&self, value: f64, change: f64) -> bool {
        match self.side {
            ThresholdSide::Below => value <= self.threshold && change <= self.threshold,
            ThresholdSide::Above => value >= self.threshold && change >= self.threshold,
        }
    }
}

impl TimeseriesFrame {
    /// Rows kept by `filter`, in their original order.
    pub fn filter_outliers(&self, filter: &OutlierFilter) -> Result<Self> {
        let response = self.column(&filter.response)?;
        let variable = self.column(&filter.variable)?;
        let shifted = self.column(&filter.variable_shifted)?;

        let regime: Vec<usize> = (0..self.len())
            .filter(|&i| {
                response[i].is_finite()
                    && variable[i].is_finite()
                    && filter.in_regime(variable[i], variable[i] - shifted[i])
            })
            .collect();
        if regime.is_empty() {
            tracing::warn!(variable = %filter.variable, "no row in the filtered regime");
            return Ok(self.take(&regime));
        }

        let mut sorted: Vec<f64> = regime.iter().map(|&i| response[i]).collect();
        sorted.sort_by(f64::total_cmp);
        let lo = quantile_sorted(&sorted, filter.q_min);
        let hi = quantile_sorted(&sorted, filter.q_max);
        let margin = filter.range_width * (hi - lo);

        let kept: Vec<usize> = regime
            .into_iter()
            .filter(|&i| response[i] > lo - margin && response[i] < hi + margin)
            .collect();
        tracing::debug!(kept = kept.len(), rows = self.len(), "outlier filter applied");
        Ok(self.take(&kept))
    }
}

/// Linear-interpolated quantile of sorted, non-empty data.
pub(crate) fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}
