//! Exponentially weighted smoothing of covariates.
//!
//! Temperatures felt by a building lag the instantaneous reading, so demand
//! models often use an exponentially smoothed temperature instead.

use crate::core::TimeseriesFrame;
use crate::error::{CorrectionError, Result};
use crate::smoothing::Smoother;
use chrono::Timelike;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which rows feed each exponentially weighted average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmoothingScope {
    /// Consecutive rows in time order.
    #[default]
    Step,
    /// The same time of day on consecutive days.
    Daily,
}

/// Exponential smoother: `s[t] = alpha * x[t] + (1 - alpha) * s[t-1]`.
///
/// Smoothed columns replace the originals. A non-finite value leaves the
/// state unchanged and the previous smoothed value is emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExponentialSmoother {
    alpha: f64,
    scope: SmoothingScope,
    variables: Vec<String>,
    #[serde(skip)]
    fitted: bool,
}

impl ExponentialSmoother {
    /// Create a smoother. `alpha` must lie in `[0, 1]`.
    pub fn new(alpha: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(CorrectionError::Configuration(format!(
                "alpha must be between 0 and 1, got {}",
                alpha
            )));
        }
        Ok(Self {
            alpha,
            scope: SmoothingScope::Step,
            variables: Vec::new(),
            fitted: false,
        })
    }

    /// Add a column to smooth.
    pub fn on(mut self, variable: impl Into<String>) -> Self {
        self.variables.push(variable.into());
        self
    }

    pub fn with_scope(mut self, scope: SmoothingScope) -> Self {
        self.scope = scope;
        self
    }

    /// Same configuration with another `alpha`, unfitted.
    pub fn with_alpha(&self, alpha: f64) -> Result<Self> {
        let mut smoother = Self::new(alpha)?;
        smoother.scope = self.scope;
        smoother.variables = self.variables.clone();
        Ok(smoother)
    }

    pub fn scope(&self) -> SmoothingScope {
        self.scope
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Row indices grouped into the sequences each average runs along.
    fn sequences(&self, frame: &TimeseriesFrame) -> Vec<Vec<usize>> {
        let mut order: Vec<usize> = (0..frame.len()).collect();
        order.sort_by_key(|&i| frame.timestamps()[i]);
        match self.scope {
            SmoothingScope::Step => vec![order],
            SmoothingScope::Daily => {
                let mut by_time_of_day: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
                for i in order {
                    let key = frame.timestamps()[i].num_seconds_from_midnight();
                    by_time_of_day.entry(key).or_default().push(i);
                }
                by_time_of_day.into_values().collect()
            }
        }
    }
}

impl Smoother for ExponentialSmoother {
    fn fit(
        &mut self,
        frame: &TimeseriesFrame,
        _reference: Option<&TimeseriesFrame>,
    ) -> Result<()> {
        for variable in &self.variables {
            frame.column(variable)?;
        }
        self.fitted = true;
        Ok(())
    }

    fn smooth(&self, frame: &TimeseriesFrame) -> Result<TimeseriesFrame> {
        if !self.fitted {
            return Err(CorrectionError::NotFitted);
        }
        let sequences = self.sequences(frame);
        let mut smoothed = frame.clone();
        for variable in &self.variables {
            let values = frame.column(variable)?;
            let mut out = vec![f64::NAN; values.len()];
            for sequence in &sequences {
                let mut state: Option<f64> = None;
                for &i in sequence {
                    let x = values[i];
                    if x.is_finite() {
                        state = Some(match state {
                            Some(s) => self.alpha * x + (1.0 - self.alpha) * s,
                            None => x,
                        });
                    }
                    out[i] = state.unwrap_or(f64::NAN);
                }
            }
            smoothed.set_column(variable.as_str(), out)?;
        }
        Ok(smoothed)
    }

    fn is_fitted(&self) -> bool {
        self.fitted
    }

    fn name(&self) -> &str {
        "ExponentialSmoother"
    }

    fn box_clone(&self) -> Box<dyn Smoother> {
        Box::new(self.clone())
    }
}
