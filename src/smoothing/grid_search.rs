//! Smoothing parameter selection by exhaustive search over `alpha`.

use crate::core::TimeseriesFrame;
use crate::error::{CorrectionError, Result};
use crate::smoothing::{ExponentialSmoother, Smoother};
use std::fmt;

/// Scores smoothed values against reference values; lower is better.
pub type ScoreFn = fn(&[f64], &[f64]) -> f64;

/// Mean squared error over the pairs where both values are finite.
///
/// `NaN` when no such pair exists.
pub fn mean_squared_error(smoothed: &[f64], reference: &[f64]) -> f64 {
    let (sum, count) = smoothed
        .iter()
        .zip(reference)
        .filter(|(s, r)| s.is_finite() && r.is_finite())
        .fold((0.0, 0usize), |(sum, count), (s, r)| {
            (sum + (s - r).powi(2), count + 1)
        });
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Exponential smoother whose `alpha` is picked from a grid.
///
/// Each candidate smooths the training frame and is scored against the
/// reference frame given to [`fit`](Smoother::fit), column by column under
/// the smoothed variable names. The lowest finite score wins, ties keep the
/// earlier candidate, and [`smooth`](Smoother::smooth) delegates to the
/// winner.
///
/// # Example
/// ```
/// use corrclim::core::TimeseriesFrame;
/// use corrclim::smoothing::{ExponentialSmoother, GridSearchSmoother, Smoother};
/// use chrono::{Duration, TimeZone, Utc};
///
/// let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
/// let timestamps: Vec<_> = (0..6).map(|i| base + Duration::hours(i)).collect();
/// let raw = TimeseriesFrame::new(timestamps)
///     .with_column("temperature", vec![0.0, 8.0, 2.0, 9.0, 1.0, 7.0])
///     .unwrap();
///
/// let template = ExponentialSmoother::new(0.5).unwrap().on("temperature");
/// let mut grid = GridSearchSmoother::new(template, vec![0.2, 1.0]).unwrap();
/// grid.fit(&raw, Some(&raw)).unwrap();
/// assert_eq!(grid.best_alpha(), Some(1.0));
/// ```
#[derive(Clone)]
pub struct GridSearchSmoother {
    template: ExponentialSmoother,
    alphas: Vec<f64>,
    score: ScoreFn,
    best: Option<(ExponentialSmoother, f64)>,
}

impl GridSearchSmoother {
    /// Search `alphas`, each applied to a copy of `template`.
    pub fn new(template: ExponentialSmoother, alphas: Vec<f64>) -> Result<Self> {
        if alphas.is_empty() {
            return Err(CorrectionError::Configuration(
                "the alpha grid is empty".to_string(),
            ));
        }
        for &alpha in &alphas {
            template.with_alpha(alpha)?;
        }
        Ok(Self {
            template,
            alphas,
            score: mean_squared_error,
            best: None,
        })
    }

    /// `steps + 1` evenly spaced alphas from `low` to `high`.
    pub fn linspace(
        template: ExponentialSmoother,
        low: f64,
        high: f64,
        steps: usize,
    ) -> Result<Self> {
        if steps == 0 {
            return Err(CorrectionError::Configuration(
                "a grid needs at least one step".to_string(),
            ));
        }
        let alphas = (0..=steps)
            .map(|i| low + (high - low) * (i as f64 / steps as f64))
            .collect();
        Self::new(template, alphas)
    }

    /// Replace the default mean squared error.
    pub fn with_score(mut self, score: ScoreFn) -> Self {
        self.score = score;
        self
    }

    pub fn alphas(&self) -> &[f64] {
        &self.alphas
    }

    /// Selected `alpha`, once fitted.
    pub fn best_alpha(&self) -> Option<f64> {
        self.best.as_ref().map(|(smoother, _)| smoother.alpha())
    }

    pub fn best_score(&self) -> Option<f64> {
        self.best.as_ref().map(|(_, score)| *score)
    }

    fn evaluate(
        &self,
        candidate: &mut ExponentialSmoother,
        frame: &TimeseriesFrame,
        reference: &TimeseriesFrame,
    ) -> Result<f64> {
        let smoothed = candidate.fit_smooth(frame, None)?;
        let (smoothed, aligned) = smoothed.align(&[reference])?;
        let reference = &aligned[0];
        let mut predicted = Vec::new();
        let mut observed = Vec::new();
        for variable in candidate.variables() {
            predicted.extend_from_slice(smoothed.column(variable)?);
            observed.extend_from_slice(reference.column(variable)?);
        }
        Ok((self.score)(&predicted, &observed))
    }
}

impl Smoother for GridSearchSmoother {
    fn fit(
        &mut self,
        frame: &TimeseriesFrame,
        reference: Option<&TimeseriesFrame>,
    ) -> Result<()> {
        self.best = None;
        let reference = reference.ok_or_else(|| {
            CorrectionError::Configuration(
                "grid search needs a reference frame to score candidates".to_string(),
            )
        })?;

        let mut best: Option<(ExponentialSmoother, f64)> = None;
        for &alpha in &self.alphas {
            let mut candidate = self.template.with_alpha(alpha)?;
            let score = self.evaluate(&mut candidate, frame, reference)?;
            tracing::debug!(alpha, score, "smoothing candidate scored");
            if !score.is_finite() {
                continue;
            }
            if best.as_ref().map_or(true, |(_, b)| score < *b) {
                best = Some((candidate, score));
            }
        }

        let (smoother, score) = best.ok_or_else(|| {
            CorrectionError::ComputationError(
                "no smoothing candidate produced a finite score".to_string(),
            )
        })?;
        tracing::info!(alpha = smoother.alpha(), score, "smoothing parameter selected");
        self.best = Some((smoother, score));
        Ok(())
    }

    fn smooth(&self, frame: &TimeseriesFrame) -> Result<TimeseriesFrame> {
        match &self.best {
            Some((smoother, _)) => smoother.smooth(frame),
            None => Err(CorrectionError::NotFitted),
        }
    }

    fn is_fitted(&self) -> bool {
        self.best.is_some()
    }

    fn name(&self) -> &str {
        "GridSearchSmoother"
    }

    fn box_clone(&self) -> Box<dyn Smoother> {
        Box::new(self.clone())
    }
}

impl fmt::Debug for GridSearchSmoother {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GridSearchSmoother")
            .field("template", &self.template)
            .field("alphas", &self.alphas)
            .field("best_alpha", &self.best_alpha())
            .finish_non_exhaustive()
    }
}
