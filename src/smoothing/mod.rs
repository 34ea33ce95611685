//! Smoothing filters applied to covariates before fitting and prediction.

mod exponential;
mod grid_search;

pub use exponential::{ExponentialSmoother, SmoothingScope};
pub use grid_search::{mean_squared_error, GridSearchSmoother, ScoreFn};

use crate::core::TimeseriesFrame;
use crate::error::Result;
use std::fmt;

/// A filter that is fitted once and then applied to frames.
pub trait Smoother: Send + Sync + fmt::Debug {
    /// Fit the smoother on a training frame.
    ///
    /// `reference`, when given, carries the values the smoothed columns
    /// should approach, under the same column names. Smoothers that tune
    /// their parameters score candidates against it; the others ignore it.
    fn fit(
        &mut self,
        frame: &TimeseriesFrame,
        reference: Option<&TimeseriesFrame>,
    ) -> Result<()>;

    /// Apply the smoother. Fails with `NotFitted` before [`fit`](Self::fit).
    fn smooth(&self, frame: &TimeseriesFrame) -> Result<TimeseriesFrame>;

    /// Fit then apply on the same frame.
    fn fit_smooth(
        &mut self,
        frame: &TimeseriesFrame,
        reference: Option<&TimeseriesFrame>,
    ) -> Result<TimeseriesFrame> {
        self.fit(frame, reference)?;
        self.smooth(frame)
    }

    fn is_fitted(&self) -> bool;

    fn name(&self) -> &str;

    /// Clone into a boxed trait object.
    fn box_clone(&self) -> Box<dyn Smoother>;
}

impl Clone for Box<dyn Smoother> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Applies several smoothers in sequence.
#[derive(Debug, Clone, Default)]
pub struct MultiSmoother {
    smoothers: Vec<Box<dyn Smoother>>,
}

impl MultiSmoother {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a smoother; it runs after the ones already added.
    pub fn with(mut self, smoother: impl Smoother + 'static) -> Self {
        self.smoothers.push(Box::new(smoother));
        self
    }

    pub fn smoothers(&self) -> &[Box<dyn Smoother>] {
        &self.smoothers
    }

    pub fn len(&self) -> usize {
        self.smoothers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.smoothers.is_empty()
    }
}

impl Smoother for MultiSmoother {
    fn fit(
        &mut self,
        frame: &TimeseriesFrame,
        reference: Option<&TimeseriesFrame>,
    ) -> Result<()> {
        let mut current = frame.clone();
        for smoother in &mut self.smoothers {
            tracing::debug!(smoother = smoother.name(), "fitting smoother");
            current = smoother.fit_smooth(&current, reference)?;
        }
        Ok(())
    }

    fn smooth(&self, frame: &TimeseriesFrame) -> Result<TimeseriesFrame> {
        let mut current = frame.clone();
        for smoother in &self.smoothers {
            current = smoother.smooth(&current)?;
        }
        Ok(current)
    }

    fn is_fitted(&self) -> bool {
        self.smoothers.iter().all(|s| s.is_fitted())
    }

    fn name(&self) -> &str {
        "MultiSmoother"
    }

    fn box_clone(&self) -> Box<dyn Smoother> {
        Box::new(self.clone())
    }
}
