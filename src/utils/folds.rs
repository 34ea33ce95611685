//! Fold assignment for cross-validated fitting.

use crate::core::TimeseriesFrame;
use crate::error::{CorrectionError, Result};
use chrono::Datelike;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// How rows are partitioned into folds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum FoldScheme {
    /// `k` blocks of consecutive timestamps.
    Contiguous { k: usize },
    /// `k` folds of randomly assigned rows, reproducible through `seed`.
    Shuffled { k: usize, seed: u64 },
    /// One fold per calendar year.
    Yearly,
}

impl Default for FoldScheme {
    fn default() -> Self {
        Self::Contiguous { k: 5 }
    }
}

/// Fold value for every row of `frame`, in row order.
pub fn assign_folds(frame: &TimeseriesFrame, scheme: FoldScheme) -> Result<Vec<f64>> {
    let n = frame.len();
    if n == 0 {
        return Err(CorrectionError::EmptyData);
    }
    match scheme {
        FoldScheme::Contiguous { k } => {
            check_k(k, n)?;
            let mut order: Vec<usize> = (0..n).collect();
            order.sort_by_key(|&i| frame.timestamps()[i]);
            let mut folds = vec![0.0; n];
            for (rank, row) in order.into_iter().enumerate() {
                folds[row] = (rank * k / n) as f64;
            }
            Ok(folds)
        }
        FoldScheme::Shuffled { k, seed } => {
            check_k(k, n)?;
            let mut rng = StdRng::seed_from_u64(seed);
            let mut order: Vec<usize> = (0..n).collect();
            order.shuffle(&mut rng);
            let mut folds = vec![0.0; n];
            for (position, row) in order.into_iter().enumerate() {
                folds[row] = (position % k) as f64;
            }
            Ok(folds)
        }
        FoldScheme::Yearly => Ok(frame.timestamps().iter().map(|t| t.year() as f64).collect()),
    }
}

fn check_k(k: usize, n: usize) -> Result<()> {
    if k < 2 {
        return Err(CorrectionError::Configuration(format!(
            "cross-validation needs at least 2 folds, got {}",
            k
        )));
    }
    if k > n {
        return Err(CorrectionError::InsufficientData { needed: k, got: n });
    }
    Ok(())
}

impl TimeseriesFrame {
    /// Add a fold column named `name` following `scheme`.
    pub fn with_fold_column(self, name: &str, scheme: FoldScheme) -> Result<Self> {
        let folds = assign_folds(&self, scheme)?;
        self.with_column(name, folds)
    }
}
