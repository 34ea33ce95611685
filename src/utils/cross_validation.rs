//! Out-of-fold predictions for k-fold cross-validation.

use crate::core::{TimeseriesFrame, RESPONSE_COLUMN};
use crate::error::{CorrectionError, Result};
use crate::models::RegressionModel;
use rayon::prelude::*;
use std::collections::HashMap;

/// One train/test split of a k-fold partition.
#[derive(Debug, Clone, PartialEq)]
pub struct FoldSplit {
    /// Fold value shared by every test row.
    pub fold: f64,
    /// Rows used for training (all other folds).
    pub train: Vec<usize>,
    /// Rows predicted by the model trained on `train`.
    pub test: Vec<usize>,
}

/// Build one split per distinct fold value, in order of first appearance.
///
/// Rows whose fold value is not finite belong to no split.
pub fn fold_splits(folds: &[f64]) -> Vec<FoldSplit> {
    let mut order: Vec<u64> = Vec::new();
    let mut members: HashMap<u64, Vec<usize>> = HashMap::new();
    for (row, &fold) in folds.iter().enumerate() {
        if !fold.is_finite() {
            continue;
        }
        // normalise -0.0
        let key = (fold + 0.0).to_bits();
        members
            .entry(key)
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(row);
    }

    order
        .iter()
        .map(|key| {
            let fold = f64::from_bits(*key);
            let test = members[key].clone();
            let train = (0..folds.len())
                .filter(|&row| folds[row].is_finite() && folds[row] != fold)
                .collect();
            FoldSplit { fold, train, test }
        })
        .collect()
}

/// Out-of-fold predictions of `model` over `frame`.
///
/// `frame` carries the response `y`, the covariates and the `fold_varname`
/// column. For every distinct fold value a scratch copy of `model` is trained
/// on the other folds and predicts the held-out rows. Folds are processed in
/// parallel. Predictions come back in the original row order; rows without a
/// finite fold value get NaN.
///
/// Covariates are derived once on the whole of `frame` through
/// [`RegressionModel::derive_covariates`] before any split is taken, so a
/// lagged covariate keeps its value whichever fold holds the earlier row.
///
/// When `model` fits per instant, every instant key of a test fold must also
/// occur in its training folds; otherwise that fold fails with
/// `UnknownInstant`, which is logged with the fold value and aborts the whole
/// call. Contiguous folds over a single year at monthly granularity hit this.
///
/// `model` itself is never fitted.
pub fn cross_val_predict(
    model: &dyn RegressionModel,
    frame: &TimeseriesFrame,
    fold_varname: &str,
) -> Result<Vec<f64>> {
    let folds = frame
        .get_column(fold_varname)
        .ok_or_else(|| CorrectionError::MissingFoldVariable(fold_varname.to_string()))?;
    let splits = fold_splits(folds);
    if splits.len() < 2 {
        return Err(CorrectionError::InsufficientData {
            needed: 2,
            got: splits.len(),
        });
    }
    tracing::info!(folds = splits.len(), model = model.name(), "cross-validated predictions");

    let derived = model.derive_covariates(frame)?;
    let outputs = derived.select(&[RESPONSE_COLUMN])?;
    let inputs = derived.without(&[RESPONSE_COLUMN]);

    let per_fold = splits
        .par_iter()
        .map(|split| {
            let mut scratch = model.unfitted_copy();
            scratch
                .fit(&outputs.take(&split.train), &inputs.take(&split.train))
                .and_then(|_| scratch.predict(&inputs.take(&split.test)))
                .map_err(|err| {
                    tracing::warn!(fold = split.fold, error = %err, "fold failed");
                    err
                })
                .map(|predictions| {
                    tracing::debug!(fold = split.fold, rows = split.test.len(), "fold predicted");
                    predictions
                })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut predictions = vec![f64::NAN; frame.len()];
    for (split, fold_predictions) in splits.iter().zip(per_fold) {
        if fold_predictions.len() != split.test.len() {
            return Err(CorrectionError::DimensionMismatch {
                expected: split.test.len(),
                got: fold_predictions.len(),
            });
        }
        for (&row, value) in split.test.iter().zip(fold_predictions) {
            predictions[row] = value;
        }
    }
    Ok(predictions)
}
