//! Numerical and cross-validation utilities.

pub mod cross_validation;
pub mod folds;
pub mod least_squares;

pub use cross_validation::{cross_val_predict, fold_splits, FoldSplit};
pub use folds::{assign_folds, FoldScheme};
pub use least_squares::{
    huber_regression, weighted_least_squares, HuberConfig, LinearFit, SolverOptions,
};
