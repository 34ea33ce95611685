//! Linear least squares solvers used by the regression variants.
//!
//! Normal equations are solved with a Cholesky decomposition. Ridge
//! penalties apply to slopes only, never to the intercept.

use crate::error::{CorrectionError, Result};

/// Coefficients of a fitted linear model.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearFit {
    /// Intercept term (0 when fitted without one).
    pub intercept: f64,
    /// One slope per design column, in column order.
    pub coefficients: Vec<f64>,
}

impl LinearFit {
    /// Prediction for a single observation.
    pub fn predict_row(&self, x: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(x)
                .map(|(b, xi)| b * xi)
                .sum::<f64>()
    }

    /// Predictions for column-major design data.
    pub fn predict(&self, columns: &[&[f64]]) -> Result<Vec<f64>> {
        if columns.len() != self.coefficients.len() {
            return Err(CorrectionError::DimensionMismatch {
                expected: self.coefficients.len(),
                got: columns.len(),
            });
        }
        let n = columns.first().map_or(0, |c| c.len());
        let mut predictions = vec![self.intercept; n];
        for (coef, column) in self.coefficients.iter().zip(columns) {
            if column.len() != n {
                return Err(CorrectionError::DimensionMismatch {
                    expected: n,
                    got: column.len(),
                });
            }
            for (pred, x) in predictions.iter_mut().zip(column.iter()) {
                *pred += coef * x;
            }
        }
        Ok(predictions)
    }
}

/// Settings shared by the solvers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverOptions {
    /// Fit an intercept column.
    pub intercept: bool,
    /// L2 penalty on slopes.
    pub ridge: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            intercept: true,
            ridge: 0.0,
        }
    }
}

/// Weighted (optionally ridge-penalised) least squares.
///
/// # Arguments
/// * `y` - Target values (length n)
/// * `columns` - Design columns, each of length n
/// * `weights` - Optional non-negative observation weights
/// * `options` - Intercept and ridge settings
pub fn weighted_least_squares(
    y: &[f64],
    columns: &[&[f64]],
    weights: Option<&[f64]>,
    options: SolverOptions,
) -> Result<LinearFit> {
    let n = y.len();
    if n == 0 {
        return Err(CorrectionError::EmptyData);
    }
    for column in columns {
        if column.len() != n {
            return Err(CorrectionError::DimensionMismatch {
                expected: n,
                got: column.len(),
            });
        }
    }
    if let Some(w) = weights {
        if w.len() != n {
            return Err(CorrectionError::DimensionMismatch {
                expected: n,
                got: w.len(),
            });
        }
    }

    let offset = usize::from(options.intercept);
    let num_params = columns.len() + offset;
    if num_params == 0 {
        return Ok(LinearFit {
            intercept: 0.0,
            coefficients: Vec::new(),
        });
    }

    // Build X'WX and X'Wy
    let mut xtx = vec![vec![0.0; num_params]; num_params];
    let mut xty = vec![0.0; num_params];
    let mut row = vec![0.0; num_params];

    for obs in 0..n {
        let w = weights.map_or(1.0, |w| w[obs]);
        if w == 0.0 {
            continue;
        }
        if options.intercept {
            row[0] = 1.0;
        }
        for (j, column) in columns.iter().enumerate() {
            row[j + offset] = column[obs];
        }
        for i in 0..num_params {
            let wxi = w * row[i];
            xty[i] += wxi * y[obs];
            for j in 0..num_params {
                xtx[i][j] += wxi * row[j];
            }
        }
    }

    for i in 0..num_params {
        // Small jitter for numerical stability
        xtx[i][i] += 1e-8;
        if i >= offset {
            xtx[i][i] += options.ridge;
        }
    }

    let beta = solve_symmetric(&xtx, &xty).ok_or_else(|| {
        CorrectionError::ComputationError(
            "least squares failed: matrix not positive definite".into(),
        )
    })?;

    Ok(LinearFit {
        intercept: if options.intercept { beta[0] } else { 0.0 },
        coefficients: beta[offset..].to_vec(),
    })
}

/// Configuration for Huber M-estimation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HuberConfig {
    /// Tuning constant in units of the residual scale.
    pub k: f64,
    pub max_iterations: usize,
    /// Stop once no coefficient moves more than this.
    pub tolerance: f64,
}

impl Default for HuberConfig {
    fn default() -> Self {
        Self {
            k: 1.345,
            max_iterations: 50,
            tolerance: 1e-8,
        }
    }
}

/// Robust linear regression with Huber weights (IRLS).
///
/// The residual scale is re-estimated at each iteration from the median
/// absolute deviation.
pub fn huber_regression(
    y: &[f64],
    columns: &[&[f64]],
    weights: Option<&[f64]>,
    options: SolverOptions,
    config: HuberConfig,
) -> Result<LinearFit> {
    let base_weights: Vec<f64> = match weights {
        Some(w) => w.to_vec(),
        None => vec![1.0; y.len()],
    };
    let mut fit = weighted_least_squares(y, columns, Some(&base_weights), options)?;

    for _ in 0..config.max_iterations {
        let residuals: Vec<f64> = (0..y.len())
            .map(|i| {
                let x: Vec<f64> = columns.iter().map(|c| c[i]).collect();
                y[i] - fit.predict_row(&x)
            })
            .collect();
        let scale = mad(&residuals) / 0.6745;
        if scale <= 1e-12 {
            break;
        }

        let irls_weights: Vec<f64> = residuals
            .iter()
            .zip(&base_weights)
            .map(|(r, w)| {
                let u = (r / scale).abs();
                if u <= config.k {
                    *w
                } else {
                    w * config.k / u
                }
            })
            .collect();

        let next = weighted_least_squares(y, columns, Some(&irls_weights), options)?;
        let shift = next
            .coefficients
            .iter()
            .zip(&fit.coefficients)
            .map(|(a, b)| (a - b).abs())
            .chain(std::iter::once((next.intercept - fit.intercept).abs()))
            .fold(0.0, f64::max);
        fit = next;
        if shift < config.tolerance {
            break;
        }
    }

    Ok(fit)
}

/// Median absolute deviation around the median.
fn mad(values: &[f64]) -> f64 {
    let med = median(values);
    let deviations: Vec<f64> = values.iter().map(|v| (v - med).abs()).collect();
    median(&deviations)
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

/// Solve symmetric positive definite system using Cholesky decomposition.
///
/// Solves A @ x = b where A is symmetric positive definite.
fn solve_symmetric(a: &[Vec<f64>], b: &[f64]) -> Option<Vec<f64>> {
    let n = b.len();
    if n == 0 || a.len() != n {
        return None;
    }

    // A = L @ L'
    let mut l = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[i][j];
            for k in 0..j {
                sum -= l[i][k] * l[j][k];
            }
            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return None;
                }
                l[i][j] = sum.sqrt();
            } else {
                l[i][j] = sum / l[j][j];
            }
        }
    }

    // L @ z = b
    let mut z = vec![0.0; n];
    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[i][j] * z[j];
        }
        z[i] = sum / l[i][i];
    }

    // L' @ x = z
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = z[i];
        for j in (i + 1)..n {
            sum -= l[j][i] * x[j];
        }
        x[i] = sum / l[i][i];
    }

    Some(x)
}
