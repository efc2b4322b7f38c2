// =============================================================================
// IRLS for the binomial family with logit link
// =============================================================================
//
// Each iteration linearizes the log-likelihood around the current fit:
//
//     μ = 1 / (1 + e^(-η))        fitted probabilities
//     W = μ (1 - μ)               working weights
//     z = η + (y - μ) / W         working response
//
// and solves the weighted least squares problem (X'WX) β = X'Wz.
// Iteration stops when the deviance settles:
//
//     |D_new - D_old| / (|D_new| + 0.1) < tolerance
//
// At convergence (X'WX)⁻¹ is the covariance of β̂ (dispersion is fixed at 1).
//
// =============================================================================

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use ndarray::{Array1, Array2, Axis};
use tracing::{debug, warn};

use crate::model::error::{ModelError, Result};

/// Keeps fitted probabilities away from 0 and 1 so logs stay finite.
const MU_EPSILON: f64 = 1e-10;

/// Smallest acceptable squared Cholesky pivot relative to its diagonal entry.
const PIVOT_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Clone)]
pub struct IrlsConfig {
    /// Maximum number of iterations before giving up.
    pub max_iterations: usize,

    /// Convergence tolerance on the relative deviance change.
    pub tolerance: f64,

    /// Floor for working weights; fitted values near 0 or 1 otherwise make
    /// X'WX numerically singular.
    pub min_weight: f64,
}

impl Default for IrlsConfig {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            tolerance: 1e-8,
            min_weight: 1e-10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogisticFit {
    /// Fitted coefficients β, in design-matrix column order.
    pub coefficients: Array1<f64>,

    /// Fitted probabilities μ = logistic(Xβ).
    pub fitted_values: Array1<f64>,

    /// Linear predictor η = Xβ.
    pub linear_predictor: Array1<f64>,

    /// Residual deviance, −2 × log-likelihood for a 0/1 response.
    pub deviance: f64,

    pub iterations: usize,
    pub converged: bool,

    /// (X'WX)⁻¹ at the final fit.
    pub covariance: Array2<f64>,
}

/// Fits a logistic regression of a 0/1 response `y` on design matrix `x`.
///
/// `x` should already contain an intercept column if one is wanted.
///
/// # Errors
///
/// Returns an error on empty or mismatched input, a response outside {0, 1},
/// or a singular X'WX (usually perfectly collinear columns).
pub fn fit_logistic(y: &Array1<f64>, x: &Array2<f64>, config: &IrlsConfig) -> Result<LogisticFit> {
    let n = y.len();
    let p = x.ncols();

    if x.nrows() != n {
        return Err(ModelError::DimensionMismatch(format!(
            "X has {} rows but y has {} elements",
            x.nrows(),
            n
        )));
    }
    if n == 0 {
        return Err(ModelError::EmptyInput("y is empty".to_string()));
    }
    if p == 0 {
        return Err(ModelError::EmptyInput("X has no columns".to_string()));
    }
    if config.max_iterations == 0 {
        return Err(ModelError::InvalidValue("max_iterations must be at least 1".to_string()));
    }
    if y.iter().any(|&yi| yi != 0.0 && yi != 1.0) {
        return Err(ModelError::InvalidValue("response must be 0 or 1".to_string()));
    }

    // Start halfway between the observations and 1/2, as glm() does.
    let mut mu: Array1<f64> = y.mapv(|yi| (yi + 0.5) / 2.0);
    let mut eta: Array1<f64> = mu.mapv(logit);
    let mut deviance = binomial_deviance(y, &mu);
    let mut coefficients = Array1::zeros(p);

    let mut converged = false;
    let mut iterations = 0;

    while iterations < config.max_iterations {
        iterations += 1;

        let weights = working_weights(&mu, config.min_weight);
        let working_response: Array1<f64> = eta
            .iter()
            .zip(y.iter())
            .zip(mu.iter())
            .zip(weights.iter())
            .map(|(((&e, &yi), &mui), &w)| e + (yi - mui) / w)
            .collect();

        coefficients = solve_weighted_least_squares(x, &working_response, &weights)?;
        eta = x.dot(&coefficients);
        mu = eta.mapv(logistic);

        let deviance_old = deviance;
        deviance = binomial_deviance(y, &mu);
        let rel_change = (deviance - deviance_old).abs() / (deviance.abs() + 0.1);

        debug!(iteration = iterations, deviance, rel_change, "IRLS step");

        if rel_change < config.tolerance {
            converged = true;
            break;
        }
    }

    if !converged {
        warn!(iterations, deviance, "IRLS did not converge; estimates may be unreliable");
    }

    let covariance = invert_xtwx(x, &working_weights(&mu, config.min_weight))?;

    Ok(LogisticFit {
        coefficients,
        fitted_values: mu,
        linear_predictor: eta,
        deviance,
        iterations,
        converged,
        covariance,
    })
}

/// Inverse logit, clamped to the open unit interval.
pub fn logistic(eta: f64) -> f64 {
    (1.0 / (1.0 + (-eta).exp())).clamp(MU_EPSILON, 1.0 - MU_EPSILON)
}

pub fn logit(mu: f64) -> f64 {
    (mu / (1.0 - mu)).ln()
}

/// Binomial deviance for a 0/1 response: −2 Σ [y ln μ + (1 − y) ln(1 − μ)].
pub fn binomial_deviance(y: &Array1<f64>, mu: &Array1<f64>) -> f64 {
    -2.0 * y
        .iter()
        .zip(mu.iter())
        .map(|(&yi, &mui)| {
            let mui = mui.clamp(MU_EPSILON, 1.0 - MU_EPSILON);
            yi * mui.ln() + (1.0 - yi) * (1.0 - mui).ln()
        })
        .sum::<f64>()
}

fn working_weights(mu: &Array1<f64>, min_weight: f64) -> Array1<f64> {
    mu.mapv(|m| (m * (1.0 - m)).max(min_weight))
}

/// W^½X: each row of `x` scaled by the square root of its weight.
fn weight_rows(x: &Array2<f64>, w: &Array1<f64>) -> Array2<f64> {
    let sqrt_w = w.mapv(f64::sqrt);
    x * &sqrt_w.view().insert_axis(Axis(1))
}

fn to_dmatrix(a: &Array2<f64>) -> DMatrix<f64> {
    let (rows, cols) = a.dim();
    DMatrix::from_fn(rows, cols, |i, j| a[[i, j]])
}

fn from_dmatrix(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

/// Cholesky factor of X'WX, rejecting near-zero pivots.
///
/// Pivot `i` squared over `a_ii` is the share of column `i` not explained by
/// the columns before it, so the check does not depend on column scale.
fn factor_xtwx(xtwx: &Array2<f64>) -> Result<Cholesky<f64, Dyn>> {
    let a = to_dmatrix(xtwx);
    let diagonal = a.diagonal();
    let chol = a.cholesky().ok_or_else(singular)?;

    let l = chol.l_dirty();
    for (i, &a_ii) in diagonal.iter().enumerate() {
        let pivot = l[(i, i)];
        if a_ii <= 0.0 || pivot * pivot / a_ii < PIVOT_TOLERANCE {
            return Err(singular());
        }
    }

    Ok(chol)
}

/// Solves (X'WX) β = X'Wz.
fn solve_weighted_least_squares(
    x: &Array2<f64>,
    z: &Array1<f64>,
    w: &Array1<f64>,
) -> Result<Array1<f64>> {
    let x_weighted = weight_rows(x, w);
    let z_weighted = z * &w.mapv(f64::sqrt);

    let xtwx = x_weighted.t().dot(&x_weighted);
    let xtwz = x_weighted.t().dot(&z_weighted);

    let chol = factor_xtwx(&xtwx)?;
    let b = DVector::from_iterator(xtwz.len(), xtwz.iter().copied());
    let solution = chol.solve(&b);

    Ok(solution.iter().copied().collect())
}

fn invert_xtwx(x: &Array2<f64>, w: &Array1<f64>) -> Result<Array2<f64>> {
    let x_weighted = weight_rows(x, w);
    let chol = factor_xtwx(&x_weighted.t().dot(&x_weighted))?;
    Ok(from_dmatrix(&chol.inverse()))
}

fn singular() -> ModelError {
    ModelError::Singular("X'WX is singular; predictors may be perfectly collinear".to_string())
}
