// =============================================================================
// Model Diagnostics
// =============================================================================
//
// Goodness of fit and multicollinearity checks for the fitted logistic model:
//
// - LIKELIHOOD RATIO: fitted model against the intercept-only model
// - PSEUDO R²:        McFadden, Cox-Snell and Nagelkerke
// - CLASSIFICATION:   confusion matrix at a probability threshold
// - GVIF:             generalized variance-inflation factor per term
//
// =============================================================================

use nalgebra::DMatrix;
use ndarray::{Array1, Array2};
use serde::Serialize;

use crate::model::design::TermColumns;
use crate::model::error::{ModelError, Result};
use crate::model::grade::collinearity_grade;
use crate::model::inference::chi_square_sf;

/// Deviance of the intercept-only model, whose fitted probability is the
/// sample mean of `y`.
pub fn null_deviance(y: &Array1<f64>) -> f64 {
    let n = y.len() as f64;
    if n == 0.0 {
        return 0.0;
    }
    let p = y.sum() / n;

    // 0 × ln 0 contributes nothing.
    let term = |count: f64, prob: f64| if count > 0.0 { count * prob.ln() } else { 0.0 };
    -2.0 * (term(y.sum(), p) + term(n - y.sum(), 1.0 - p))
}

/// Akaike information criterion: `deviance + 2k`.
pub fn aic(deviance: f64, n_params: usize) -> f64 {
    deviance + 2.0 * n_params as f64
}

/// Bayesian information criterion: `deviance + k ln n`.
pub fn bic(deviance: f64, n_params: usize, n_obs: usize) -> f64 {
    deviance + n_params as f64 * (n_obs as f64).ln()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LikelihoodRatioTest {
    pub statistic: f64,
    pub df: usize,
    pub p_value: f64,
}

/// Tests the fitted model against the intercept-only model.
///
/// The statistic is the drop in deviance, chi-square with `df` equal to the
/// number of non-intercept coefficients.
pub fn likelihood_ratio_test(null_deviance: f64, deviance: f64, df: usize) -> LikelihoodRatioTest {
    let statistic = (null_deviance - deviance).max(0.0);
    LikelihoodRatioTest {
        statistic,
        df,
        p_value: chi_square_sf(statistic, df as f64),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PseudoR2 {
    /// 1 − ℓ / ℓ₀
    pub mcfadden: f64,
    /// 1 − exp(2(ℓ₀ − ℓ) / n)
    pub cox_snell: f64,
    /// Cox-Snell rescaled to reach 1 at a perfect fit.
    pub nagelkerke: f64,
}

/// Pseudo R² measures from the model and null log-likelihoods.
pub fn pseudo_r2(log_likelihood: f64, null_log_likelihood: f64, n_obs: usize) -> PseudoR2 {
    let n = n_obs as f64;

    let mcfadden = if null_log_likelihood == 0.0 {
        0.0
    } else {
        1.0 - log_likelihood / null_log_likelihood
    };

    let cox_snell = 1.0 - (2.0 * (null_log_likelihood - log_likelihood) / n).exp();
    let max_cox_snell = 1.0 - (2.0 * null_log_likelihood / n).exp();
    let nagelkerke = if max_cox_snell > 0.0 {
        cox_snell / max_cox_snell
    } else {
        0.0
    };

    PseudoR2 {
        mcfadden,
        cox_snell,
        nagelkerke,
    }
}

/// Classification counts with "available" (y = 1) as the positive class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfusionMatrix {
    pub threshold: f64,
    pub true_positive: usize,
    pub false_positive: usize,
    pub true_negative: usize,
    pub false_negative: usize,
}

impl ConfusionMatrix {
    /// Predicts 1 when the fitted probability is at least `threshold`.
    pub fn from_predictions(y: &Array1<f64>, fitted: &Array1<f64>, threshold: f64) -> Self {
        let mut matrix = ConfusionMatrix {
            threshold,
            true_positive: 0,
            false_positive: 0,
            true_negative: 0,
            false_negative: 0,
        };

        for (&actual, &prob) in y.iter().zip(fitted.iter()) {
            match (actual > 0.5, prob >= threshold) {
                (true, true) => matrix.true_positive += 1,
                (false, true) => matrix.false_positive += 1,
                (false, false) => matrix.true_negative += 1,
                (true, false) => matrix.false_negative += 1,
            }
        }

        matrix
    }

    pub fn total(&self) -> usize {
        self.true_positive + self.false_positive + self.true_negative + self.false_negative
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positive + self.true_negative, self.total())
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_positive)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_negative)
    }

    pub fn f1(&self) -> f64 {
        let (precision, recall) = (self.precision(), self.recall());
        if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        }
    }
}

fn ratio(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

/// Generalized variance-inflation factor for one model term.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Gvif {
    pub term: String,
    pub df: usize,
    pub gvif: f64,
    /// `GVIF^(1/(2·df))`, comparable across terms with different df.
    pub adjusted: f64,
    pub grade: String,
}

/// Computes the GVIF of every term from the coefficient covariance matrix.
///
/// With `R` the correlation matrix of the non-intercept coefficients,
/// `GVIF = det(R₁₁) det(R₂₂) / det(R)` where `R₁₁` covers the term's columns
/// and `R₂₂` the rest. For a single-column term this is the ordinary VIF.
/// Column 0 of `covariance` must be the intercept.
///
/// Determinants are taken on the log scale, since factors with many levels
/// make them vanishingly small.
///
/// # Errors
///
/// Fails if the covariance matrix is not positive definite.
pub fn generalized_vif(covariance: &Array2<f64>, terms: &[TermColumns]) -> Result<Vec<Gvif>> {
    let p = covariance.nrows();
    if covariance.ncols() != p {
        return Err(ModelError::DimensionMismatch(format!(
            "covariance is {}x{}",
            p,
            covariance.ncols()
        )));
    }
    if p < 2 {
        return Ok(Vec::new());
    }

    let k = p - 1;
    let std_dev: Vec<f64> = (1..p).map(|i| covariance[[i, i]].sqrt()).collect();
    if std_dev.iter().any(|s| !s.is_finite() || *s <= 0.0) {
        return Err(ModelError::Singular(
            "coefficient covariance has a non-positive variance".to_string(),
        ));
    }

    let correlation = DMatrix::from_fn(k, k, |i, j| {
        covariance[[i + 1, j + 1]] / (std_dev[i] * std_dev[j])
    });
    let log_det_all = log_det(&correlation)?;

    let mut results = Vec::with_capacity(terms.len());
    for term in terms {
        if term.columns.start == 0 || term.columns.end > p {
            return Err(ModelError::DimensionMismatch(format!(
                "term {} spans columns {:?} of {}",
                term.name, term.columns, p
            )));
        }

        let inside: Vec<usize> = term.columns.clone().map(|c| c - 1).collect();
        let outside: Vec<usize> = (0..k).filter(|i| !inside.contains(i)).collect();

        let log_gvif = log_det(&submatrix(&correlation, &inside))?
            + log_det(&submatrix(&correlation, &outside))?
            - log_det_all;

        let df = inside.len();
        let gvif = log_gvif.exp();
        let adjusted = (log_gvif / (2.0 * df as f64)).exp();

        results.push(Gvif {
            term: term.name.clone(),
            df,
            gvif,
            adjusted,
            grade: collinearity_grade(adjusted),
        });
    }

    Ok(results)
}

fn submatrix(m: &DMatrix<f64>, indices: &[usize]) -> DMatrix<f64> {
    DMatrix::from_fn(indices.len(), indices.len(), |i, j| m[(indices[i], indices[j])])
}

/// ln det of a symmetric positive definite matrix; the empty matrix has det 1.
fn log_det(m: &DMatrix<f64>) -> Result<f64> {
    if m.nrows() == 0 {
        return Ok(0.0);
    }

    let chol = m.clone().cholesky().ok_or_else(|| {
        ModelError::Singular("coefficient correlation matrix is not positive definite".to_string())
    })?;

    Ok(2.0 * chol.l_dirty().diagonal().iter().map(|d| d.ln()).sum::<f64>())
}
