//! Logistic regression of shelter availability.
//!
//! [`fit_model`] expands a [`ModelSpec`] over the cleaned table, fits the
//! binomial model by IRLS and gathers the coefficient table and fit
//! diagnostics into a [`ModelReport`].

pub mod design;
pub mod diagnostics;
pub mod error;
pub mod grade;
pub mod inference;
pub mod irls;

pub use design::{Covariate, DesignMatrix, Factor, ModelSpec, Term, Transform};
pub use diagnostics::{ConfusionMatrix, Gvif, LikelihoodRatioTest, PseudoR2};
pub use error::ModelError;
pub use irls::{IrlsConfig, LogisticFit, fit_logistic};

use crate::merge::types::MergedRecord;
use diagnostics::{aic, bic, generalized_vif, likelihood_ratio_test, null_deviance, pseudo_r2};
use inference::{confidence_interval_z, pvalue_z, significance_stars};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct FitOptions {
    pub irls: IrlsConfig,
    /// Probability at or above which a row is classified as available.
    pub threshold: f64,
    /// Confidence level for coefficient intervals.
    pub confidence: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            irls: IrlsConfig::default(),
            threshold: 0.5,
            confidence: 0.95,
        }
    }
}

/// One row of the coefficient summary table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoefficientRow {
    pub term: String,
    pub estimate: f64,
    pub std_error: f64,
    pub z_value: f64,
    pub p_value: f64,
    pub odds_ratio: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub odds_ratio_lower: f64,
    pub odds_ratio_upper: f64,
    pub significance: String,
}

/// Classification metrics derived from the confusion matrix.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl From<&ConfusionMatrix> for ClassificationMetrics {
    fn from(matrix: &ConfusionMatrix) -> Self {
        Self {
            accuracy: matrix.accuracy(),
            precision: matrix.precision(),
            recall: matrix.recall(),
            f1: matrix.f1(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelReport {
    pub n_obs: usize,
    pub n_params: usize,
    pub n_available: usize,
    pub converged: bool,
    pub iterations: usize,
    pub deviance: f64,
    pub null_deviance: f64,
    pub log_likelihood: f64,
    pub null_log_likelihood: f64,
    pub aic: f64,
    pub bic: f64,
    pub likelihood_ratio: LikelihoodRatioTest,
    pub pseudo_r2: PseudoR2,
    pub confusion: ConfusionMatrix,
    pub classification: ClassificationMetrics,
    pub coefficients: Vec<CoefficientRow>,
    pub vif: Vec<Gvif>,
}

/// Fits the availability model described by `spec` to `records`.
///
/// # Errors
///
/// Rejects a threshold outside [0, 1] and propagates design-matrix and
/// fitting failures. A failure to compute GVIFs is logged and leaves the VIF
/// table empty rather than failing the fit.
#[tracing::instrument(skip_all, fields(rows = records.len(), terms = spec.terms.len()))]
pub fn fit_model(
    records: &[MergedRecord],
    spec: &ModelSpec,
    options: &FitOptions,
) -> Result<ModelReport, ModelError> {
    if !(0.0..=1.0).contains(&options.threshold) {
        return Err(ModelError::InvalidValue(format!(
            "classification threshold {} is outside [0, 1]",
            options.threshold
        )));
    }

    let design = DesignMatrix::build(records, spec)?;
    let n_obs = design.n_obs();
    let n_params = design.n_params();

    info!(n_obs, n_params, "Fitting logistic regression");
    let fit = fit_logistic(&design.y, &design.x, &options.irls)?;

    let null_dev = null_deviance(&design.y);
    let log_likelihood = -fit.deviance / 2.0;
    let null_log_likelihood = -null_dev / 2.0;

    let coefficients = coefficient_table(&design, &fit, options.confidence);
    let confusion =
        ConfusionMatrix::from_predictions(&design.y, &fit.fitted_values, options.threshold);

    let vif = match generalized_vif(&fit.covariance, &design.terms) {
        Ok(vif) => vif,
        Err(e) => {
            warn!(error = %e, "Variance-inflation factors unavailable");
            Vec::new()
        }
    };

    let report = ModelReport {
        n_obs,
        n_params,
        n_available: design.y.iter().filter(|&&yi| yi > 0.5).count(),
        converged: fit.converged,
        iterations: fit.iterations,
        deviance: fit.deviance,
        null_deviance: null_dev,
        log_likelihood,
        null_log_likelihood,
        aic: aic(fit.deviance, n_params),
        bic: bic(fit.deviance, n_params, n_obs),
        likelihood_ratio: likelihood_ratio_test(null_dev, fit.deviance, n_params - 1),
        pseudo_r2: pseudo_r2(log_likelihood, null_log_likelihood, n_obs),
        classification: ClassificationMetrics::from(&confusion),
        confusion,
        coefficients,
        vif,
    };

    info!(
        converged = report.converged,
        iterations = report.iterations,
        deviance = report.deviance,
        lrt_p_value = report.likelihood_ratio.p_value,
        mcfadden_r2 = report.pseudo_r2.mcfadden,
        accuracy = report.classification.accuracy,
        "Model fitted"
    );

    Ok(report)
}

fn coefficient_table(
    design: &DesignMatrix,
    fit: &LogisticFit,
    confidence: f64,
) -> Vec<CoefficientRow> {
    design
        .column_names
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let estimate = fit.coefficients[j];
            let std_error = fit.covariance[[j, j]].max(0.0).sqrt();
            let z_value = estimate / std_error;
            let p_value = pvalue_z(z_value);
            let (ci_lower, ci_upper) = confidence_interval_z(estimate, std_error, confidence);

            CoefficientRow {
                term: name.clone(),
                estimate,
                std_error,
                z_value,
                p_value,
                odds_ratio: estimate.exp(),
                ci_lower,
                ci_upper,
                odds_ratio_lower: ci_lower.exp(),
                odds_ratio_upper: ci_upper.exp(),
                significance: significance_stars(p_value).to_string(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// Ten rows per sector; Men have 3 available, Women 6. Temperature varies
    /// independently of availability within each sector.
    fn records() -> Vec<MergedRecord> {
        let mut records = Vec::new();
        for (sector, available_count) in [("Men", 3), ("Women", 6)] {
            for i in 0..10 {
                records.push(MergedRecord {
                    sector: sector.to_string(),
                    hood_158: Some(1),
                    mean_temp: Some(f64::from(i % 5) - 2.0),
                    available: u8::from(i < available_count),
                    ..Default::default()
                });
            }
        }
        records
    }

    fn sector_spec() -> ModelSpec {
        ModelSpec {
            terms: vec![Term::Categorical(Factor::Sector)],
        }
    }

    #[test]
    fn test_fit_model_sector_only() {
        let report = fit_model(&records(), &sector_spec(), &FitOptions::default()).unwrap();

        assert!(report.converged);
        assert_eq!(report.n_obs, 20);
        assert_eq!(report.n_params, 2);
        assert_eq!(report.n_available, 9);
        assert_eq!(report.coefficients[1].term, "sector[Women]");

        let base = (3.0_f64 / 7.0).ln();
        assert_abs_diff_eq!(report.coefficients[0].estimate, base, epsilon = 1e-6);
        assert_abs_diff_eq!(
            report.coefficients[1].odds_ratio,
            (6.0 / 4.0) / (3.0 / 7.0),
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_fit_model_diagnostics_consistent() {
        let report = fit_model(&records(), &sector_spec(), &FitOptions::default()).unwrap();

        assert!(report.likelihood_ratio.statistic >= 0.0);
        assert_eq!(report.likelihood_ratio.df, 1);
        assert!((0.0..=1.0).contains(&report.pseudo_r2.mcfadden));
        assert_eq!(report.confusion.total(), report.n_obs);
        assert_abs_diff_eq!(report.deviance, -2.0 * report.log_likelihood, epsilon = 1e-12);

        // Women are predicted available (p = 0.6), Men not (p = 0.3).
        assert_eq!(report.confusion.true_positive, 6);
        assert_eq!(report.confusion.false_positive, 4);
        assert_eq!(report.confusion.false_negative, 3);
        assert_eq!(report.confusion.true_negative, 7);
    }

    #[test]
    fn test_fit_model_reports_vif_per_term() {
        let spec = ModelSpec {
            terms: vec![
                Term::Numeric {
                    covariate: Covariate::MeanTemp,
                    transform: Transform::Identity,
                },
                Term::Categorical(Factor::Sector),
            ],
        };

        let report = fit_model(&records(), &spec, &FitOptions::default()).unwrap();
        assert_eq!(report.vif.len(), 2);
        assert_eq!(report.vif[0].term, "mean_temp");
        assert!(report.vif.iter().all(|v| v.gvif >= 1.0 - 1e-9));
    }

    #[test]
    fn test_fit_model_rejects_bad_threshold() {
        let options = FitOptions {
            threshold: 1.5,
            ..FitOptions::default()
        };
        let err = fit_model(&records(), &sector_spec(), &options).unwrap_err();
        assert!(matches!(err, ModelError::InvalidValue(_)));
    }

    #[test]
    fn test_fit_model_empty_input() {
        let err = fit_model(&[], &sector_spec(), &FitOptions::default()).unwrap_err();
        assert!(matches!(err, ModelError::EmptyInput(_)));
    }
}
