// =============================================================================
// Statistical Inference
// =============================================================================
//
// Wald tests and intervals for individual coefficients, and chi-square tail
// probabilities for likelihood-ratio tests.
//
// Logistic regression fixes the dispersion at 1, so coefficient tests use the
// standard normal rather than Student's t.
//
// =============================================================================

use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};

fn standard_normal() -> Option<Normal> {
    Normal::new(0.0, 1.0).ok()
}

/// Two-tailed p-value for a z-statistic: P(|Z| > |z|).
pub fn pvalue_z(z: f64) -> f64 {
    if !z.is_finite() {
        return f64::NAN;
    }

    standard_normal().map_or(f64::NAN, |normal| 2.0 * normal.sf(z.abs()))
}

/// Wald confidence interval `estimate ± z_{1-α/2} × std_error`.
///
/// Returns `(NaN, NaN)` for a non-finite estimate or non-positive error.
pub fn confidence_interval_z(estimate: f64, std_error: f64, confidence: f64) -> (f64, f64) {
    if !estimate.is_finite() || !std_error.is_finite() || std_error <= 0.0 {
        return (f64::NAN, f64::NAN);
    }

    let Some(normal) = standard_normal() else {
        return (f64::NAN, f64::NAN);
    };

    let alpha = 1.0 - confidence;
    let z_critical = normal.inverse_cdf(1.0 - alpha / 2.0);

    let margin = z_critical * std_error;
    (estimate - margin, estimate + margin)
}

/// Upper-tail probability of a chi-square statistic with `df` degrees of
/// freedom.
pub fn chi_square_sf(statistic: f64, df: f64) -> f64 {
    if !statistic.is_finite() || df <= 0.0 {
        return f64::NAN;
    }

    ChiSquared::new(df).map_or(f64::NAN, |dist| dist.sf(statistic.max(0.0)))
}

/// Significance stars for summary tables:
/// `***` p < 0.001, `**` p < 0.01, `*` p < 0.05, `.` p < 0.1.
pub fn significance_stars(pvalue: f64) -> &'static str {
    if pvalue < 0.001 {
        "***"
    } else if pvalue < 0.01 {
        "**"
    } else if pvalue < 0.05 {
        "*"
    } else if pvalue < 0.1 {
        "."
    } else {
        ""
    }
}
