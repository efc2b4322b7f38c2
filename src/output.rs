//! Output formatting and persistence for the merged table and model report.
//!
//! Supports CSV tables, a JSON report and a plain-text summary for the
//! terminal.

use anyhow::{Context, Result};
use csv::WriterBuilder;
use serde::Serialize;
use std::fmt::Write as _;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

use crate::merge::MergedRecord;
use crate::pipeline::AnalysisReport;

fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    let mut writer = WriterBuilder::new().has_headers(true).from_writer(file);

    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    debug!(path = %path.display(), rows = rows.len(), "CSV written");
    Ok(())
}

/// Writes the merged analysis table, replacing any existing file.
pub fn write_records(path: &Path, records: &[MergedRecord]) -> Result<()> {
    write_rows(path, records)?;
    info!(path = %path.display(), rows = records.len(), "Merged table written");
    Ok(())
}

/// Writes the coefficient table of the fitted model.
pub fn write_summary(path: &Path, report: &AnalysisReport) -> Result<()> {
    write_rows(path, &report.model.coefficients)?;
    info!(path = %path.display(), "Model summary written");
    Ok(())
}

/// Writes any serializable value as pretty-printed JSON.
pub fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    let body = serde_json::to_string_pretty(value)?;
    std::fs::write(path, body).with_context(|| format!("cannot write {}", path.display()))?;
    info!(path = %path.display(), "JSON report written");
    Ok(())
}

/// Renders the report as plain text for the terminal.
pub fn render_report(report: &AnalysisReport) -> String {
    let mut out = String::new();
    let model = &report.model;

    // Writing to a String cannot fail.
    let _ = writeln!(out, "Shelter availability: binomial logistic regression");
    let _ = writeln!(out, "{}", "=".repeat(78));

    if let Some(merge) = &report.merge {
        let _ = writeln!(
            out,
            "Shelter rows: {}  merged: {}  with crime: {}  unmapped: {}",
            merge.shelter_rows, merge.merged_rows, merge.rows_with_crime, merge.unmapped_rows
        );
        let conflicts = merge.conflicting_weather_dates
            + merge.conflicting_cpi_months
            + merge.conflicting_unemployment_months;
        if conflicts > 0 {
            let _ = writeln!(
                out,
                "Repeated keys with conflicting values (first kept): \
                 weather {}  cpi {}  unemployment {}",
                merge.conflicting_weather_dates,
                merge.conflicting_cpi_months,
                merge.conflicting_unemployment_months
            );
        }
    }
    if let Some(cleaning) = &report.cleaning {
        let _ = writeln!(
            out,
            "Cleaning: {} -> {} rows (zero capacity {}, negative availability {}, \
             no neighbourhood {}, missing covariates {}; precipitation imputed {})",
            cleaning.input_rows,
            cleaning.output_rows,
            cleaning.dropped_zero_capacity,
            cleaning.dropped_negative_available,
            cleaning.dropped_missing_hood,
            cleaning.dropped_missing_covariates,
            cleaning.imputed_precip
        );
    }

    let _ = writeln!(
        out,
        "Observations: {}  available: {}  parameters: {}  converged: {} ({} iterations)",
        model.n_obs, model.n_available, model.n_params, model.converged, model.iterations
    );
    let _ = writeln!(out);

    let _ = writeln!(
        out,
        "{:<32} {:>10} {:>10} {:>8} {:>10} {:>10}",
        "Term", "Estimate", "Std.Err", "z", "Pr(>|z|)", "OddsRatio"
    );
    let _ = writeln!(out, "{}", "-".repeat(78));
    for row in &model.coefficients {
        let _ = writeln!(
            out,
            "{:<32} {:>10.4} {:>10.4} {:>8.3} {:>10.4} {:>10.4} {}",
            truncate(&row.term, 32),
            row.estimate,
            row.std_error,
            row.z_value,
            row.p_value,
            row.odds_ratio,
            row.significance
        );
    }
    let _ = writeln!(out, "Signif. codes: 0 '***' 0.001 '**' 0.01 '*' 0.05 '.' 0.1 ' ' 1");
    let _ = writeln!(out);

    let lrt = &model.likelihood_ratio;
    let _ = writeln!(
        out,
        "Null deviance: {:.2}  Residual deviance: {:.2}  AIC: {:.2}  BIC: {:.2}",
        model.null_deviance, model.deviance, model.aic, model.bic
    );
    let _ = writeln!(
        out,
        "Likelihood ratio test: chi2 = {:.3}, df = {}, p = {:.4e}",
        lrt.statistic, lrt.df, lrt.p_value
    );
    let _ = writeln!(
        out,
        "Pseudo R2: McFadden {:.4}  Cox-Snell {:.4}  Nagelkerke {:.4}",
        model.pseudo_r2.mcfadden, model.pseudo_r2.cox_snell, model.pseudo_r2.nagelkerke
    );
    let _ = writeln!(out);

    let cm = &model.confusion;
    let _ = writeln!(out, "Confusion matrix (threshold {:.2})", cm.threshold);
    let _ = writeln!(out, "{:>20} {:>12} {:>12}", "", "actual 0", "actual 1");
    let _ = writeln!(
        out,
        "{:>20} {:>12} {:>12}",
        "predicted 0", cm.true_negative, cm.false_negative
    );
    let _ = writeln!(
        out,
        "{:>20} {:>12} {:>12}",
        "predicted 1", cm.false_positive, cm.true_positive
    );
    let metrics = &model.classification;
    let _ = writeln!(
        out,
        "Accuracy {:.4}  Precision {:.4}  Recall {:.4}  F1 {:.4}",
        metrics.accuracy, metrics.precision, metrics.recall, metrics.f1
    );
    let _ = writeln!(out);

    if !model.vif.is_empty() {
        let _ = writeln!(
            out,
            "{:<32} {:>12} {:>5} {:>14} {:>10}",
            "Term", "GVIF", "Df", "GVIF^(1/2Df)", "Collinear"
        );
        for vif in &model.vif {
            let _ = writeln!(
                out,
                "{:<32} {:>12.4} {:>5} {:>14.4} {:>10}",
                truncate(&vif.term, 32),
                vif.gvif,
                vif.df,
                vif.adjusted,
                vif.grade
            );
        }
    }

    out
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let mut short: String = text.chars().take(width - 1).collect();
        short.push('~');
        short
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::MergeSummary;
    use crate::model::{Factor, FitOptions, ModelSpec, Term};
    use crate::pipeline::analyze;
    use std::env;
    use std::fs;

    fn temp_path(name: &str) -> std::path::PathBuf {
        env::temp_dir().join(name)
    }

    fn sample_records() -> Vec<MergedRecord> {
        let mut records = Vec::new();
        for (sector, available_count) in [("Men", 2), ("Youth", 5)] {
            for i in 0..8 {
                let mut record = MergedRecord {
                    program_id: format!("{sector}-{i}"),
                    sector: sector.to_string(),
                    hood_158: Some(14),
                    capacity_actual_bed: Some(10.0),
                    occupied_beds: Some(if i < available_count { 9.0 } else { 10.0 }),
                    mean_temp: Some(1.0),
                    total_precip: Some(0.0),
                    cpi: Some(150.0),
                    unemployment_rate: Some(6.0),
                    ..Default::default()
                };
                record.derive_availability();
                records.push(record);
            }
        }
        records
    }

    fn sample_report() -> AnalysisReport {
        let spec = ModelSpec {
            terms: vec![Term::Categorical(Factor::Sector)],
        };
        analyze(&sample_records(), &spec, &FitOptions::default(), None).unwrap()
    }

    #[test]
    fn test_write_records_round_trip() {
        let path = temp_path("shelter_model_output_records.csv");
        let records = sample_records();

        write_records(&path, &records).unwrap();
        let back: Vec<MergedRecord> = crate::parser::load_records(&path).unwrap();
        assert_eq!(back, records);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_records_overwrites() {
        let path = temp_path("shelter_model_output_overwrite.csv");
        let records = sample_records();

        write_records(&path, &records).unwrap();
        write_records(&path, &records[..1]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        // 1 header + 1 data row
        assert_eq!(content.lines().count(), 2);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_summary_has_one_row_per_coefficient() {
        let path = temp_path("shelter_model_output_summary.csv");
        let report = sample_report();

        write_summary(&path, &report).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();

        assert!(lines[0].starts_with("term,estimate,std_error"));
        assert_eq!(lines.len(), 1 + report.model.coefficients.len());
        assert!(lines[2].starts_with("sector[Youth]"));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_json() {
        let path = temp_path("shelter_model_output_report.json");
        write_json(&path, &sample_report()).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["model"]["n_obs"], 16);
        assert!(value["model"]["coefficients"].is_array());

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_render_report_sections() {
        let text = render_report(&sample_report());

        assert!(text.contains("(Intercept)"));
        assert!(text.contains("sector[Youth]"));
        assert!(text.contains("Likelihood ratio test"));
        assert!(text.contains("McFadden"));
        assert!(text.contains("Confusion matrix"));
        assert!(text.contains("GVIF"));
    }

    #[test]
    fn test_render_report_shows_conflicting_keys() {
        let mut report = sample_report();
        report.merge = Some(MergeSummary {
            shelter_rows: 16,
            merged_rows: 16,
            conflicting_cpi_months: 2,
            ..Default::default()
        });

        let text = render_report(&report);
        assert!(text.contains("Shelter rows: 16  merged: 16"));
        assert!(text.contains("cpi 2"));

        report.merge = Some(MergeSummary::default());
        assert!(!render_report(&report).contains("conflicting"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 5), "abcd~");
    }
}
