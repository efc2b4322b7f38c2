//! End-to-end stages used by the CLI: load, merge and clean the sources,
//! then fit the model on the resulting table.

use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::path::Path;
use tracing::info;

use crate::config::SourcesConfig;
use crate::describe::{ColumnSummary, describe};
use crate::merge::types::ShelterRow;
use crate::merge::{
    CleaningSummary, MergeSummary, MergedRecord, Sources, clean, merge_sources, validate,
};
use crate::model::{FitOptions, ModelReport, ModelSpec, fit_model};
use crate::parser::load_records;

/// The cleaned analysis table and the bookkeeping from building it.
#[derive(Debug)]
pub struct PreparedData {
    pub records: Vec<MergedRecord>,
    pub merge: MergeSummary,
    pub cleaning: CleaningSummary,
}

/// Everything produced by a run, serialized as the JSON report.
#[derive(Debug, Serialize)]
pub struct AnalysisReport {
    pub merge: Option<MergeSummary>,
    pub cleaning: Option<CleaningSummary>,
    pub spec: ModelSpec,
    pub descriptives: Vec<ColumnSummary>,
    pub model: ModelReport,
}

/// Reads every source listed in `config`.
#[tracing::instrument(skip_all)]
pub fn load_sources(config: &SourcesConfig) -> Result<Sources> {
    let mut shelter = Vec::new();
    for path in &config.shelter {
        let rows: Vec<ShelterRow> = load_records(path)?;
        info!(path = %path.display(), rows = rows.len(), "Shelter occupancy loaded");
        shelter.extend(rows);
    }

    let sources = Sources {
        shelter,
        crime: load_records(&config.crime)?,
        neighbourhoods: load_records(&config.neighbourhoods)?,
        weather: load_records(&config.weather)?,
        cpi: load_records(&config.cpi)?,
        unemployment: load_records(&config.unemployment)?,
    };

    info!(
        shelter = sources.shelter.len(),
        crime = sources.crime.len(),
        neighbourhoods = sources.neighbourhoods.len(),
        weather = sources.weather.len(),
        cpi = sources.cpi.len(),
        unemployment = sources.unemployment.len(),
        "Sources loaded"
    );

    Ok(sources)
}

/// Loads, merges, cleans and validates the sources.
///
/// # Errors
///
/// Fails if a source cannot be read, a shelter date is unrecognised,
/// nothing survives cleaning, or the cleaned table does not validate.
pub fn prepare(config: &SourcesConfig) -> Result<PreparedData> {
    let sources = load_sources(config)?;
    let (merged, merge) = merge_sources(&sources)?;
    let (records, cleaning) = clean(merged);

    if records.is_empty() {
        bail!("no rows left after cleaning ({} merged rows)", cleaning.input_rows);
    }
    validate(&records).context("cleaned table failed validation")?;

    Ok(PreparedData {
        records,
        merge,
        cleaning,
    })
}

/// Reads a merged table previously written by the `merge` stage and
/// validates it.
pub fn load_merged(path: &Path) -> Result<Vec<MergedRecord>> {
    let records: Vec<MergedRecord> = load_records(path)?;
    if records.is_empty() {
        bail!("{} has no rows", path.display());
    }
    validate(&records).with_context(|| format!("{} failed validation", path.display()))?;
    Ok(records)
}

/// Fits the model and assembles the full report.
pub fn analyze(
    records: &[MergedRecord],
    spec: &ModelSpec,
    options: &FitOptions,
    prepared: Option<(&MergeSummary, &CleaningSummary)>,
) -> Result<AnalysisReport> {
    let model = fit_model(records, spec, options).context("model fit failed")?;

    Ok(AnalysisReport {
        merge: prepared.map(|(merge, _)| merge.clone()),
        cleaning: prepared.map(|(_, cleaning)| cleaning.clone()),
        spec: spec.clone(),
        descriptives: describe(records),
        model,
    })
}
