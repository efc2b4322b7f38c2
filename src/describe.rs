//! Descriptive statistics for the cleaned analysis table.

use crate::merge::types::MergedRecord;
use serde::Serialize;

/// Summary of one numeric column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub column: String,
    pub count: usize,
    pub mean: f64,
    pub stddev: f64,
    pub min: f64,
    pub max: f64,
}

type Extractor = fn(&MergedRecord) -> Option<f64>;

static COLUMNS: &[(&str, Extractor)] = &[
    ("total_capacity", |r| Some(r.total_capacity)),
    ("total_occupied", |r| Some(r.total_occupied)),
    ("total_available", |r| Some(r.total_available)),
    ("available", |r| Some(f64::from(r.available))),
    ("availability_rate", |r| r.availability_rate),
    ("assault", |r| Some(f64::from(r.assault))),
    ("auto_theft", |r| Some(f64::from(r.auto_theft))),
    ("break_and_enter", |r| Some(f64::from(r.break_and_enter))),
    ("robbery", |r| Some(f64::from(r.robbery))),
    ("theft_over", |r| Some(f64::from(r.theft_over))),
    ("mean_temp", |r| r.mean_temp),
    ("total_precip", |r| r.total_precip),
    ("cpi", |r| r.cpi),
    ("unemployment_rate", |r| r.unemployment_rate),
];

/// Summarizes every numeric column, skipping missing values.
pub fn describe(records: &[MergedRecord]) -> Vec<ColumnSummary> {
    COLUMNS
        .iter()
        .map(|(name, extract)| {
            let values: Vec<f64> = records.iter().filter_map(|r| extract(r)).collect();
            summarize(name, &values)
        })
        .collect()
}

/// Count, mean, population standard deviation and range of `values`.
/// Mean and deviation are 0 for an empty column; min and max are NaN.
fn summarize(column: &str, values: &[f64]) -> ColumnSummary {
    let count = values.len();
    let (mean, stddev) = if count == 0 {
        (0.0, 0.0)
    } else {
        let n = count as f64;
        let mean = values.iter().sum::<f64>() / n;
        let sum_sq: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
        (mean, (sum_sq / n).sqrt())
    };

    ColumnSummary {
        column: column.to_string(),
        count,
        mean,
        stddev,
        min: values.iter().copied().fold(f64::NAN, f64::min),
        max: values.iter().copied().fold(f64::NAN, f64::max),
    }
}
