//! CSV ingestion for the shelter, crime, weather and economic sources.
//!
//! Every source is read through [`open_csv`], so a `.gz` suffix on any input
//! path is decompressed on the fly.

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use csv::{ReaderBuilder, Trim};
use flate2::read::MultiGzDecoder;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::debug;

/// Accepted date layouts, tried in order against the date portion of a field.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%y-%m-%d", "%m/%d/%Y", "%m/%d/%y", "%Y/%m/%d"];

/// Opens a CSV file for reading, gunzipping it when the path ends in `.gz`.
pub fn open_csv(path: &Path) -> Result<csv::Reader<Box<dyn Read>>> {
    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;

    let gzipped = path.extension().and_then(|e| e.to_str()) == Some("gz");
    debug!(path = %path.display(), gzipped, "Opening CSV");

    let inner: Box<dyn Read> = if gzipped {
        Box::new(MultiGzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    Ok(ReaderBuilder::new().trim(Trim::All).from_reader(inner))
}

/// Deserializes every row of the CSV at `path` into `T`.
///
/// # Errors
///
/// Fails if the file cannot be opened or any row does not match `T`; the
/// error names the file and the offending line.
pub fn load_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut rdr = open_csv(path)?;
    let mut rows = Vec::new();

    for result in rdr.deserialize() {
        let record: T = result.with_context(|| format!("malformed row in {}", path.display()))?;
        rows.push(record);
    }

    debug!(path = %path.display(), rows = rows.len(), "CSV loaded");
    Ok(rows)
}

/// Parses a calendar date, ignoring any time-of-day suffix.
///
/// `2024-01-31`, `24-01-31`, `01/31/24`, `2024-01-31T05:00:00`,
/// `2024-01-31 05:00:00` and `1/31/2024 5:00:00 AM` all yield the same date.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let date_part = text
        .trim()
        .split(|c: char| c == 'T' || c.is_whitespace())
        .next()?;

    // `%Y` happily reads "22" as the year 22, so two-digit years are left
    // for the `%y` layout.
    DATE_FORMATS
        .iter()
        .filter_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
        .find(|date| date.year() >= 1900)
}

/// Parses a monthly reference date such as `2023-04` into `(year, month)`.
///
/// Full dates are accepted too and reduced to their month.
pub fn parse_month(text: &str) -> Option<(i32, u32)> {
    let text = text.trim();
    if let Some(date) = parse_date(text) {
        return Some((date.year(), date.month()));
    }

    let (year, month) = text.split_once('-')?;
    let year: i32 = year.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    (1..=12).contains(&month).then_some((year, month))
}

/// Normalizes a 158-neighbourhood code to its integer id.
///
/// Returns `None` for codes such as `NSA` (not specified area) or blanks.
pub fn parse_hood(text: &str) -> Option<u16> {
    text.trim().parse().ok()
}

/// Lowercases an address and collapses internal whitespace so that the
/// manually compiled neighbourhood map matches the occupancy export.
pub fn normalize_address(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
