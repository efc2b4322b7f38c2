use crate::merge::types::MergedRecord;
use anyhow::{Result, bail};
use serde::Serialize;
use tracing::info;

/// Counts of rows imputed and removed by [`clean`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleaningSummary {
    pub input_rows: usize,
    pub imputed_precip: usize,
    pub dropped_zero_capacity: usize,
    pub dropped_negative_available: usize,
    pub dropped_missing_hood: usize,
    pub dropped_missing_covariates: usize,
    pub output_rows: usize,
}

/// Imputes blank precipitation as zero and drops rows that cannot enter the
/// model. Filters apply in order: zero capacity, negative availability,
/// unmapped neighbourhood, missing temperature / CPI / unemployment.
#[tracing::instrument(skip_all, fields(input_rows = records.len()))]
pub fn clean(records: Vec<MergedRecord>) -> (Vec<MergedRecord>, CleaningSummary) {
    let mut summary = CleaningSummary {
        input_rows: records.len(),
        ..Default::default()
    };

    let cleaned: Vec<MergedRecord> = records
        .into_iter()
        .filter_map(|mut record| {
            if record.total_capacity <= 0.0 {
                summary.dropped_zero_capacity += 1;
                return None;
            }
            if record.total_available < 0.0 {
                summary.dropped_negative_available += 1;
                return None;
            }
            if record.hood_158.is_none() {
                summary.dropped_missing_hood += 1;
                return None;
            }
            if record.mean_temp.is_none()
                || record.cpi.is_none()
                || record.unemployment_rate.is_none()
            {
                summary.dropped_missing_covariates += 1;
                return None;
            }

            if record.total_precip.is_none() {
                record.total_precip = Some(0.0);
                summary.imputed_precip += 1;
            }

            Some(record)
        })
        .collect();

    summary.output_rows = cleaned.len();

    info!(
        input_rows = summary.input_rows,
        output_rows = summary.output_rows,
        imputed_precip = summary.imputed_precip,
        dropped_zero_capacity = summary.dropped_zero_capacity,
        dropped_negative_available = summary.dropped_negative_available,
        dropped_missing_hood = summary.dropped_missing_hood,
        dropped_missing_covariates = summary.dropped_missing_covariates,
        "Merged table cleaned"
    );

    (cleaned, summary)
}

/// Post-cleaning checks on the analysis table.
///
/// # Errors
///
/// Fails on the first row with a missing required column, negative
/// availability, or an indicator that disagrees with the availability count.
pub fn validate(records: &[MergedRecord]) -> Result<()> {
    for (index, record) in records.iter().enumerate() {
        let missing = [
            ("hood_158", record.hood_158.is_none()),
            ("mean_temp", record.mean_temp.is_none()),
            ("total_precip", record.total_precip.is_none()),
            ("cpi", record.cpi.is_none()),
            ("unemployment_rate", record.unemployment_rate.is_none()),
            ("availability_rate", record.availability_rate.is_none()),
        ];
        if let Some((column, _)) = missing.iter().find(|(_, is_missing)| *is_missing) {
            bail!("row {index} (program {}): missing {column}", record.program_id);
        }

        if record.total_available < 0.0 {
            bail!(
                "row {index} (program {}): total_available is {}",
                record.program_id,
                record.total_available
            );
        }

        if record.available != u8::from(record.total_available > 0.0) {
            bail!(
                "row {index} (program {}): available flag {} disagrees with total_available {}",
                record.program_id,
                record.available,
                record.total_available
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete(capacity: f64, occupied: f64) -> MergedRecord {
        let mut record = MergedRecord {
            program_id: "1".to_string(),
            hood_158: Some(1),
            capacity_actual_bed: Some(capacity),
            occupied_beds: Some(occupied),
            mean_temp: Some(2.0),
            total_precip: Some(0.4),
            cpi: Some(150.0),
            unemployment_rate: Some(6.0),
            ..Default::default()
        };
        record.derive_availability();
        record
    }

    #[test]
    fn test_clean_keeps_complete_rows() {
        let (cleaned, summary) = clean(vec![complete(10.0, 5.0), complete(10.0, 10.0)]);

        assert_eq!(cleaned.len(), 2);
        assert_eq!(summary.output_rows, 2);
        validate(&cleaned).unwrap();
    }

    #[test]
    fn test_clean_drops_invalid_rows() {
        let zero_capacity = complete(0.0, 0.0);
        let over_capacity = complete(10.0, 12.0);
        let mut unmapped = complete(10.0, 5.0);
        unmapped.hood_158 = None;
        let mut no_cpi = complete(10.0, 5.0);
        no_cpi.cpi = None;

        let (cleaned, summary) = clean(vec![
            zero_capacity,
            over_capacity,
            unmapped,
            no_cpi,
            complete(4.0, 1.0),
        ]);

        assert_eq!(cleaned.len(), 1);
        assert_eq!(summary.input_rows, 5);
        assert_eq!(summary.dropped_zero_capacity, 1);
        assert_eq!(summary.dropped_negative_available, 1);
        assert_eq!(summary.dropped_missing_hood, 1);
        assert_eq!(summary.dropped_missing_covariates, 1);
        assert!(cleaned.iter().all(|r| r.total_available >= 0.0));
    }

    #[test]
    fn test_clean_imputes_precipitation() {
        let mut record = complete(10.0, 5.0);
        record.total_precip = None;

        let (cleaned, summary) = clean(vec![record]);
        assert_eq!(cleaned[0].total_precip, Some(0.0));
        assert_eq!(summary.imputed_precip, 1);
    }

    #[test]
    fn test_validate_rejects_missing_column() {
        let mut record = complete(10.0, 5.0);
        record.unemployment_rate = None;

        let err = validate(&[record]).unwrap_err();
        assert!(err.to_string().contains("unemployment_rate"));
    }

    #[test]
    fn test_validate_rejects_negative_availability() {
        let record = complete(10.0, 12.0);
        assert_eq!(record.total_available, -2.0);

        let err = validate(&[complete(10.0, 4.0), record]).unwrap_err();
        assert!(err.to_string().contains("row 1"));
        assert!(err.to_string().contains("total_available is -2"));
    }

    #[test]
    fn test_validate_rejects_inconsistent_flag() {
        let mut record = complete(10.0, 10.0);
        record.available = 1;

        assert!(validate(&[record]).is_err());
    }
}
