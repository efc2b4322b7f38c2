use crate::merge::types::{CrimeCounts, CrimeRow, MciCategory};
use crate::parser::{parse_date, parse_hood};
use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Crime counts keyed by (occurrence date, neighbourhood id).
pub type CrimeTable = HashMap<(NaiveDate, u16), CrimeCounts>;

/// Groups crime events by date and neighbourhood and pivots them into one
/// wide row of per-category counts per key.
///
/// Events without a parseable date or neighbourhood (e.g. `NSA`) cannot be
/// joined and are skipped; the number skipped is returned alongside the table.
pub fn pivot_crime(rows: &[CrimeRow]) -> (CrimeTable, usize) {
    let mut table = CrimeTable::new();
    let mut skipped = 0usize;
    let mut unknown_categories: HashMap<&str, usize> = HashMap::new();

    for row in rows {
        let (Some(date), Some(hood)) = (parse_date(&row.occ_date), parse_hood(&row.hood_158))
        else {
            skipped += 1;
            continue;
        };

        let category = MciCategory::from_label(&row.mci_category);
        if category.is_none() {
            *unknown_categories.entry(row.mci_category.as_str()).or_default() += 1;
        }

        table.entry((date, hood)).or_default().record(category);
    }

    for (label, count) in &unknown_categories {
        warn!(category = %label, count, "Unrecognised MCI category counted as other");
    }

    debug!(keys = table.len(), skipped, "Crime pivoted");
    (table, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crime(date: &str, category: &str, hood: &str) -> CrimeRow {
        CrimeRow {
            occ_date: date.to_string(),
            mci_category: category.to_string(),
            hood_158: hood.to_string(),
        }
    }

    #[test]
    fn test_pivot_groups_by_date_and_hood() {
        let rows = vec![
            crime("2022-01-01", "Assault", "001"),
            crime("2022-01-01 13:00:00", "Assault", "1"),
            crime("2022-01-01", "Robbery", "1"),
            crime("2022-01-02", "Assault", "1"),
            crime("2022-01-01", "Theft Over", "2"),
        ];

        let (table, skipped) = pivot_crime(&rows);
        assert_eq!(skipped, 0);
        assert_eq!(table.len(), 3);

        let day1 = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap();
        let counts = table[&(day1, 1)];
        assert_eq!(counts.assault, 2);
        assert_eq!(counts.robbery, 1);
        assert_eq!(counts.total(), 3);

        assert_eq!(table[&(day1, 2)].theft_over, 1);
    }

    #[test]
    fn test_pivot_skips_unjoinable_rows() {
        let rows = vec![
            crime("2022-01-01", "Assault", "NSA"),
            crime("", "Assault", "1"),
            crime("2022-01-01", "Auto Theft", "5"),
        ];

        let (table, skipped) = pivot_crime(&rows);
        assert_eq!(skipped, 2);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_pivot_counts_unknown_category_as_other() {
        let rows = vec![crime("2022-01-01", "Homicide", "7")];
        let (table, _) = pivot_crime(&rows);

        let day = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap();
        assert_eq!(table[&(day, 7)].other, 1);
    }
}
