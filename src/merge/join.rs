use crate::merge::crime::pivot_crime;
use crate::merge::types::{
    CrimeRow, MergedRecord, MonthlyRow, NeighbourhoodRow, ShelterRow, WeatherRow,
};
use crate::parser::{normalize_address, parse_date, parse_hood, parse_month};
use anyhow::{Result, bail};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use tracing::{info, warn};

/// All source tables, already deserialized.
#[derive(Debug, Default)]
pub struct Sources {
    pub shelter: Vec<ShelterRow>,
    pub crime: Vec<CrimeRow>,
    pub neighbourhoods: Vec<NeighbourhoodRow>,
    pub weather: Vec<WeatherRow>,
    pub cpi: Vec<MonthlyRow>,
    pub unemployment: Vec<MonthlyRow>,
}

/// Row accounting for the joins, reported alongside the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergeSummary {
    pub shelter_rows: usize,
    pub merged_rows: usize,
    pub crime_rows: usize,
    pub crime_rows_skipped: usize,
    pub crime_keys: usize,
    pub rows_with_crime: usize,
    pub rows_with_weather: usize,
    pub rows_with_cpi: usize,
    pub rows_with_unemployment: usize,
    pub unmapped_rows: usize,
    pub unmapped_locations: Vec<String>,
    /// Dates or months listed more than once with different values. The
    /// first value read is used.
    pub conflicting_weather_dates: usize,
    pub conflicting_cpi_months: usize,
    pub conflicting_unemployment_months: usize,
}

/// Left-joins crime, weather, CPI and unemployment onto the shelter rows.
///
/// Crime joins on (date, neighbourhood) and defaults to zero counts when no
/// event was reported. Weather joins on date; CPI and unemployment on
/// (year, month). Unmatched weather and economic values stay `None` for the
/// cleaning step to handle.
///
/// # Errors
///
/// Fails on the first shelter row whose occupancy date cannot be parsed,
/// so every shelter row is either merged or reported.
#[tracing::instrument(skip_all, fields(shelter_rows = sources.shelter.len()))]
pub fn merge_sources(sources: &Sources) -> Result<(Vec<MergedRecord>, MergeSummary)> {
    let (crime, crime_rows_skipped) = pivot_crime(&sources.crime);
    let hoods = neighbourhood_lookup(&sources.neighbourhoods);
    let (weather, conflicting_weather_dates) = weather_lookup(&sources.weather);
    let (cpi, conflicting_cpi_months) = monthly_lookup(&sources.cpi, "cpi");
    let (unemployment, conflicting_unemployment_months) =
        monthly_lookup(&sources.unemployment, "unemployment");

    let mut summary = MergeSummary {
        shelter_rows: sources.shelter.len(),
        crime_rows: sources.crime.len(),
        crime_rows_skipped,
        crime_keys: crime.len(),
        conflicting_weather_dates,
        conflicting_cpi_months,
        conflicting_unemployment_months,
        ..Default::default()
    };
    let mut unmapped: BTreeSet<String> = BTreeSet::new();
    let mut records = Vec::with_capacity(sources.shelter.len());

    for (index, row) in sources.shelter.iter().enumerate() {
        let Some(date) = parse_date(&row.occupancy_date) else {
            bail!(
                "shelter row {index} (program {}): unrecognised OCCUPANCY_DATE {:?}",
                row.program_id,
                row.occupancy_date
            );
        };

        let mut record = MergedRecord {
            date,
            year: date.year(),
            month: date.month(),
            program_id: row.program_id.clone(),
            location_name: row.location_name.clone(),
            location_address: row.location_address.clone(),
            sector: row.sector.clone(),
            program_model: row.program_model.clone(),
            overnight_service_type: row.overnight_service_type.clone(),
            capacity_type: row.capacity_type.clone(),
            capacity_actual_bed: row.capacity_actual_bed,
            occupied_beds: row.occupied_beds,
            capacity_actual_room: row.capacity_actual_room,
            occupied_rooms: row.occupied_rooms,
            ..Default::default()
        };
        record.derive_availability();

        record.hood_158 = hoods.get(&normalize_address(&row.location_address)).copied();
        match record.hood_158 {
            Some(hood) => {
                if let Some(counts) = crime.get(&(date, hood)) {
                    record.set_crime(*counts);
                    summary.rows_with_crime += 1;
                }
            }
            None => {
                summary.unmapped_rows += 1;
                unmapped.insert(row.location_address.trim().to_string());
            }
        }

        if let Some(&(mean_temp, total_precip)) = weather.get(&date) {
            record.mean_temp = mean_temp;
            record.total_precip = total_precip;
            summary.rows_with_weather += 1;
        }

        let month_key = (record.year, record.month);
        record.cpi = cpi.get(&month_key).copied();
        record.unemployment_rate = unemployment.get(&month_key).copied();
        summary.rows_with_cpi += usize::from(record.cpi.is_some());
        summary.rows_with_unemployment += usize::from(record.unemployment_rate.is_some());

        records.push(record);
    }

    summary.merged_rows = records.len();
    summary.unmapped_locations = unmapped.into_iter().collect();

    if !summary.unmapped_locations.is_empty() {
        warn!(
            locations = summary.unmapped_locations.len(),
            rows = summary.unmapped_rows,
            "Shelter locations missing from the neighbourhood map"
        );
    }

    info!(
        shelter_rows = summary.shelter_rows,
        merged_rows = summary.merged_rows,
        rows_with_crime = summary.rows_with_crime,
        rows_with_weather = summary.rows_with_weather,
        rows_with_cpi = summary.rows_with_cpi,
        rows_with_unemployment = summary.rows_with_unemployment,
        "Sources merged"
    );

    Ok((records, summary))
}

fn neighbourhood_lookup(rows: &[NeighbourhoodRow]) -> HashMap<String, u16> {
    let mut lookup = HashMap::new();

    for row in rows {
        match parse_hood(&row.hood_158) {
            Some(hood) => {
                lookup.insert(normalize_address(&row.location_address), hood);
            }
            None => warn!(
                address = %row.location_address,
                hood = %row.hood_158,
                "Neighbourhood map entry has no usable code"
            ),
        }
    }

    lookup
}

/// Inserts `value` unless `key` is already present. Returns true when the
/// existing value differs.
fn insert_first<K, V>(lookup: &mut HashMap<K, V>, key: K, value: V) -> bool
where
    K: std::hash::Hash + Eq,
    V: PartialEq,
{
    match lookup.entry(key) {
        Entry::Occupied(existing) => *existing.get() != value,
        Entry::Vacant(slot) => {
            slot.insert(value);
            false
        }
    }
}

type WeatherLookup = HashMap<NaiveDate, (Option<f64>, Option<f64>)>;

fn weather_lookup(rows: &[WeatherRow]) -> (WeatherLookup, usize) {
    let mut lookup = HashMap::new();
    let mut conflicts = 0;

    for row in rows {
        let Some(date) = parse_date(&row.date) else {
            warn!(date = %row.date, "Skipping weather row with unrecognised date");
            continue;
        };
        if insert_first(&mut lookup, date, (row.mean_temp, row.total_precip)) {
            conflicts += 1;
        }
    }

    if conflicts > 0 {
        warn!(conflicts, "Weather dates repeated with different values; first row kept");
    }

    (lookup, conflicts)
}

fn monthly_lookup(rows: &[MonthlyRow], series: &str) -> (HashMap<(i32, u32), f64>, usize) {
    let mut lookup = HashMap::new();
    let mut conflicts = 0;

    for row in rows {
        match (parse_month(&row.ref_date), row.value) {
            (Some(key), Some(value)) => {
                if insert_first(&mut lookup, key, value) {
                    conflicts += 1;
                }
            }
            _ => warn!(series, ref_date = %row.ref_date, "Skipping unusable monthly value"),
        }
    }

    // Multi-region tables list one row per GEO for the same month.
    if conflicts > 0 {
        warn!(series, conflicts, "Months repeated with different values; first row kept");
    }

    (lookup, conflicts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shelter(date: &str, address: &str, capacity: f64, occupied: f64) -> ShelterRow {
        ShelterRow {
            occupancy_date: date.to_string(),
            program_id: "101".to_string(),
            location_name: "Test Shelter".to_string(),
            location_address: address.to_string(),
            sector: "Men".to_string(),
            capacity_type: "Bed Based Capacity".to_string(),
            capacity_actual_bed: Some(capacity),
            occupied_beds: Some(occupied),
            ..Default::default()
        }
    }

    fn sample_sources() -> Sources {
        Sources {
            shelter: vec![
                shelter("2022-01-01", "1 Main St", 10.0, 8.0),
                shelter("2022-01-02", "1 MAIN  ST", 10.0, 10.0),
                shelter("2022-02-01", "9 Nowhere Rd", 5.0, 1.0),
            ],
            crime: vec![
                CrimeRow {
                    occ_date: "2022-01-01".to_string(),
                    mci_category: "Assault".to_string(),
                    hood_158: "070".to_string(),
                },
                CrimeRow {
                    occ_date: "2022-01-01".to_string(),
                    mci_category: "Robbery".to_string(),
                    hood_158: "70".to_string(),
                },
            ],
            neighbourhoods: vec![NeighbourhoodRow {
                location_address: "1 Main St".to_string(),
                hood_158: "70".to_string(),
            }],
            weather: vec![
                WeatherRow {
                    date: "2022-01-01".to_string(),
                    mean_temp: Some(-5.5),
                    total_precip: Some(1.2),
                },
                WeatherRow {
                    date: "2022-01-02".to_string(),
                    mean_temp: Some(-3.0),
                    total_precip: None,
                },
            ],
            cpi: vec![MonthlyRow {
                ref_date: "2022-01".to_string(),
                value: Some(145.3),
            }],
            unemployment: vec![
                MonthlyRow {
                    ref_date: "2022-01".to_string(),
                    value: Some(6.5),
                },
                MonthlyRow {
                    ref_date: "2022-02".to_string(),
                    value: Some(6.1),
                },
            ],
        }
    }

    #[test]
    fn test_left_join_keeps_every_shelter_row() {
        let sources = sample_sources();
        let (records, summary) = merge_sources(&sources).unwrap();

        assert_eq!(records.len(), sources.shelter.len());
        assert_eq!(summary.merged_rows, 3);
        assert_eq!(summary.shelter_rows, 3);
    }

    #[test]
    fn test_crime_joined_on_date_and_hood() {
        let (records, summary) = merge_sources(&sample_sources()).unwrap();

        assert_eq!(records[0].hood_158, Some(70));
        assert_eq!(records[0].assault, 1);
        assert_eq!(records[0].robbery, 1);
        assert_eq!(summary.rows_with_crime, 1);
    }

    #[test]
    fn test_missing_crime_defaults_to_zero() {
        let (records, _) = merge_sources(&sample_sources()).unwrap();

        // Mapped neighbourhood but no events that day.
        assert_eq!(records[1].hood_158, Some(70));
        assert_eq!(records[1].assault, 0);
        assert_eq!(records[1].robbery, 0);
        assert_eq!(records[1].other_crime, 0);
    }

    #[test]
    fn test_weather_and_monthly_joins() {
        let (records, summary) = merge_sources(&sample_sources()).unwrap();

        assert_eq!(records[0].mean_temp, Some(-5.5));
        assert_eq!(records[1].total_precip, None);
        assert_eq!(records[2].mean_temp, None);
        assert_eq!(records[0].cpi, Some(145.3));
        assert_eq!(records[2].cpi, None);
        assert_eq!(records[2].unemployment_rate, Some(6.1));

        assert_eq!(summary.rows_with_weather, 2);
        assert_eq!(summary.rows_with_cpi, 2);
        assert_eq!(summary.rows_with_unemployment, 3);
    }

    #[test]
    fn test_unmapped_locations_reported() {
        let (records, summary) = merge_sources(&sample_sources()).unwrap();

        assert_eq!(records[2].hood_158, None);
        assert_eq!(summary.unmapped_rows, 1);
        assert_eq!(summary.unmapped_locations, vec!["9 Nowhere Rd".to_string()]);
    }

    #[test]
    fn test_short_us_date_merged() {
        let mut sources = sample_sources();
        sources.shelter.push(shelter("01/31/22", "1 Main St", 4.0, 1.0));

        let (records, summary) = merge_sources(&sources).unwrap();
        assert_eq!(records.len(), sources.shelter.len());
        assert_eq!(summary.merged_rows, summary.shelter_rows);
        assert_eq!(records[3].date, NaiveDate::from_ymd_opt(2022, 1, 31).unwrap());
    }

    #[test]
    fn test_unparseable_shelter_date_is_an_error() {
        let mut sources = sample_sources();
        sources.shelter.push(shelter("someday", "1 Main St", 1.0, 0.0));

        let err = merge_sources(&sources).unwrap_err();
        assert!(err.to_string().contains("someday"));
    }

    #[test]
    fn test_conflicting_monthly_values_counted() {
        let mut sources = sample_sources();
        sources.cpi.push(MonthlyRow {
            ref_date: "2022-01".to_string(),
            value: Some(99.0),
        });
        // An exact repeat is not a conflict.
        sources.unemployment.push(MonthlyRow {
            ref_date: "2022-02".to_string(),
            value: Some(6.1),
        });

        let (records, summary) = merge_sources(&sources).unwrap();
        assert_eq!(records[0].cpi, Some(145.3));
        assert_eq!(summary.conflicting_cpi_months, 1);
        assert_eq!(summary.conflicting_unemployment_months, 0);
    }

    #[test]
    fn test_conflicting_weather_counted() {
        let mut sources = sample_sources();
        sources.weather.push(WeatherRow {
            date: "2022-01-01".to_string(),
            mean_temp: Some(20.0),
            total_precip: None,
        });

        let (records, summary) = merge_sources(&sources).unwrap();
        assert_eq!(records[0].mean_temp, Some(-5.5));
        assert_eq!(summary.conflicting_weather_dates, 1);
    }

    #[test]
    fn test_availability_derived() {
        let (records, _) = merge_sources(&sample_sources()).unwrap();

        assert_eq!(records[0].total_available, 2.0);
        assert_eq!(records[0].available, 1);
        assert_eq!(records[1].available, 0);
    }
}
