//! Record types read from the source CSVs and the merged table they produce.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single row of the daily shelter occupancy export.
///
/// Bed-based programs leave the room columns blank and vice versa.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShelterRow {
    #[serde(rename = "OCCUPANCY_DATE")]
    pub(crate) occupancy_date: String,
    #[serde(rename = "PROGRAM_ID", default)]
    pub(crate) program_id: String,
    #[serde(rename = "LOCATION_NAME", default)]
    pub(crate) location_name: String,
    #[serde(rename = "LOCATION_ADDRESS", default)]
    pub(crate) location_address: String,
    #[serde(rename = "SECTOR", default)]
    pub(crate) sector: String,
    #[serde(rename = "PROGRAM_MODEL", default)]
    pub(crate) program_model: String,
    #[serde(rename = "OVERNIGHT_SERVICE_TYPE", default)]
    pub(crate) overnight_service_type: String,
    #[serde(rename = "CAPACITY_TYPE", default)]
    pub(crate) capacity_type: String,

    #[serde(rename = "CAPACITY_ACTUAL_BED", default)]
    pub(crate) capacity_actual_bed: Option<f64>,
    #[serde(rename = "OCCUPIED_BEDS", default)]
    pub(crate) occupied_beds: Option<f64>,
    #[serde(rename = "CAPACITY_ACTUAL_ROOM", default)]
    pub(crate) capacity_actual_room: Option<f64>,
    #[serde(rename = "OCCUPIED_ROOMS", default)]
    pub(crate) occupied_rooms: Option<f64>,
}

/// One reported Major Crime Indicator event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CrimeRow {
    #[serde(rename = "OCC_DATE")]
    pub(crate) occ_date: String,
    #[serde(rename = "MCI_CATEGORY", default)]
    pub(crate) mci_category: String,
    #[serde(rename = "HOOD_158", default)]
    pub(crate) hood_158: String,
}

/// Manually compiled mapping from a shelter address to its neighbourhood.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NeighbourhoodRow {
    #[serde(rename = "LOCATION_ADDRESS")]
    pub(crate) location_address: String,
    #[serde(rename = "HOOD_158")]
    pub(crate) hood_158: String,
}

/// Daily climate observation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WeatherRow {
    #[serde(rename = "Date/Time")]
    pub(crate) date: String,
    #[serde(rename = "Mean Temp (°C)", default)]
    pub(crate) mean_temp: Option<f64>,
    #[serde(rename = "Total Precip (mm)", default)]
    pub(crate) total_precip: Option<f64>,
}

/// Monthly economic series (CPI, unemployment rate) in the `REF_DATE,VALUE`
/// layout used by the statistical agency tables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MonthlyRow {
    #[serde(rename = "REF_DATE")]
    pub(crate) ref_date: String,
    #[serde(rename = "VALUE", default)]
    pub(crate) value: Option<f64>,
}

/// Major Crime Indicator categories tracked as separate columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MciCategory {
    Assault,
    AutoTheft,
    BreakAndEnter,
    Robbery,
    TheftOver,
}

impl MciCategory {
    /// Matches the dataset's category labels, ignoring case and spacing.
    pub fn from_label(label: &str) -> Option<Self> {
        let key: String = label
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();

        match key.as_str() {
            "assault" => Some(Self::Assault),
            "autotheft" => Some(Self::AutoTheft),
            "breakandenter" => Some(Self::BreakAndEnter),
            "robbery" => Some(Self::Robbery),
            "theftover" => Some(Self::TheftOver),
            _ => None,
        }
    }
}

/// Per-category crime counts for one (date, neighbourhood) key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrimeCounts {
    pub assault: u32,
    pub auto_theft: u32,
    pub break_and_enter: u32,
    pub robbery: u32,
    pub theft_over: u32,
    /// Events whose category is not one of the tracked indicators.
    pub other: u32,
}

impl CrimeCounts {
    pub fn record(&mut self, category: Option<MciCategory>) {
        match category {
            Some(MciCategory::Assault) => self.assault += 1,
            Some(MciCategory::AutoTheft) => self.auto_theft += 1,
            Some(MciCategory::BreakAndEnter) => self.break_and_enter += 1,
            Some(MciCategory::Robbery) => self.robbery += 1,
            Some(MciCategory::TheftOver) => self.theft_over += 1,
            None => self.other += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.assault
            + self.auto_theft
            + self.break_and_enter
            + self.robbery
            + self.theft_over
            + self.other
    }
}

/// One row of the merged analysis table: a shelter program on a date, with
/// every joined covariate and the derived availability fields.
///
/// Crime counts are flattened into columns so the record round-trips through
/// CSV unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergedRecord {
    pub date: NaiveDate,
    pub year: i32,
    pub month: u32,
    pub program_id: String,
    pub location_name: String,
    pub location_address: String,
    pub sector: String,
    pub program_model: String,
    pub overnight_service_type: String,
    pub capacity_type: String,
    pub hood_158: Option<u16>,

    pub capacity_actual_bed: Option<f64>,
    pub occupied_beds: Option<f64>,
    pub capacity_actual_room: Option<f64>,
    pub occupied_rooms: Option<f64>,

    pub assault: u32,
    pub auto_theft: u32,
    pub break_and_enter: u32,
    pub robbery: u32,
    pub theft_over: u32,
    pub other_crime: u32,

    pub mean_temp: Option<f64>,
    pub total_precip: Option<f64>,
    pub cpi: Option<f64>,
    pub unemployment_rate: Option<f64>,

    pub total_capacity: f64,
    pub total_occupied: f64,
    pub total_available: f64,
    /// 1 when at least one bed or room is free.
    pub available: u8,
    pub availability_rate: Option<f64>,
}

impl MergedRecord {
    /// Recomputes the capacity totals and availability indicators from the
    /// bed and room columns. Missing counts contribute zero.
    pub fn derive_availability(&mut self) {
        self.total_capacity =
            self.capacity_actual_bed.unwrap_or(0.0) + self.capacity_actual_room.unwrap_or(0.0);
        self.total_occupied =
            self.occupied_beds.unwrap_or(0.0) + self.occupied_rooms.unwrap_or(0.0);
        self.total_available = self.total_capacity - self.total_occupied;
        self.available = u8::from(self.total_available > 0.0);
        self.availability_rate = if self.total_capacity > 0.0 {
            Some(self.total_available / self.total_capacity)
        } else {
            None
        };
    }

    pub fn set_crime(&mut self, counts: CrimeCounts) {
        self.assault = counts.assault;
        self.auto_theft = counts.auto_theft;
        self.break_and_enter = counts.break_and_enter;
        self.robbery = counts.robbery;
        self.theft_over = counts.theft_over;
        self.other_crime = counts.other;
    }
}
