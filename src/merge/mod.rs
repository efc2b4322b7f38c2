//! Building the analysis table.
//!
//! Shelter occupancy rows are left-joined with crime counts (pivoted to one
//! column per Major Crime Indicator), daily weather and monthly CPI and
//! unemployment, then cleaned and validated before modelling.

pub mod clean;
pub mod crime;
pub mod join;
pub mod types;

pub use clean::{CleaningSummary, clean, validate};
pub use join::{MergeSummary, Sources, merge_sources};
pub use types::MergedRecord;
