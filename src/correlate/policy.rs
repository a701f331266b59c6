use std::ops::RangeInclusive;

use crate::quality::{QualityCondition, QualityFlags};

/// Ground-truth column marker on the 10-minute pages.
pub const TEMPERATURE_COLUMN: &str = "気温";
/// Stand-in for a ground-truth cell that is not a number.
pub const PARSE_FAILURE_SENTINEL: f64 = -9999.0;
/// Scale factor of the LST band, raw to Kelvin.
pub const LST_SCALE: f64 = 0.02;
/// Kelvin to Celsius, as applied to the scaled LST.
pub const LST_OFFSET: f64 = -273.0;

/// What to do when the quality band has no value at a station.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingQuality {
    /// Drop the station from the pass.
    Exclude,
    /// Treat the pixel as if every flag were clear.
    AssumeClear,
}

/// Admission rules applied before a comparison is emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterPolicy {
    pub excluded_conditions: Vec<QualityCondition>,
    pub target_column: String,
    pub ground_truth_range: RangeInclusive<f64>,
    pub parse_failure_sentinel: f64,
    /// Local hours (inclusive) a pass midpoint must fall in. `None` keeps every pass.
    pub local_hours: Option<RangeInclusive<u32>>,
    pub missing_quality: MissingQuality,
    /// Keep comparisons whose ground truth could not be looked up.
    pub keep_unavailable: bool,
    pub scale: f64,
    pub offset: f64,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self {
            excluded_conditions: vec![QualityCondition::NoInputData, QualityCondition::Cloudy],
            target_column: TEMPERATURE_COLUMN.to_string(),
            ground_truth_range: -50.0..=60.0,
            parse_failure_sentinel: PARSE_FAILURE_SENTINEL,
            local_hours: None,
            missing_quality: MissingQuality::Exclude,
            keep_unavailable: true,
            scale: LST_SCALE,
            offset: LST_OFFSET,
        }
    }
}

impl FilterPolicy {
    pub fn admits_hour(&self, hour: u32) -> bool {
        self.local_hours
            .as_ref()
            .map_or(true, |hours| hours.contains(&hour))
    }

    /// First excluded condition set in `flags`.
    pub fn rejecting_condition(&self, flags: &QualityFlags) -> Option<QualityCondition> {
        self.excluded_conditions
            .iter()
            .copied()
            .find(|&condition| flags.is_set(condition))
    }

    /// Parses a ground-truth cell; anything unparsable becomes the sentinel.
    pub fn parse_ground_truth(&self, cell: &str) -> f64 {
        cell.trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .unwrap_or(self.parse_failure_sentinel)
    }

    pub fn admits_ground_truth(&self, value: f64) -> bool {
        self.ground_truth_range.contains(&value)
    }

    /// Raw LST to degrees Celsius.
    pub fn to_physical(&self, raw: f64) -> f64 {
        raw * self.scale + self.offset
    }
}
