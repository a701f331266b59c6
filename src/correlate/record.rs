use chrono::{DateTime, FixedOffset};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::quality::QualityFlags;

/// Ground truth matched to one station sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroundTruth {
    Observed(f64),
    Unavailable,
}

impl GroundTruth {
    pub fn value(&self) -> Option<f64> {
        match self {
            GroundTruth::Observed(v) => Some(*v),
            GroundTruth::Unavailable => None,
        }
    }
}

fn serialize_flags<S: Serializer>(flags: &QualityFlags, serializer: S) -> Result<S::Ok, S::Error> {
    let names: Vec<&str> = flags.set_conditions().into_iter().map(|c| c.name()).collect();
    let mut state = serializer.serialize_struct("QualityFlags", 2)?;
    state.serialize_field("raw", &flags.raw())?;
    state.serialize_field("conditions", &names)?;
    state.end()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationComparison {
    pub station: String,
    pub raw_value: f64,
    pub value_celsius: f64,
    #[serde(serialize_with = "serialize_flags")]
    pub quality: QualityFlags,
    pub ground_truth: GroundTruth,
}

impl StationComparison {
    /// Satellite minus ground, when the ground value is known.
    pub fn difference(&self) -> Option<f64> {
        self.ground_truth.value().map(|g| self.value_celsius - g)
    }
}

/// One admitted pass: its local midpoint and the surviving comparisons.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationRecord {
    pub label: String,
    pub timestamp: DateTime<FixedOffset>,
    pub comparisons: Vec<StationComparison>,
}
