//! Pairs sampled swath values with ground observations.

pub mod policy;
pub mod record;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Timelike};
use tracing::{debug, info, warn};

use crate::observation::ObservationTable;
use crate::quality::QualityFlags;
use crate::sampler::{RasterLayer, Sample};
use crate::sources::ObservationSource;
use crate::station::{StationId, StationPoint};

pub use policy::{FilterPolicy, MissingQuality};
pub use record::{CorrelationRecord, GroundTruth, StationComparison};

/// Both band samples at one station.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StationSample {
    pub primary: Sample,
    pub quality: Sample,
}

impl StationSample {
    pub fn hit(&self) -> bool {
        self.primary.hit() || self.quality.hit()
    }
}

/// Samples of one pass, in the engine's station order.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledPass {
    pub label: String,
    pub timestamp: DateTime<FixedOffset>,
    pub samples: Vec<StationSample>,
}

impl SampledPass {
    /// True when some station hit on either band.
    pub fn is_admissible(&self) -> bool {
        self.samples.iter().any(StationSample::hit)
    }
}

pub struct CorrelationEngine<O> {
    stations: Vec<StationPoint>,
    observations: O,
    policy: FilterPolicy,
    tables: HashMap<(StationId, NaiveDate), Option<Arc<ObservationTable>>>,
}

impl<O: ObservationSource> CorrelationEngine<O> {
    pub fn new(stations: Vec<StationPoint>, observations: O, policy: FilterPolicy) -> Self {
        Self {
            stations,
            observations,
            policy,
            tables: HashMap::new(),
        }
    }

    pub fn stations(&self) -> &[StationPoint] {
        &self.stations
    }

    pub fn policy(&self) -> &FilterPolicy {
        &self.policy
    }

    pub fn observations(&self) -> &O {
        &self.observations
    }

    /// Samples both bands at every station.
    pub fn sample(
        &self,
        label: &str,
        timestamp: DateTime<FixedOffset>,
        primary: &RasterLayer,
        quality: &RasterLayer,
    ) -> SampledPass {
        let samples = self
            .stations
            .iter()
            .map(|station| {
                let point = station.location();
                StationSample {
                    primary: primary.sample(point),
                    quality: quality.sample(point),
                }
            })
            .collect();
        SampledPass {
            label: label.to_string(),
            timestamp,
            samples,
        }
    }

    /// Applies the filter policy and matches ground truth. Returns `None`
    /// when the pass is discarded or no station survives.
    pub fn correlate(&mut self, sampled: &SampledPass) -> Option<CorrelationRecord> {
        if !sampled.is_admissible() {
            info!("No station hit in {} ({})", sampled.label, sampled.timestamp);
            return None;
        }

        let hour = sampled.timestamp.hour();
        if !self.policy.admits_hour(hour) {
            info!(
                "Skipping {}: local hour {} outside {:?}",
                sampled.label, hour, self.policy.local_hours
            );
            return None;
        }

        let mut comparisons = Vec::new();
        for (index, sample) in sampled.samples.iter().enumerate() {
            if let Some(comparison) = self.compare_station(index, sample, &sampled.timestamp) {
                comparisons.push(comparison);
            }
        }

        if comparisons.is_empty() {
            info!(
                "No admissible station comparison in {} ({})",
                sampled.label, sampled.timestamp
            );
            return None;
        }

        Some(CorrelationRecord {
            label: sampled.label.clone(),
            timestamp: sampled.timestamp,
            comparisons,
        })
    }

    /// Samples then correlates one pass.
    pub fn process(
        &mut self,
        label: &str,
        timestamp: DateTime<FixedOffset>,
        primary: &RasterLayer,
        quality: &RasterLayer,
    ) -> Option<CorrelationRecord> {
        let sampled = self.sample(label, timestamp, primary, quality);
        self.correlate(&sampled)
    }

    fn compare_station(
        &mut self,
        index: usize,
        sample: &StationSample,
        timestamp: &DateTime<FixedOffset>,
    ) -> Option<StationComparison> {
        let name = self.stations[index].name.clone();

        let Some(raw_value) = sample.primary.value() else {
            debug!("{}: no LST value", name);
            return None;
        };

        let quality = match (sample.quality, self.policy.missing_quality) {
            (Sample::Hit(v), _) => QualityFlags::from_sample(v),
            (Sample::Miss, MissingQuality::AssumeClear) => QualityFlags::default(),
            (Sample::Miss, MissingQuality::Exclude) => {
                debug!("{}: no quality flag value", name);
                return None;
            }
        };
        if let Some(condition) = self.policy.rejecting_condition(&quality) {
            debug!("{}: excluded by quality flag '{}'", name, condition);
            return None;
        }

        let date = timestamp.date_naive();
        let ground_truth = match self.table_for(index, date) {
            None => GroundTruth::Unavailable,
            Some(table) => {
                let Some(column) = table.find_column(&self.policy.target_column) else {
                    warn!(
                        "{}: no column containing {:?} on {}",
                        name, self.policy.target_column, date
                    );
                    return None;
                };
                match table.value_at(column, timestamp.hour(), timestamp.minute()) {
                    Ok(cell) => {
                        let value = self.policy.parse_ground_truth(cell);
                        if !self.policy.admits_ground_truth(value) {
                            debug!("{}: ground truth {:?} out of range", name, cell);
                            return None;
                        }
                        GroundTruth::Observed(value)
                    }
                    Err(e) => {
                        warn!("{}: {}", name, e);
                        GroundTruth::Unavailable
                    }
                }
            }
        };

        if ground_truth == GroundTruth::Unavailable && !self.policy.keep_unavailable {
            return None;
        }

        Some(StationComparison {
            station: name,
            raw_value,
            value_celsius: self.policy.to_physical(raw_value),
            quality,
            ground_truth,
        })
    }

    /// Observation table of a station for a local date, fetched once.
    fn table_for(&mut self, index: usize, date: NaiveDate) -> Option<Arc<ObservationTable>> {
        let station = &self.stations[index];
        let key = (station.id.clone(), date);
        if let Some(cached) = self.tables.get(&key) {
            return cached.clone();
        }

        let table = match self.observations.fetch_markup(station, date) {
            Ok(markup) => match ObservationTable::from_markup(&markup) {
                Ok(table) => Some(Arc::new(table)),
                Err(e) => {
                    warn!("{} on {}: {}", station.name, date, e);
                    None
                }
            },
            Err(e) => {
                warn!("{} on {}: {}", station.name, date, e);
                None
            }
        };
        self.tables.insert(key, table.clone());
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::quality::QualityCondition;
    use chrono::TimeZone;
    use std::cell::Cell;

    struct FixedPages {
        markup: Option<String>,
        fetches: Cell<usize>,
    }

    impl ObservationSource for FixedPages {
        fn fetch_markup(
            &self,
            station: &StationPoint,
            _date: NaiveDate,
        ) -> Result<String, SourceError> {
            self.fetches.set(self.fetches.get() + 1);
            self.markup.clone().ok_or_else(|| SourceError::NotFound {
                kind: "observation page",
                name: station.name.clone(),
            })
        }
    }

    fn page(temperature: &str) -> String {
        let rows: String = (1..=144)
            .map(|i| {
                format!(
                    "<tr style=\"text-align:right;\"><td>{:02}:{:02}</td><td>{}</td></tr>",
                    i / 6,
                    (i % 6) * 10,
                    temperature
                )
            })
            .collect();
        format!(
            "<table id=\"tablefix1\"><tr><th>時分</th><th>気温(℃)</th></tr>{rows}</table>"
        )
    }

    fn station(name: &str, block_no: u32, lon: f64) -> StationPoint {
        StationPoint {
            name: name.to_string(),
            id: StationId {
                kind: "a".to_string(),
                prec_no: 51,
                block_no,
            },
            lon,
            lat: 35.1,
            is_valid: true,
            has_temperature: true,
        }
    }

    fn engine(markup: Option<String>, policy: FilterPolicy) -> CorrelationEngine<FixedPages> {
        CorrelationEngine::new(
            vec![station("西", 1, 136.2), station("中", 2, 136.7), station("東", 3, 137.2)],
            FixedPages {
                markup,
                fetches: Cell::new(0),
            },
            policy,
        )
    }

    fn layer(values: Vec<f64>) -> RasterLayer {
        RasterLayer::new(
            "layer",
            [136.0, 0.5, 0.0, 35.5, 0.0, -0.5],
            (3, 1),
            Some(65535.0),
            values,
        )
        .unwrap()
    }

    fn timestamp(hour: u32, minute: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(9 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 8, 1, hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn test_clear_pass_produces_comparisons() {
        let mut engine = engine(Some(page("29.5")), FilterPolicy::default());
        let record = engine
            .process(
                "pass",
                timestamp(10, 31),
                &layer(vec![15000.0, 65535.0, 15100.0]),
                &layer(vec![0.0, 0.0, 2048.0]),
            )
            .unwrap();

        assert_eq!(record.timestamp, timestamp(10, 31));
        let names: Vec<&str> = record.comparisons.iter().map(|c| c.station.as_str()).collect();
        assert_eq!(names, vec!["西", "東"]);
        assert!((record.comparisons[0].value_celsius - 27.0).abs() < 1e-9);
        assert_eq!(record.comparisons[0].ground_truth, GroundTruth::Observed(29.5));
        assert!(record.comparisons[1].quality.is_set(QualityCondition::ProbablyCloudy));
        // one fetch per station, cached afterwards
        assert_eq!(engine.observations().fetches.get(), 2);
        engine
            .process(
                "again",
                timestamp(10, 41),
                &layer(vec![15000.0, 65535.0, 15100.0]),
                &layer(vec![0.0; 3]),
            )
            .unwrap();
        assert_eq!(engine.observations().fetches.get(), 2);
    }

    #[test]
    fn test_pass_without_hits_is_discarded() {
        let mut engine = engine(Some(page("29.5")), FilterPolicy::default());
        let sampled = engine.sample(
            "empty",
            timestamp(10, 30),
            &layer(vec![65535.0; 3]),
            &layer(vec![65535.0; 3]),
        );
        assert!(!sampled.is_admissible());
        assert!(engine.correlate(&sampled).is_none());
        assert_eq!(engine.observations().fetches.get(), 0);
    }

    #[test]
    fn test_cloudy_pixels_are_excluded() {
        let mut engine = engine(Some(page("29.5")), FilterPolicy::default());
        let record = engine.process(
            "cloudy",
            timestamp(10, 30),
            &layer(vec![15000.0, 15000.0, 15000.0]),
            &layer(vec![4096.0, 1.0, 4097.0]),
        );
        assert!(record.is_none());
    }

    #[test]
    fn test_missing_quality_handling() {
        let primary = layer(vec![15000.0, 65535.0, 65535.0]);
        let quality = layer(vec![65535.0; 3]);

        let mut strict = engine(Some(page("29.5")), FilterPolicy::default());
        assert!(strict.process("p", timestamp(10, 30), &primary, &quality).is_none());

        let mut lenient = engine(
            Some(page("29.5")),
            FilterPolicy {
                missing_quality: MissingQuality::AssumeClear,
                ..Default::default()
            },
        );
        let record = lenient.process("p", timestamp(10, 30), &primary, &quality).unwrap();
        assert_eq!(record.comparisons.len(), 1);
        assert_eq!(record.comparisons[0].quality.raw(), 0);
    }

    #[test]
    fn test_unparsable_ground_truth_is_excluded() {
        let mut engine = engine(Some(page("///")), FilterPolicy::default());
        let record = engine.process(
            "p",
            timestamp(10, 30),
            &layer(vec![15000.0, 65535.0, 65535.0]),
            &layer(vec![0.0; 3]),
        );
        assert!(record.is_none());
    }

    #[test]
    fn test_unavailable_ground_truth() {
        let primary = layer(vec![15000.0, 65535.0, 65535.0]);
        let quality = layer(vec![0.0; 3]);

        let mut keep = engine(None, FilterPolicy::default());
        let record = keep.process("p", timestamp(10, 30), &primary, &quality).unwrap();
        assert_eq!(record.comparisons[0].ground_truth, GroundTruth::Unavailable);

        let mut dropping = engine(
            None,
            FilterPolicy {
                keep_unavailable: false,
                ..Default::default()
            },
        );
        assert!(dropping.process("p", timestamp(10, 30), &primary, &quality).is_none());
    }

    #[test]
    fn test_malformed_header_leaves_ground_truth_unavailable() {
        let markup = "<table><tr><th rowspan=\"2\">時分</th>\
                      <th colspan=\"4000000000000000000\">気温</th></tr></table>"
            .to_string();
        let mut engine = engine(Some(markup), FilterPolicy::default());
        let record = engine
            .process(
                "p",
                timestamp(10, 30),
                &layer(vec![15000.0, 65535.0, 65535.0]),
                &layer(vec![0.0; 3]),
            )
            .unwrap();
        assert_eq!(record.comparisons[0].ground_truth, GroundTruth::Unavailable);
    }

    #[test]
    fn test_missing_column_skips_station() {
        let markup = "<table><tr><th>時分</th><th>湿度(%)</th></tr>\
                      <tr style=\"x\"><td>00:10</td><td>80</td></tr></table>"
            .to_string();
        let mut engine = engine(Some(markup), FilterPolicy::default());
        let record = engine.process(
            "p",
            timestamp(0, 5),
            &layer(vec![15000.0, 65535.0, 65535.0]),
            &layer(vec![0.0; 3]),
        );
        assert!(record.is_none());
    }

    #[test]
    fn test_hour_cutoff_excludes_record() {
        let policy = FilterPolicy {
            local_hours: Some(6..=18),
            ..Default::default()
        };
        let mut engine = engine(Some(page("25.0")), policy);
        let primary = layer(vec![15000.0, 65535.0, 65535.0]);
        let quality = layer(vec![0.0; 3]);
        assert!(engine.process("night", timestamp(22, 30), &primary, &quality).is_none());
        assert!(engine.process("day", timestamp(12, 30), &primary, &quality).is_some());
    }
}
