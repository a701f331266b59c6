use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SourceError;
use crate::sampler::GeoPoint;

/// Identifies a station on the observation pages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StationId {
    /// Station class, `a` for AMeDAS or `s` for staffed observatories.
    pub kind: String,
    pub prec_no: u32,
    pub block_no: u32,
}

/// A ground station with its location and capabilities.
#[derive(Debug, Clone, PartialEq)]
pub struct StationPoint {
    pub name: String,
    pub id: StationId,
    pub lon: f64,
    pub lat: f64,
    pub is_valid: bool,
    pub has_temperature: bool,
}

impl StationPoint {
    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.lon, self.lat)
    }
}

/// On-disk form of one station. Unknown or missing keys are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct StationEntry {
    as_type: String,
    prec_no: u32,
    block_no: u32,
    is_valid: bool,
    has_temperature: bool,
    lon: f64,
    lat: f64,
}

impl StationEntry {
    fn into_point(self, name: String) -> StationPoint {
        StationPoint {
            name,
            id: StationId {
                kind: self.as_type,
                prec_no: self.prec_no,
                block_no: self.block_no,
            },
            lon: self.lon,
            lat: self.lat,
            is_valid: self.is_valid,
            has_temperature: self.has_temperature,
        }
    }

    fn from_point(point: &StationPoint) -> Self {
        Self {
            as_type: point.id.kind.clone(),
            prec_no: point.id.prec_no,
            block_no: point.id.block_no,
            is_valid: point.is_valid,
            has_temperature: point.has_temperature,
            lon: point.lon,
            lat: point.lat,
        }
    }
}

/// Supplies the stations of a region, keyed by station name.
pub trait StationCatalog {
    fn stations(&self, region: &str) -> Result<BTreeMap<String, StationPoint>, SourceError>;
}

/// Station catalog cached as `{region: {station: {...}}}` JSON.
#[derive(Debug, Clone, Default)]
pub struct JsonStationCatalog {
    regions: BTreeMap<String, BTreeMap<String, StationPoint>>,
}

impl JsonStationCatalog {
    pub fn load(path: &Path) -> Result<Self, SourceError> {
        let file = File::open(path).map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::from_reader(BufReader::new(file))?;
        tracing::info!(
            "Loaded station catalog {:?}: {} regions",
            path,
            catalog.regions.len()
        );
        Ok(catalog)
    }

    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self, SourceError> {
        let raw: BTreeMap<String, BTreeMap<String, StationEntry>> =
            serde_json::from_reader(reader)?;
        let regions = raw
            .into_iter()
            .map(|(region, entries)| {
                let stations = entries
                    .into_iter()
                    .map(|(name, entry)| (name.clone(), entry.into_point(name)))
                    .collect();
                (region, stations)
            })
            .collect();
        Ok(Self { regions })
    }

    pub fn insert_region(&mut self, region: &str, stations: Vec<StationPoint>) {
        self.regions.insert(
            region.to_string(),
            stations.into_iter().map(|s| (s.name.clone(), s)).collect(),
        );
    }

    pub fn to_json(&self) -> Result<String, SourceError> {
        let raw: BTreeMap<&str, BTreeMap<&str, StationEntry>> = self
            .regions
            .iter()
            .map(|(region, stations)| {
                let entries = stations
                    .iter()
                    .map(|(name, point)| (name.as_str(), StationEntry::from_point(point)))
                    .collect();
                (region.as_str(), entries)
            })
            .collect();
        Ok(serde_json::to_string_pretty(&raw)?)
    }

    pub fn region_names(&self) -> impl Iterator<Item = &str> {
        self.regions.keys().map(String::as_str)
    }

    /// First region whose name contains `needle`.
    pub fn find_region(&self, needle: &str) -> Option<&str> {
        self.region_names().find(|name| name.contains(needle))
    }

    pub fn station(&self, region: &str, name: &str) -> Result<&StationPoint, SourceError> {
        self.regions
            .get(region)
            .ok_or_else(|| SourceError::NotFound {
                kind: "region",
                name: region.to_string(),
            })?
            .get(name)
            .ok_or_else(|| SourceError::NotFound {
                kind: "station",
                name: name.to_string(),
            })
    }
}

impl StationCatalog for JsonStationCatalog {
    fn stations(&self, region: &str) -> Result<BTreeMap<String, StationPoint>, SourceError> {
        self.regions
            .get(region)
            .cloned()
            .ok_or_else(|| SourceError::NotFound {
                kind: "region",
                name: region.to_string(),
            })
    }
}

/// Stations that are in service and measure air temperature.
pub fn select_targets<I>(stations: I) -> Vec<StationPoint>
where
    I: IntoIterator<Item = StationPoint>,
{
    stations
        .into_iter()
        .filter(|s| s.is_valid && s.has_temperature)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"{
        "愛知県": {
            "名古屋": {"as_type": "s", "prec_no": 51, "block_no": 47636, "is_valid": true,
                      "has_temperature": true, "lon": 136.965, "lat": 35.166666666666664},
            "大府": {"as_type": "a", "prec_no": 51, "block_no": 1214, "is_valid": true,
                    "has_temperature": true, "lon": 136.95, "lat": 35.016666666666666},
            "旧局": {"as_type": "a", "prec_no": 51, "block_no": 9999, "is_valid": false,
                    "has_temperature": true, "lon": 137.0, "lat": 35.0}
        }
    }"#;

    #[test]
    fn test_load_catalog() {
        let catalog = JsonStationCatalog::from_reader(CATALOG.as_bytes()).unwrap();
        let region = catalog.find_region("愛知").unwrap().to_string();
        let stations = catalog.stations(&region).unwrap();
        assert_eq!(stations.len(), 3);

        let nagoya = catalog.station(&region, "名古屋").unwrap();
        assert_eq!(nagoya.id.kind, "s");
        assert_eq!(nagoya.id.block_no, 47636);
        assert_eq!(nagoya.location(), GeoPoint::new(136.965, 35.166666666666664));

        let targets = select_targets(stations.into_values());
        assert_eq!(targets.len(), 2);
        assert!(targets.iter().all(|s| s.is_valid));
    }

    #[test]
    fn test_unknown_and_missing_keys_are_rejected() {
        let unknown = r#"{"r": {"x": {"as_type": "a", "prec_no": 1, "block_no": 2, "is_valid": true,
            "has_temperature": true, "lon": 1.0, "lat": 2.0, "height": 3}}}"#;
        assert!(JsonStationCatalog::from_reader(unknown.as_bytes()).is_err());

        let missing = r#"{"r": {"x": {"as_type": "a", "prec_no": 1, "block_no": 2, "is_valid": true,
            "lon": 1.0, "lat": 2.0}}}"#;
        assert!(JsonStationCatalog::from_reader(missing.as_bytes()).is_err());
    }

    #[test]
    fn test_missing_names() {
        let catalog = JsonStationCatalog::from_reader(CATALOG.as_bytes()).unwrap();
        assert!(matches!(
            catalog.stations("北海道"),
            Err(SourceError::NotFound { kind: "region", .. })
        ));
        assert!(matches!(
            catalog.station("愛知県", "豊橋"),
            Err(SourceError::NotFound { kind: "station", .. })
        ));
    }

    #[test]
    fn test_json_round_trip_keeps_stations() {
        let catalog = JsonStationCatalog::from_reader(CATALOG.as_bytes()).unwrap();
        let json = catalog.to_json().unwrap();
        let reloaded = JsonStationCatalog::from_reader(json.as_bytes()).unwrap();
        assert_eq!(
            reloaded.stations("愛知県").unwrap(),
            catalog.stations("愛知県").unwrap()
        );
    }
}
