//! Interfaces of the external collaborators, plus the local implementations
//! the batch runner uses.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::SourceError;
use crate::station::StationPoint;

/// Geographic bounding box, always held as `[lon_min, lat_min, lon_max, lat_max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub lon_min: f64,
    pub lat_min: f64,
    pub lon_max: f64,
    pub lat_max: f64,
}

impl BoundingBox {
    /// Builds a box from two opposite corners given in any order.
    pub fn from_corners((lon_a, lat_a): (f64, f64), (lon_b, lat_b): (f64, f64)) -> Self {
        Self {
            lon_min: lon_a.min(lon_b),
            lat_min: lat_a.min(lat_b),
            lon_max: lon_a.max(lon_b),
            lat_max: lat_a.max(lat_b),
        }
    }

    pub fn as_array(&self) -> [f64; 4] {
        [self.lon_min, self.lat_min, self.lon_max, self.lat_max]
    }

    /// Comma separated, canonical order.
    pub fn to_query_value(&self) -> String {
        self.as_array()
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        (self.lon_min..=self.lon_max).contains(&lon) && (self.lat_min..=self.lat_max).contains(&lat)
    }
}

/// Extent of a boundary geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl Extent {
    pub fn combine(&self, other: &Extent) -> Extent {
        Extent {
            x_min: self.x_min.min(other.x_min),
            y_min: self.y_min.min(other.y_min),
            x_max: self.x_max.max(other.x_max),
            y_max: self.y_max.max(other.y_max),
        }
    }

    /// Combined extent of several geometries.
    pub fn combine_all<'a, I>(extents: I) -> Option<Extent>
    where
        I: IntoIterator<Item = &'a Extent>,
    {
        extents.into_iter().fold(None, |acc: Option<Extent>, e| {
            Some(acc.map_or(*e, |a| a.combine(e)))
        })
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_corners((self.x_min, self.y_min), (self.x_max, self.y_max))
    }
}

/// Lists product identifiers of a dataset over a time range and area.
pub trait RecordCatalog {
    fn product_ids(
        &self,
        dataset_id: &str,
        utc_start: DateTime<Utc>,
        utc_end: DateTime<Utc>,
        bbox: &BoundingBox,
    ) -> Result<Vec<String>, SourceError>;
}

/// Materialises a product as a local file.
pub trait ProductFetcher {
    fn fetch(&self, product_id: &str) -> Result<PathBuf, SourceError>;
}

/// Supplies the combined extent of a region's boundary geometry.
pub trait BoundarySource {
    fn extent(&self, region: &str) -> Result<Extent, SourceError>;
}

/// Supplies the raw 10-minute observation markup of a station for one day.
pub trait ObservationSource {
    fn fetch_markup(&self, station: &StationPoint, date: NaiveDate) -> Result<String, SourceError>;
}

/// Products already downloaded into one directory.
#[derive(Debug, Clone)]
pub struct LocalProductStore {
    dir: PathBuf,
}

impl LocalProductStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Local path for a product id or URL: its last path segment under the
    /// store directory.
    pub fn path_for(&self, product_id: &str) -> PathBuf {
        let file_name = product_id
            .rsplit('/')
            .next()
            .unwrap_or(product_id)
            .split(['?', '#'])
            .next()
            .unwrap_or_default();
        self.dir.join(file_name)
    }
}

impl ProductFetcher for LocalProductStore {
    fn fetch(&self, product_id: &str) -> Result<PathBuf, SourceError> {
        let path = self.path_for(product_id);
        if path.is_file() {
            Ok(path)
        } else {
            Err(SourceError::NotFound {
                kind: "product",
                name: path.display().to_string(),
            })
        }
    }
}

/// Observation pages saved as `<kind>_<prec>_<block>_<YYYYMMDD>.html`.
#[derive(Debug, Clone)]
pub struct MarkupDirectorySource {
    dir: PathBuf,
}

impl MarkupDirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, station: &StationPoint, date: NaiveDate) -> PathBuf {
        self.dir.join(format!(
            "{}_{}_{}_{}.html",
            station.id.kind,
            station.id.prec_no,
            station.id.block_no,
            date.format("%Y%m%d")
        ))
    }
}

impl ObservationSource for MarkupDirectorySource {
    fn fetch_markup(&self, station: &StationPoint, date: NaiveDate) -> Result<String, SourceError> {
        let path = self.path_for(station, date);
        if !path.is_file() {
            return Err(SourceError::NotFound {
                kind: "observation page",
                name: path.display().to_string(),
            });
        }
        std::fs::read_to_string(&path).map_err(|source| SourceError::Io { path, source })
    }
}
