//! Corner rectification of SGLI swaths.
//!
//! The swath products carry only their upper-left and lower-right corners in
//! geographic coordinates. The corners are mapped into a sphere-based
//! equal-area plane (ESRI:53008) with a local approximation that is valid
//! near the swath's own latitude band only.

use std::f64::consts::PI;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeDelta, Utc};

use crate::error::MetadataError;

pub const UPPER_LEFT_LON_KEY: &str = "Geometry_data_Upper_left_longitude";
pub const UPPER_LEFT_LAT_KEY: &str = "Geometry_data_Upper_left_latitude";
pub const LOWER_RIGHT_LON_KEY: &str = "Geometry_data_Lower_right_longitude";
pub const LOWER_RIGHT_LAT_KEY: &str = "Geometry_data_Lower_right_latitude";
pub const START_TIME_KEY: &str = "Global_attributes_Image_start_time";
pub const END_TIME_KEY: &str = "Global_attributes_Image_end_time";

/// Format of the image start/end attributes, e.g. `20240801 05:29:10.123`.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d %H:%M:%S%.f";

/// Mean earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;
pub const DEG_TO_RAD: f64 = 0.017_453_292_519_943_295;

/// JST, applied as a fixed offset.
pub const LOCAL_UTC_OFFSET_SECS: i32 = 9 * 3600;

/// Key/value access to a swath's global metadata.
pub trait MetadataLookup {
    fn metadata_value(&self, key: &str) -> Option<String>;
}

impl MetadataLookup for std::collections::HashMap<String, String> {
    fn metadata_value(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

fn required(metadata: &dyn MetadataLookup, key: &str) -> Result<String, MetadataError> {
    metadata
        .metadata_value(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| MetadataError::Missing(key.to_string()))
}

fn required_degrees(metadata: &dyn MetadataLookup, key: &str) -> Result<f64, MetadataError> {
    let value = required(metadata, key)?;
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or(MetadataError::Malformed {
            key: key.to_string(),
            value,
        })
}

fn required_timestamp(
    metadata: &dyn MetadataLookup,
    key: &str,
) -> Result<DateTime<Utc>, MetadataError> {
    let value = required(metadata, key)?;
    NaiveDateTime::parse_from_str(&value, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| MetadataError::Malformed {
            key: key.to_string(),
            value,
        })
}

/// Acquisition window of one pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverpassWindow {
    pub utc_start: DateTime<Utc>,
    pub utc_end: DateTime<Utc>,
    local_offset: FixedOffset,
}

impl OverpassWindow {
    pub fn new(utc_start: DateTime<Utc>, utc_end: DateTime<Utc>) -> Result<Self, MetadataError> {
        if utc_end < utc_start {
            return Err(MetadataError::InvertedWindow {
                start: utc_start.to_rfc3339(),
                end: utc_end.to_rfc3339(),
            });
        }
        let local_offset = FixedOffset::east_opt(LOCAL_UTC_OFFSET_SECS)
            .ok_or(MetadataError::InvalidOffset(LOCAL_UTC_OFFSET_SECS))?;
        Ok(Self {
            utc_start,
            utc_end,
            local_offset,
        })
    }

    pub fn local_start(&self) -> DateTime<FixedOffset> {
        self.utc_start.with_timezone(&self.local_offset)
    }

    pub fn local_end(&self) -> DateTime<FixedOffset> {
        self.utc_end.with_timezone(&self.local_offset)
    }

    /// `start + (end - start) / 2`, in local time.
    pub fn midpoint_local(&self) -> DateTime<FixedOffset> {
        let half: TimeDelta = (self.utc_end - self.utc_start) / 2;
        (self.utc_start + half).with_timezone(&self.local_offset)
    }
}

/// Corner coordinates and acquisition window read from one swath file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwathCornerMetadata {
    pub upper_left_lon: f64,
    pub upper_left_lat: f64,
    pub lower_right_lon: f64,
    pub lower_right_lat: f64,
    pub window: OverpassWindow,
}

impl SwathCornerMetadata {
    pub fn from_metadata(metadata: &dyn MetadataLookup) -> Result<Self, MetadataError> {
        let window = OverpassWindow::new(
            required_timestamp(metadata, START_TIME_KEY)?,
            required_timestamp(metadata, END_TIME_KEY)?,
        )?;
        Ok(Self {
            upper_left_lon: required_degrees(metadata, UPPER_LEFT_LON_KEY)?,
            upper_left_lat: required_degrees(metadata, UPPER_LEFT_LAT_KEY)?,
            lower_right_lon: required_degrees(metadata, LOWER_RIGHT_LON_KEY)?,
            lower_right_lat: required_degrees(metadata, LOWER_RIGHT_LAT_KEY)?,
            window,
        })
    }
}

/// Planar bounds in the equal-area frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedRectangle {
    pub x_upper_left: f64,
    pub y_upper_left: f64,
    pub x_lower_right: f64,
    pub y_lower_right: f64,
}

impl ProjectedRectangle {
    /// Bounds in `ulx uly lrx lry` order.
    pub fn as_ullr(&self) -> [f64; 4] {
        [
            self.x_upper_left,
            self.y_upper_left,
            self.x_lower_right,
            self.y_lower_right,
        ]
    }
}

/// `x = R * lon * cos(lat) * k`, `y = R * lat * k`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EqualAreaApprox {
    pub radius: f64,
    pub coeff: f64,
}

impl Default for EqualAreaApprox {
    fn default() -> Self {
        Self {
            radius: EARTH_RADIUS_M,
            coeff: DEG_TO_RAD,
        }
    }
}

impl EqualAreaApprox {
    pub fn project_point(&self, lon: f64, lat: f64) -> (f64, f64) {
        let x = self.radius * lon * (lat * PI / 180.0).cos() * self.coeff;
        let y = self.radius * lat * self.coeff;
        (x, y)
    }

    pub fn project(
        &self,
        corners: &SwathCornerMetadata,
    ) -> Result<ProjectedRectangle, MetadataError> {
        let (x_upper_left, y_upper_left) =
            self.project_point(corners.upper_left_lon, corners.upper_left_lat);
        let (x_lower_right, y_lower_right) =
            self.project_point(corners.lower_right_lon, corners.lower_right_lat);

        if y_upper_left < y_lower_right || x_upper_left > x_lower_right {
            return Err(MetadataError::InvertedRectangle {
                x_upper_left,
                y_upper_left,
                x_lower_right,
                y_lower_right,
            });
        }

        Ok(ProjectedRectangle {
            x_upper_left,
            y_upper_left,
            x_lower_right,
            y_lower_right,
        })
    }
}

/// Projects with the default earth radius and degree conversion.
pub fn project(corners: &SwathCornerMetadata) -> Result<ProjectedRectangle, MetadataError> {
    EqualAreaApprox::default().project(corners)
}
