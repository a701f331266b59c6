use std::path::PathBuf;

use thiserror::Error;

/// Missing or malformed swath metadata. Fatal for the pass it belongs to.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata field {0} is missing")]
    Missing(String),

    #[error("metadata field {key} has malformed value {value:?}")]
    Malformed { key: String, value: String },

    #[error(
        "corner ordering violated: upper-left ({x_upper_left}, {y_upper_left}) \
         must lie west and north of lower-right ({x_lower_right}, {y_lower_right})"
    )]
    InvertedRectangle {
        x_upper_left: f64,
        y_upper_left: f64,
        x_lower_right: f64,
        y_lower_right: f64,
    },

    #[error("pass ends ({end}) before it starts ({start})")]
    InvertedWindow { start: String, end: String },

    #[error("invalid UTC offset of {0} seconds")]
    InvalidOffset(i32),
}

/// Errors raised while building or reading an observation table.
#[derive(Debug, Error)]
pub enum ObservationError {
    #[error("structural error in table header: {0}")]
    Structural(String),

    #[error("markup error: {0}")]
    Markup(String),

    #[error("no observation table found in markup")]
    TableNotFound,

    #[error("interval {index} for {hour:02}:{minute:02} is outside the table ({rows} rows)")]
    IntervalOutOfRange {
        hour: u32,
        minute: u32,
        index: usize,
        rows: usize,
    },

    #[error("column {column} is outside the table ({columns} columns)")]
    ColumnOutOfRange { column: usize, columns: usize },
}

/// Errors from the two-stage band extraction.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("sub-dataset matching {selector:?} not found in {path:?}")]
    SubBandNotFound { selector: String, path: PathBuf },

    #[error("raster backend failed: {0}")]
    Backend(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from loading or addressing raster layers.
#[derive(Debug, Error)]
pub enum RasterError {
    #[error("raster {path:?} is unusable: {reason}")]
    Invalid { path: PathBuf, reason: String },

    #[error(transparent)]
    Gdal(#[from] gdal::errors::GdalError),
}

/// Errors reported by external collaborators.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{kind} {name:?} not found")]
    NotFound { kind: &'static str, name: String },

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Observation(#[from] ObservationError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Raster(#[from] RasterError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("input file not found: {0:?}")]
    InputNotFound(PathBuf),
}

pub type Result<T> = std::result::Result<T, Error>;
