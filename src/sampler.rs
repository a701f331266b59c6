use std::path::{Path, PathBuf};

use gdal::Dataset;

use crate::error::RasterError;

/// A geographic point, longitude first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

/// Result of looking up one raster cell.
///
/// A miss carries no value. Callers that want a numeric stand-in have to
/// ask for one through [`Sample::value_or`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    Hit(f64),
    Miss,
}

impl Sample {
    pub fn hit(&self) -> bool {
        matches!(self, Sample::Hit(_))
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Sample::Hit(v) => Some(*v),
            Sample::Miss => None,
        }
    }

    pub fn value_or(&self, substitute: f64) -> f64 {
        self.value().unwrap_or(substitute)
    }
}

/// A single-band, north-up raster held in memory.
#[derive(Debug, Clone)]
pub struct RasterLayer {
    name: String,
    geo_transform: [f64; 6],
    cols: usize,
    rows: usize,
    no_data: Option<f64>,
    values: Vec<f64>,
}

impl RasterLayer {
    pub fn new(
        name: impl Into<String>,
        geo_transform: [f64; 6],
        (cols, rows): (usize, usize),
        no_data: Option<f64>,
        values: Vec<f64>,
    ) -> Result<Self, RasterError> {
        let name = name.into();
        if values.len() != cols * rows {
            return Err(RasterError::Invalid {
                path: PathBuf::from(&name),
                reason: format!("{} values for a {}x{} grid", values.len(), cols, rows),
            });
        }
        if geo_transform[1] == 0.0 || geo_transform[5] == 0.0 {
            return Err(RasterError::Invalid {
                path: PathBuf::from(&name),
                reason: "zero pixel size in geo transform".to_string(),
            });
        }
        if geo_transform[2] != 0.0 || geo_transform[4] != 0.0 {
            tracing::warn!(
                "Raster {} has rotation terms ({}, {}); sampling assumes north-up",
                name,
                geo_transform[2],
                geo_transform[4]
            );
        }
        Ok(Self {
            name,
            geo_transform,
            cols,
            rows,
            no_data,
            values,
        })
    }

    /// Reads band 1 of a GeoTIFF.
    pub fn open(path: &Path) -> Result<Self, RasterError> {
        let dataset = Dataset::open(path)?;
        let geo_transform = dataset.geo_transform()?;
        let (cols, rows) = dataset.raster_size();
        let band = dataset.rasterband(1)?;
        let no_data = band.no_data_value();
        let buffer = band.read_as::<f64>((0, 0), (cols, rows), (cols, rows), None)?;
        let (_, values) = buffer.into_shape_and_vec();

        tracing::debug!(
            "Loaded raster {:?}: {}x{}, nodata {:?}",
            path,
            cols,
            rows,
            no_data
        );

        Self::new(
            path.display().to_string(),
            geo_transform,
            (cols, rows),
            no_data,
            values,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    fn cell_of(&self, point: GeoPoint) -> Option<(usize, usize)> {
        let gt = &self.geo_transform;
        let col = ((point.lon - gt[0]) / gt[1]).floor();
        let row = ((point.lat - gt[3]) / gt[5]).floor();
        if !col.is_finite() || !row.is_finite() || col < 0.0 || row < 0.0 {
            return None;
        }
        let (col, row) = (col as usize, row as usize);
        (col < self.cols && row < self.rows).then_some((col, row))
    }

    /// Looks up the cell containing `point`.
    pub fn sample(&self, point: GeoPoint) -> Sample {
        let Some((col, row)) = self.cell_of(point) else {
            return Sample::Miss;
        };
        let value = self.values[row * self.cols + col];
        if value.is_nan() || self.no_data.is_some_and(|nd| nd == value) {
            Sample::Miss
        } else {
            Sample::Hit(value)
        }
    }
}
