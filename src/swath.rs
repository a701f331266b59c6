use std::path::{Path, PathBuf};

use gdal::{Dataset, Metadata};

use crate::error::{Error, MetadataError, Result};
use crate::georef::{EqualAreaApprox, MetadataLookup, ProjectedRectangle, SwathCornerMetadata};

/// Sub-dataset selector of the LST measurement band.
pub const LST_BAND: &str = "Image_data/LST";
/// Sub-dataset selector of the quality flag band.
pub const QA_FLAG_BAND: &str = "Image_data/QA_flag";

struct DatasetMetadata<'a>(&'a Dataset);

impl MetadataLookup for DatasetMetadata<'_> {
    fn metadata_value(&self, key: &str) -> Option<String> {
        self.0.metadata_item(key, "")
    }
}

/// One swath file: its corners, projected rectangle and declared sub-datasets.
#[derive(Debug, Clone)]
pub struct SwathPass {
    path: PathBuf,
    corners: SwathCornerMetadata,
    rectangle: ProjectedRectangle,
    sub_datasets: Vec<String>,
}

impl SwathPass {
    /// Opens an HDF5 swath through GDAL and georeferences its corners.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::InputNotFound(path.to_path_buf()));
        }

        let dataset = Dataset::open(path)?;
        let sub_datasets = dataset
            .metadata_domain("SUBDATASETS")
            .map(|entries| parse_sub_dataset_names(&entries))
            .unwrap_or_default();

        tracing::debug!(
            "Opened swath {:?} with {} sub-datasets",
            path,
            sub_datasets.len()
        );

        Ok(Self::from_parts(path, &DatasetMetadata(&dataset), sub_datasets)?)
    }

    pub fn from_parts(
        path: &Path,
        metadata: &dyn MetadataLookup,
        sub_datasets: Vec<String>,
    ) -> std::result::Result<Self, MetadataError> {
        let corners = SwathCornerMetadata::from_metadata(metadata)?;
        let rectangle = EqualAreaApprox::default().project(&corners)?;
        Ok(Self {
            path: path.to_path_buf(),
            corners,
            rectangle,
            sub_datasets,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn corners(&self) -> &SwathCornerMetadata {
        &self.corners
    }

    pub fn rectangle(&self) -> &ProjectedRectangle {
        &self.rectangle
    }

    pub fn sub_datasets(&self) -> &[String] {
        &self.sub_datasets
    }

    /// First declared sub-dataset whose name contains `selector`.
    pub fn find_sub_dataset(&self, selector: &str) -> Option<&str> {
        self.sub_datasets
            .iter()
            .find(|name| name.contains(selector))
            .map(String::as_str)
    }

    /// File stem, used to name derived rasters.
    pub fn stem(&self) -> String {
        swath_stem(&self.path)
    }
}

/// Stem a swath file's derived rasters are named after.
pub fn swath_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("swath")
        .to_string()
}

/// Extracts the `SUBDATASET_n_NAME` values from the SUBDATASETS domain.
fn parse_sub_dataset_names(entries: &[String]) -> Vec<String> {
    entries
        .iter()
        .filter_map(|entry| entry.split_once('='))
        .filter(|(key, _)| key.starts_with("SUBDATASET_") && key.ends_with("_NAME"))
        .map(|(_, value)| value.to_string())
        .collect()
}
