//! Two-stage extraction of a swath sub-band into the geographic frame.
//!
//! Stage one assigns the projected rectangle to the raw sub-band in the
//! equal-area frame. Stage two warps that intermediate into JGD2011
//! geographic coordinates.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::ExtractError;
use crate::georef::ProjectedRectangle;
use crate::swath::SwathPass;

/// Sphere-based sinusoidal frame the corner rectangle is expressed in.
pub const EQUAL_AREA_SRS: &str = "ESRI:53008";
/// JGD2011 geographic.
pub const GEOGRAPHIC_SRS: &str = "EPSG:6668";
pub const NODATA_SENTINEL: u16 = 65535;

/// Parameters of the clip/translate stage.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslateRequest {
    pub srs: String,
    pub bounds: ProjectedRectangle,
    pub no_data: f64,
    pub compress: String,
}

/// External raster capability used for both stages.
pub trait RasterBackend {
    fn translate(
        &self,
        source: &str,
        output: &Path,
        request: &TranslateRequest,
    ) -> Result<(), ExtractError>;

    fn warp(&self, source: &Path, output: &Path, target_srs: &str) -> Result<(), ExtractError>;
}

#[derive(Debug, Clone)]
pub struct ReprojectConfig {
    pub intermediate_srs: String,
    pub target_srs: String,
    pub no_data: u16,
    pub compress: String,
}

impl Default for ReprojectConfig {
    fn default() -> Self {
        Self {
            intermediate_srs: EQUAL_AREA_SRS.to_string(),
            target_srs: GEOGRAPHIC_SRS.to_string(),
            no_data: NODATA_SENTINEL,
            compress: "LZW".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractOutcome {
    Written,
    /// The output existed already; nothing was run. It may be stale.
    AlreadyPresent,
}

pub struct BandExtractor<B> {
    backend: B,
    config: ReprojectConfig,
}

impl<B: RasterBackend> BandExtractor<B> {
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, ReprojectConfig::default())
    }

    pub fn with_config(backend: B, config: ReprojectConfig) -> Self {
        Self { backend, config }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn extract_band(
        &self,
        pass: &SwathPass,
        band_selector: &str,
        output: &Path,
    ) -> Result<ExtractOutcome, ExtractError> {
        if output.exists() {
            tracing::info!("GeoTIFF already exists: {:?}", output);
            return Ok(ExtractOutcome::AlreadyPresent);
        }

        let sub_dataset = pass.find_sub_dataset(band_selector).ok_or_else(|| {
            ExtractError::SubBandNotFound {
                selector: band_selector.to_string(),
                path: pass.path().to_path_buf(),
            }
        })?;

        let dir = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        // Removed when dropped, whichever way this function returns.
        let intermediate = tempfile::Builder::new()
            .prefix(&format!("{}_", pass.stem()))
            .suffix("_intermediate.tif")
            .tempfile_in(&dir)?
            .into_temp_path();

        let request = TranslateRequest {
            srs: self.config.intermediate_srs.clone(),
            bounds: *pass.rectangle(),
            no_data: f64::from(self.config.no_data),
            compress: self.config.compress.clone(),
        };

        tracing::debug!(
            "Translating {} into {:?} ({})",
            sub_dataset,
            intermediate.to_path_buf(),
            request.srs
        );
        self.backend.translate(sub_dataset, &intermediate, &request)?;

        tracing::debug!("Warping into {:?} ({})", output, self.config.target_srs);
        if let Err(e) = self
            .backend
            .warp(&intermediate, output, &self.config.target_srs)
        {
            let _ = std::fs::remove_file(output);
            return Err(e);
        }

        intermediate.close()?;
        Ok(ExtractOutcome::Written)
    }
}

/// Drives the GDAL command-line utilities.
#[derive(Debug, Clone)]
pub struct GdalCommandBackend {
    translate_program: String,
    warp_program: String,
}

impl Default for GdalCommandBackend {
    fn default() -> Self {
        Self {
            translate_program: "gdal_translate".to_string(),
            warp_program: "gdalwarp".to_string(),
        }
    }
}

impl GdalCommandBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn run(program: &str, args: &[String]) -> Result<(), ExtractError> {
        tracing::debug!("Running {} {}", program, args.join(" "));
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| ExtractError::Backend(format!("{program} exec error: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::Backend(format!(
                "{program} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }

    fn translate_args(source: &str, output: &Path, request: &TranslateRequest) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-of".into(),
            "GTiff".into(),
            "-a_srs".into(),
            request.srs.clone(),
            "-a_ullr".into(),
        ];
        args.extend(request.bounds.as_ullr().iter().map(|v| v.to_string()));
        args.extend([
            "-a_nodata".into(),
            request.no_data.to_string(),
            "-co".into(),
            format!("COMPRESS={}", request.compress),
            source.to_string(),
            output.display().to_string(),
        ]);
        args
    }

    fn warp_args(source: &Path, output: &Path, target_srs: &str) -> Vec<String> {
        vec![
            "-of".into(),
            "GTiff".into(),
            "-overwrite".into(),
            "-t_srs".into(),
            target_srs.to_string(),
            source.display().to_string(),
            output.display().to_string(),
        ]
    }
}

impl RasterBackend for GdalCommandBackend {
    fn translate(
        &self,
        source: &str,
        output: &Path,
        request: &TranslateRequest,
    ) -> Result<(), ExtractError> {
        Self::run(
            &self.translate_program,
            &Self::translate_args(source, output, request),
        )
    }

    fn warp(&self, source: &Path, output: &Path, target_srs: &str) -> Result<(), ExtractError> {
        Self::run(
            &self.warp_program,
            &Self::warp_args(source, output, target_srs),
        )
    }
}
