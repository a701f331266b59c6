//! Batch driver: swath files in, correlation records out.
//!
//! Each pass moves through `Loaded → Georeferenced → BandsExtracted →
//! Sampled → Correlated`. A failing pass is logged and dropped; the rest of
//! the batch continues. Band extraction runs in parallel across passes.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};
use rayon::prelude::*;
use tracing::{error, info, warn};

use crate::correlate::{CorrelationEngine, CorrelationRecord};
use crate::error::Error;
use crate::reproject::{BandExtractor, RasterBackend};
use crate::sampler::RasterLayer;
use crate::sources::ObservationSource;
use crate::swath::{swath_stem, SwathPass, LST_BAND, QA_FLAG_BAND};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PassStage {
    Loaded,
    Georeferenced,
    BandsExtracted,
    Sampled,
    Correlated,
}

impl fmt::Display for PassStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PassStage::Loaded => "loaded",
            PassStage::Georeferenced => "georeferenced",
            PassStage::BandsExtracted => "bands extracted",
            PassStage::Sampled => "sampled",
            PassStage::Correlated => "correlated",
        };
        f.write_str(name)
    }
}

/// A pass that could not reach `stage`.
#[derive(Debug)]
pub struct PassFailure {
    pub path: PathBuf,
    pub stage: PassStage,
    pub error: Error,
}

impl fmt::Display for PassFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: failed before reaching '{}': {}",
            self.path.display(),
            self.stage,
            self.error
        )
    }
}

/// Output paths of the two bands of a pass.
#[derive(Debug, Clone, PartialEq)]
pub struct BandPaths {
    pub lst: PathBuf,
    pub qa_flag: PathBuf,
}

impl BandPaths {
    pub fn for_pass(workspace: &Path, stem: &str) -> Self {
        Self {
            lst: workspace.join(format!("{stem}_LST.tif")),
            qa_flag: workspace.join(format!("{stem}_QA_flag.tif")),
        }
    }
}

/// A pass whose bands are on disk.
#[derive(Debug, Clone)]
pub struct ExtractedPass {
    pub label: String,
    pub timestamp: DateTime<FixedOffset>,
    pub bands: BandPaths,
}

/// Stage a pass failed to reach when opening its swath fails with `error`.
///
/// A file that is absent or unreadable never got loaded; anything else is a
/// metadata problem found while georeferencing.
pub fn open_failure_stage(error: &Error) -> PassStage {
    match error {
        Error::InputNotFound(_) | Error::Gdal(_) => PassStage::Loaded,
        _ => PassStage::Georeferenced,
    }
}

/// Splits swaths into those with a first-seen stem and later ones whose
/// stem repeats. Passes sharing a stem would write the same band files.
pub fn split_by_stem(swaths: &[PathBuf]) -> (Vec<&PathBuf>, Vec<&PathBuf>) {
    let mut seen = HashSet::new();
    swaths
        .iter()
        .partition(|path| seen.insert(swath_stem(path)))
}

/// Opens, georeferences and extracts both bands of one swath.
pub fn extract_pass<B: RasterBackend>(
    path: &Path,
    extractor: &BandExtractor<B>,
    workspace: &Path,
) -> Result<ExtractedPass, PassFailure> {
    let fail = |stage, error: Error| PassFailure {
        path: path.to_path_buf(),
        stage,
        error,
    };

    let pass = SwathPass::open(path).map_err(|e| fail(open_failure_stage(&e), e))?;

    let bands = BandPaths::for_pass(workspace, &pass.stem());
    for (selector, output) in [(LST_BAND, &bands.lst), (QA_FLAG_BAND, &bands.qa_flag)] {
        let outcome = extractor
            .extract_band(&pass, selector, output)
            .map_err(|e| fail(PassStage::BandsExtracted, e.into()))?;
        info!("{} {} -> {:?} ({:?})", pass.stem(), selector, output, outcome);
    }

    Ok(ExtractedPass {
        label: pass.stem(),
        timestamp: pass.corners().window.midpoint_local(),
        bands,
    })
}

/// Loads both extracted bands of a pass.
fn load_bands(bands: &BandPaths) -> Result<(RasterLayer, RasterLayer), PassFailure> {
    let open = |path: &PathBuf| {
        RasterLayer::open(path).map_err(|e| PassFailure {
            path: path.clone(),
            stage: PassStage::Sampled,
            error: e.into(),
        })
    };
    Ok((open(&bands.lst)?, open(&bands.qa_flag)?))
}

/// Runs the whole batch and returns the records of the admitted passes in
/// input order.
pub fn run_batch<B, O>(
    swaths: &[PathBuf],
    extractor: &BandExtractor<B>,
    workspace: &Path,
    engine: &mut CorrelationEngine<O>,
) -> Vec<CorrelationRecord>
where
    B: RasterBackend + Sync,
    O: ObservationSource,
{
    let (unique, duplicates) = split_by_stem(swaths);
    for path in &duplicates {
        warn!(
            "Skipping {:?}: another input already uses the stem {:?}",
            path,
            swath_stem(path)
        );
    }

    info!("Extracting bands of {} swaths", unique.len());
    let extracted: Vec<Result<ExtractedPass, PassFailure>> = unique
        .par_iter()
        .map(|path| extract_pass(path, extractor, workspace))
        .collect();

    let mut records = Vec::new();
    let mut failures = duplicates.len();
    for result in extracted {
        let (pass, (lst, qa_flag)) =
            match result.and_then(|pass| load_bands(&pass.bands).map(|layers| (pass, layers))) {
                Ok(loaded) => loaded,
                Err(failure) => {
                    failures += 1;
                    warn!("{}", failure);
                    continue;
                }
            };

        match engine.process(&pass.label, pass.timestamp, &lst, &qa_flag) {
            Some(record) => {
                info!(
                    "{} at {}: {} station comparisons",
                    record.label,
                    record.timestamp,
                    record.comparisons.len()
                );
                records.push(record);
            }
            None => info!("{} produced no record", pass.label),
        }
    }

    if failures > 0 {
        error!("{} of {} passes failed", failures, swaths.len());
    }
    records
}
