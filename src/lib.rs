pub mod correlate;
pub mod error;
pub mod georef;
pub mod observation;
pub mod pipeline;
pub mod quality;
pub mod reproject;
pub mod sampler;
pub mod sources;
pub mod station;
pub mod swath;

pub use correlate::{CorrelationEngine, CorrelationRecord, FilterPolicy, MissingQuality};
pub use error::{Error, Result};
pub use observation::ObservationTable;
pub use pipeline::{run_batch, PassFailure, PassStage};
pub use quality::{decode, QualityCondition, QualityFlags};
pub use reproject::{BandExtractor, GdalCommandBackend, RasterBackend};
pub use sampler::{GeoPoint, RasterLayer, Sample};
pub use station::{JsonStationCatalog, StationCatalog, StationPoint};
pub use swath::SwathPass;
