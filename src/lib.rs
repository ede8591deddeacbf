pub mod config;
pub mod deconvolution;
pub mod handle;
pub mod index;
pub mod peaks;
pub mod pipeline;
pub mod record;
pub mod registry;
pub mod server;
pub mod source;

pub mod prelude;

pub use crate::config::ProcessingConfig;
pub use crate::deconvolution::{
    AveragineDeconvoluter, AveragineModel, ChargeRange, DeconvolutionError, DeconvolutionParams,
    Deconvoluter,
};
pub use crate::handle::ScanReaderHandle;
pub use crate::index::{ScanIndex, ScanIndexRecord};
pub use crate::peaks::{DeconvolutedPeak, EnvelopePeak, PickedPeak};
pub use crate::pipeline::{ProcessedScan, ScanContext, ScanProcessor};
pub use crate::record::{IndexListing, ScanRecord};
pub use crate::registry::{FileRegistry, FileRegistryEntry, RegistryError};
pub use crate::server::{AppState, ServerConfig, ServiceError};
pub use crate::source::{
    MemoryScanSource, MzDataScanSource, RawScan, ScanAccessError, ScanCriterion, ScanDescription,
};
