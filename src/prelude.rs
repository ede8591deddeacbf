pub use crate::deconvolution::Deconvoluter;
pub use crate::source::{ScanSource, SourceScan};
