//! Bugreport archive extraction.
//!
//! Two backends sit behind `ExtractionBackend`: in-process ZIP/7z decoding and an
//! external 7-Zip executable. `Extractor` tries them in that order, stages the output
//! beside the destination and only promotes a fully verified tree.

mod backend;
mod external;
mod extract;
mod native;
mod types;

// Re-export public API
pub use backend::ExtractionBackend;
pub use external::{parse_slt_paths, SevenZipTool};
pub use extract::{Extractor, ExtractorConfig};
pub use native::{extract_native, NativeBackend};
pub use types::{
    ArchiveFormat, BackendError, BackendKind, CancelFlag, ExtractOptions, ExtractionResult,
};

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
