use super::types::{BackendError, BackendKind, CancelFlag};
use std::future::Future;
use std::path::Path;

/// One way of unpacking an archive into an existing, empty directory.
///
/// Implementations report how many regular files they wrote, or a `BackendError`
/// that tells the extractor whether the next backend may try. Work that keeps running
/// after the future is dropped must stop once `cancel` is set.
pub trait ExtractionBackend {
    fn kind(&self) -> BackendKind;

    fn try_extract(
        &self,
        archive: &Path,
        dest: &Path,
        cancel: &CancelFlag,
    ) -> impl Future<Output = Result<usize, BackendError>> + Send;
}
