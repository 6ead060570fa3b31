//! In-process ZIP and 7z decompression.

use super::backend::ExtractionBackend;
use super::types::{ArchiveFormat, BackendError, BackendKind, CancelFlag};
use crate::services::fs_utils::file_utils::{count_files, remove_dir_best_effort};
use crate::services::fs_utils::path_utils::{is_entry_name_safe, resolve_entry_path};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default)]
pub struct NativeBackend;

impl ExtractionBackend for NativeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Native
    }

    async fn try_extract(
        &self,
        archive: &Path,
        dest: &Path,
        cancel: &CancelFlag,
    ) -> Result<usize, BackendError> {
        let archive = archive.to_path_buf();
        let dest = dest.to_path_buf();
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || extract_native(&archive, &dest, &cancel))
            .await
            .map_err(|e| BackendError::Io(format!("Native extraction task failed: {e}")))?
    }
}

/// Extract `archive_path` into `dest_path` on the current thread.
///
/// Every entry name is checked before the first byte is written, so an archive
/// carrying a traversal entry leaves `dest_path` untouched. `cancel` is checked
/// after every entry written; once it is set, `dest_path` is removed and the call
/// returns `Cancelled`.
pub fn extract_native(
    archive_path: &Path,
    dest_path: &Path,
    cancel: &CancelFlag,
) -> Result<usize, BackendError> {
    let result = extract_native_inner(archive_path, dest_path, cancel);
    if matches!(result, Err(BackendError::Cancelled)) || cancel.is_cancelled() {
        log::info!(
            "Extraction of {} cancelled, removing {}",
            archive_path.display(),
            dest_path.display()
        );
        remove_dir_best_effort(dest_path);
        return Err(BackendError::Cancelled);
    }
    result
}

fn extract_native_inner(
    archive_path: &Path,
    dest_path: &Path,
    cancel: &CancelFlag,
) -> Result<usize, BackendError> {
    if cancel.is_cancelled() {
        return Err(BackendError::Cancelled);
    }
    let meta = fs::metadata(archive_path)
        .map_err(|e| BackendError::Io(format!("Failed to open archive: {e}")))?;
    if meta.len() == 0 {
        log::info!(
            "Archive {} is empty, nothing to extract",
            archive_path.display()
        );
        return Ok(0);
    }

    let format = ArchiveFormat::detect(archive_path)
        .map_err(|e| BackendError::Io(format!("Failed to read archive header: {e}")))?
        .ok_or_else(|| {
            BackendError::Unsupported(format!(
                "Unsupported archive format: {}",
                archive_path.display()
            ))
        })?;

    match format {
        ArchiveFormat::Zip => extract_zip_inner(archive_path, dest_path, cancel),
        ArchiveFormat::SevenZ => extract_7z_inner(archive_path, dest_path, cancel),
    }
}

fn extract_zip_inner(
    archive_path: &Path,
    dest_path: &Path,
    cancel: &CancelFlag,
) -> Result<usize, BackendError> {
    let file = fs::File::open(archive_path)
        .map_err(|e| BackendError::Io(format!("Failed to open archive: {e}")))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| BackendError::Corrupt(format!("Invalid or corrupt ZIP: {e}")))?;

    for i in 0..archive.len() {
        let entry = archive
            .by_index_raw(i)
            .map_err(|e| BackendError::Corrupt(format!("Failed to read entry {i}: {e}")))?;
        if !is_entry_name_safe(entry.name()) {
            return Err(BackendError::Unsafe(entry.name().to_string()));
        }
    }

    let mut count: usize = 0;
    for i in 0..archive.len() {
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }
        let mut entry = archive
            .by_index(i)
            .map_err(|e| BackendError::Corrupt(format!("Failed to read entry {i}: {e}")))?;

        let output_path = resolve_entry_path(dest_path, entry.name())
            .map_err(|_| BackendError::Unsafe(entry.name().to_string()))?;

        if entry.is_dir() {
            fs::create_dir_all(&output_path)
                .map_err(|e| BackendError::Io(format!("Failed to create dir: {e}")))?;
        } else {
            if let Some(parent) = output_path.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| BackendError::Io(format!("Failed to create parent: {e}")))?;
            }
            let mut outfile = fs::File::create(&output_path)
                .map_err(|e| BackendError::Io(format!("Failed to create file: {e}")))?;
            io::copy(&mut entry, &mut outfile).map_err(|e| copy_error(entry.name(), e))?;
            count += 1;
        }
    }
    if cancel.is_cancelled() {
        return Err(BackendError::Cancelled);
    }
    Ok(count)
}

/// Read errors while inflating mean bad data; anything else is the local disk.
fn copy_error(name: &str, e: io::Error) -> BackendError {
    match e.kind() {
        io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
            BackendError::Corrupt(format!("Corrupt data in {name}: {e}"))
        }
        _ => BackendError::Io(format!("Failed to write {name}: {e}")),
    }
}

fn extract_7z_inner(
    archive_path: &Path,
    dest_path: &Path,
    cancel: &CancelFlag,
) -> Result<usize, BackendError> {
    let mut unsafe_name: Option<String> = None;
    sevenz_rust::decompress_with_extract_fn(
        fs::File::open(archive_path)
            .map_err(|e| BackendError::Io(format!("Failed to open 7z: {e}")))?,
        dest_path,
        |entry, _, _| {
            if unsafe_name.is_none() && !is_entry_name_safe(entry.name()) {
                unsafe_name = Some(entry.name().to_string());
            }
            Ok(true) // listing only
        },
    )
    .map_err(|e| BackendError::Corrupt(format!("Failed to read 7z: {e}")))?;

    if let Some(name) = unsafe_name {
        return Err(BackendError::Unsafe(name));
    }

    let root: PathBuf = dest_path.to_path_buf();
    let mut escaped: Option<String> = None;
    sevenz_rust::decompress_with_extract_fn(
        fs::File::open(archive_path)
            .map_err(|e| BackendError::Io(format!("Failed to open 7z: {e}")))?,
        dest_path,
        |entry, reader, _| {
            if cancel.is_cancelled() {
                return Ok(false);
            }
            match resolve_entry_path(&root, entry.name()) {
                Ok(target) => sevenz_rust::default_entry_extract_fn(entry, reader, &target),
                Err(_) => {
                    escaped = Some(entry.name().to_string());
                    Ok(false)
                }
            }
        },
    )
    .map_err(|e| BackendError::Corrupt(format!("Failed to extract 7z: {e}")))?;

    if cancel.is_cancelled() {
        return Err(BackendError::Cancelled);
    }
    if let Some(name) = escaped {
        return Err(BackendError::Unsafe(name));
    }

    Ok(count_files(dest_path))
}
