use std::fs;
use std::path::Path;

/// Tries to rename a file or directory using `std::fs::rename`.
/// If it fails (likely due to cross-device link errors), it falls back
/// to using `fs_extra` to copy and remove the original.
pub fn rename_cross_drive_fallback(from: &Path, to: &Path) -> std::io::Result<()> {
    match fs::rename(from, to) {
        Ok(_) => Ok(()),
        Err(e) => {
            log::warn!(
                "fs::rename failed (cross-device?): {}. Attempting fallback move...",
                e
            );

            if !from.exists() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "Source path does not exist",
                ));
            }

            if to.exists() {
                return Err(e); // Propagate the original error (e.g., AlreadyExists)
            }

            if let Some(parent) = to.parent() {
                fs::create_dir_all(parent)?;
            }

            if from.is_dir() {
                let mut options = fs_extra::dir::CopyOptions::new();
                options.copy_inside = true;

                fs_extra::dir::move_dir(from, to, &options)
                    .map(|_| ())
                    .map_err(|err| std::io::Error::other(err.to_string()))
            } else {
                let mut options = fs_extra::file::CopyOptions::new();
                options.overwrite = false;

                fs_extra::file::move_file(from, to, &options)
                    .map(|_| ())
                    .map_err(|err| std::io::Error::other(err.to_string()))
            }
        }
    }
}

/// `true` if `dir` is missing or has no entries at all.
pub fn is_missing_or_empty(dir: &Path) -> std::io::Result<bool> {
    match fs::read_dir(dir) {
        Ok(mut entries) => Ok(entries.next().is_none()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(e),
    }
}

/// Count regular files below `root` without following symlinks.
pub fn count_files(root: &Path) -> usize {
    walkdir::WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .count()
}

/// Remove a directory tree, logging instead of failing. Used on cleanup paths.
pub fn remove_dir_best_effort(dir: &Path) {
    if let Err(e) = fs::remove_dir_all(dir) {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("Failed to remove {}: {e}", dir.display());
        }
    }
}
