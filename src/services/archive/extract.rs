use super::backend::ExtractionBackend;
use super::external::SevenZipTool;
use super::native::NativeBackend;
use super::types::{BackendError, BackendKind, CancelFlag, ExtractOptions, ExtractionResult};
use crate::services::fs_utils::file_utils::{
    count_files, is_missing_or_empty, remove_dir_best_effort, rename_cross_drive_fallback,
};
use crate::services::fs_utils::path_utils::is_within_root;
use crate::types::errors::ExtractError;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Archives expanded in place when nested expansion is on (case-insensitive).
const NESTED_ARCHIVE_EXTS: &[&str] = &["zip", "7z", "mar", "tar", "tgz", "gz"];

/// How many passes nested expansion makes before giving up.
const MAX_NESTED_ROUNDS: usize = 4;

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Explicit 7-Zip location. When set, `PATH` is not probed.
    pub seven_zip_override: Option<PathBuf>,
    pub tool_timeout: Duration,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            seven_zip_override: None,
            tool_timeout: Duration::from_secs(600),
        }
    }
}

/// Backend-selecting extractor: native first, external 7-Zip as fallback.
#[derive(Debug, Clone)]
pub struct Extractor {
    native: NativeBackend,
    config: ExtractorConfig,
}

/// A sibling directory that holds an extraction until it is promoted.
/// Dropped without `promote`, it cancels any backend still writing into it and
/// removes itself.
struct StagingDir {
    path: PathBuf,
    cancel: CancelFlag,
    armed: bool,
}

impl StagingDir {
    fn create_beside(dest: &Path) -> Result<Self, ExtractError> {
        let parent = dest.parent().unwrap_or_else(|| Path::new("."));
        let name = dest
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "extracted".to_string());
        let path = parent.join(format!(".{name}.partial-{}", uuid::Uuid::new_v4().simple()));
        fs::create_dir_all(&path)?;
        Ok(Self {
            path,
            cancel: CancelFlag::new(),
            armed: true,
        })
    }

    fn promote(mut self, dest: &Path, overwrite: bool) -> Result<(), ExtractError> {
        if dest.exists() {
            if overwrite {
                log::info!("Overwriting destination: {}", dest.display());
                fs::remove_dir_all(dest)?;
            } else {
                // Precondition checked earlier: it is an empty directory.
                fs::remove_dir(dest)?;
            }
        }
        rename_cross_drive_fallback(&self.path, dest)?;
        self.armed = false;
        Ok(())
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if self.armed {
            self.cancel.cancel();
            remove_dir_best_effort(&self.path);
        }
    }
}

impl Extractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self {
            native: NativeBackend,
            config,
        }
    }

    /// Extract `archive` into `dest`.
    ///
    /// Steps:
    /// 1. Refuse a populated `dest` unless `options.overwrite` is set
    /// 2. Unpack into a staging directory beside `dest` (native, then 7-Zip)
    /// 3. Verify nothing in the staged tree resolves outside it
    /// 4. Optionally expand nested archives inside the staged tree
    /// 5. Promote the staged tree to `dest`
    pub async fn extract(
        &self,
        archive: &Path,
        dest: &Path,
        options: ExtractOptions,
    ) -> Result<ExtractionResult, ExtractError> {
        if !archive.is_file() {
            return Err(ExtractError::Io(format!(
                "Archive not found: {}",
                archive.display()
            )));
        }
        if !options.overwrite && !is_missing_or_empty(dest)? {
            return Err(ExtractError::DestinationNotEmpty(dest.display().to_string()));
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let staging = StagingDir::create_beside(dest)?;
        let backend_used = self
            .run_chain(archive, &staging.path, &staging.cancel)
            .await?;
        verify_tree(&staging.path)?;

        let nested_expanded = if options.expand_nested {
            self.expand_nested(&staging.path).await
        } else {
            0
        };

        staging.promote(dest, options.overwrite)?;
        let file_count = count_files(dest);
        log::info!(
            "Extracted {} -> {} ({} files, {:?})",
            archive.display(),
            dest.display(),
            file_count,
            backend_used
        );

        Ok(ExtractionResult {
            root_dir: dest.to_path_buf(),
            file_count,
            backend_used,
            nested_expanded,
        })
    }

    /// Try each backend in order on an empty `into` directory.
    async fn run_chain(
        &self,
        archive: &Path,
        into: &Path,
        cancel: &CancelFlag,
    ) -> Result<BackendKind, ExtractError> {
        let native_err = match self.native.try_extract(archive, into, cancel).await {
            Ok(_) => return Ok(self.native.kind()),
            Err(e) if e.allows_fallback() => e,
            Err(e) => return Err(into_extract_error(e)),
        };
        log::warn!(
            "Native extraction of {} not possible ({:?}), falling back to 7-Zip",
            archive.display(),
            native_err
        );
        clear_dir(into)?;

        let tool = match SevenZipTool::locate(
            self.config.seven_zip_override.as_deref(),
            self.config.tool_timeout,
        ) {
            Ok(tool) => tool,
            Err(BackendError::Unavailable(msg)) => {
                return Err(match native_err {
                    BackendError::Corrupt(detail) => ExtractError::ExtractionFailed(format!(
                        "{detail} (7-Zip unavailable for a second attempt: {msg})"
                    )),
                    _ => ExtractError::ExtractionUnavailable(msg),
                });
            }
            Err(e) => return Err(into_extract_error(e)),
        };

        match tool.try_extract(archive, into, cancel).await {
            Ok(_) => Ok(tool.kind()),
            Err(e) => {
                clear_dir(into)?;
                Err(into_extract_error(e))
            }
        }
    }

    /// Expand archives inside `root` next to themselves, into a folder named after the
    /// archive stem. Failures are logged and skipped. Returns how many were expanded.
    async fn expand_nested(&self, root: &Path) -> usize {
        let mut expanded = 0;
        for round in 0..MAX_NESTED_ROUNDS {
            let mut did_round = false;
            for archive in find_nested_archives(root) {
                let Some(stem) = archive.file_stem() else {
                    continue;
                };
                let out_dir = archive.with_file_name(stem);
                if out_dir.exists() {
                    continue; // already expanded
                }

                log::debug!("Extracting nested (round {}): {}", round + 1, archive.display());
                match self.extract_nested_one(&archive, &out_dir).await {
                    Ok(()) => {
                        did_round = true;
                        expanded += 1;
                    }
                    Err(e) => log::warn!(
                        "Nested extraction of {} skipped: {e}",
                        archive.display()
                    ),
                }
            }
            if !did_round {
                break;
            }
        }
        expanded
    }

    async fn extract_nested_one(&self, archive: &Path, out_dir: &Path) -> Result<(), ExtractError> {
        let staging = StagingDir::create_beside(out_dir)?;
        self.run_chain(archive, &staging.path, &staging.cancel)
            .await?;
        verify_tree(&staging.path)?;
        staging.promote(out_dir, false)
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(ExtractorConfig::default())
    }
}

fn into_extract_error(e: BackendError) -> ExtractError {
    match e {
        BackendError::Unsupported(msg) | BackendError::Corrupt(msg) => {
            ExtractError::ExtractionFailed(msg)
        }
        BackendError::Unsafe(name) => ExtractError::UnsafeEntry(name),
        BackendError::Unavailable(msg) => ExtractError::ExtractionUnavailable(msg),
        BackendError::Cancelled => ExtractError::Io("Extraction cancelled".to_string()),
        BackendError::Io(msg) => ExtractError::Io(msg),
    }
}

/// Empty `dir` so the next backend starts clean.
fn clear_dir(dir: &Path) -> Result<(), ExtractError> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() && !path.is_symlink() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Reject a staged tree containing symlinks that resolve outside it.
fn verify_tree(root: &Path) -> Result<(), ExtractError> {
    for entry in walkdir::WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.path_is_symlink() {
            continue;
        }
        let inside = is_within_root(root, entry.path()).unwrap_or(false);
        if !inside {
            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .display()
                .to_string();
            return Err(ExtractError::UnsafeEntry(relative));
        }
    }
    Ok(())
}

fn find_nested_archives(root: &Path) -> Vec<PathBuf> {
    walkdir::WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| NESTED_ARCHIVE_EXTS.contains(&ext.to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .map(|e| e.into_path())
        .collect()
}
