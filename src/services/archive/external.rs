//! External 7-Zip executable backend.

use super::backend::ExtractionBackend;
use super::types::{BackendError, BackendKind, CancelFlag};
use crate::services::fs_utils::file_utils::count_files;
use crate::services::fs_utils::path_utils::is_entry_name_safe;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Binary names probed on `PATH`, most capable first.
const TOOL_NAMES: &[&str] = &["7zz", "7z", "7za"];

#[cfg(windows)]
const WINDOWS_INSTALL_PATH: &str = r"C:\Program Files\7-Zip\7z.exe";

/// Keep this much of the tool's output in error messages.
const OUTPUT_TAIL_CHARS: usize = 600;

#[derive(Debug, Clone)]
pub struct SevenZipTool {
    path: PathBuf,
    timeout: Duration,
}

impl SevenZipTool {
    pub fn new(path: PathBuf, timeout: Duration) -> Self {
        Self { path, timeout }
    }

    /// Locate the tool from an explicit override, or by probing the platform search path.
    pub fn locate(override_path: Option<&Path>, timeout: Duration) -> Result<Self, BackendError> {
        if let Some(path) = override_path {
            if path.is_file() {
                return Ok(Self::new(path.to_path_buf(), timeout));
            }
            return Err(BackendError::Unavailable(format!(
                "7-Zip override {} does not exist",
                path.display()
            )));
        }

        for name in TOOL_NAMES {
            if let Some(found) = search_path(name) {
                log::debug!("Found 7-Zip at {}", found.display());
                return Ok(Self::new(found, timeout));
            }
        }

        #[cfg(windows)]
        {
            let fallback = Path::new(WINDOWS_INSTALL_PATH);
            if fallback.is_file() {
                return Ok(Self::new(fallback.to_path_buf(), timeout));
            }
        }

        Err(BackendError::Unavailable(format!(
            "No 7-Zip executable found (tried {}). Install 7-Zip or set SEVEN_ZIP",
            TOOL_NAMES.join(", ")
        )))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// List entry paths with `l -slt` so unsafe names are caught before anything is written.
    async fn list_entries(&self, archive: &Path) -> Result<Vec<String>, BackendError> {
        let mut cmd = Command::new(&self.path);
        cmd.arg("l").arg("-slt").arg(archive);
        let stdout = self.run(cmd, "list").await?;
        Ok(parse_slt_paths(&stdout))
    }

    /// Run to completion within the timeout. Dropping the child on timeout kills it.
    async fn run(&self, mut cmd: Command, action: &str) -> Result<String, BackendError> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            BackendError::Unavailable(format!("Failed to start {}: {e}", self.path.display()))
        })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| BackendError::Io(format!("7-Zip {action}: {e}")))?,
            Err(_) => {
                log::error!(
                    "7-Zip {action} timed out after {:?}, process terminated",
                    self.timeout
                );
                return Err(BackendError::Corrupt(format!(
                    "7-Zip {action} timed out after {:?}",
                    self.timeout
                )));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let combined = format!("{}\n{}", stdout.trim(), stderr.trim());
            return Err(BackendError::Corrupt(format!(
                "7-Zip {action} exited with {:?}: {}",
                output.status.code(),
                tail(combined.trim(), OUTPUT_TAIL_CHARS)
            )));
        }
        Ok(stdout)
    }
}

impl ExtractionBackend for SevenZipTool {
    fn kind(&self) -> BackendKind {
        BackendKind::External7Zip
    }

    /// The child runs with `kill_on_drop`, so dropping this future stops the tool.
    async fn try_extract(
        &self,
        archive: &Path,
        dest: &Path,
        cancel: &CancelFlag,
    ) -> Result<usize, BackendError> {
        let entries = self.list_entries(archive).await?;
        if let Some(bad) = entries.iter().find(|name| !is_entry_name_safe(name)) {
            return Err(BackendError::Unsafe(bad.clone()));
        }

        log::info!(
            "Extracting {} with {}",
            archive.display(),
            self.path.display()
        );
        let mut cmd = Command::new(&self.path);
        cmd.arg("x")
            .arg("-y")
            .arg(archive)
            .arg(format!("-o{}", dest.display()));
        self.run(cmd, "extract").await?;
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }

        Ok(count_files(dest))
    }
}

/// Pull `Path = ...` values out of `7z l -slt` output.
///
/// The block before the `----------` separator describes the archive itself
/// and is skipped.
pub fn parse_slt_paths(listing: &str) -> Vec<String> {
    listing
        .lines()
        .skip_while(|line| line.trim() != "----------")
        .filter_map(|line| line.strip_prefix("Path = "))
        .map(|path| path.trim_end_matches('\r').to_string())
        .collect()
}

fn search_path(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths).find_map(|dir| {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
        #[cfg(windows)]
        {
            let exe = dir.join(format!("{name}.exe"));
            if exe.is_file() {
                return Some(exe);
            }
        }
        None
    })
}

fn tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let skip = count - max_chars;
    let start = text
        .char_indices()
        .nth(skip)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &text[start..]
}
