use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const ZIP_LOCAL_HEADER: &[u8] = b"PK\x03\x04";
const ZIP_EMPTY_ARCHIVE: &[u8] = b"PK\x05\x06";
const SEVEN_Z_SIGNATURE: &[u8] = b"7z\xBC\xAF\x27\x1C";

/// Container formats the in-process backend understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveFormat {
    Zip,
    SevenZ,
}

impl ArchiveFormat {
    /// Detect format from file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "zip" => Some(Self::Zip),
            "7z" => Some(Self::SevenZ),
            _ => None,
        }
    }

    /// Detect format from the leading magic bytes.
    pub fn sniff(path: &Path) -> io::Result<Option<Self>> {
        let mut head = [0u8; 6];
        let mut file = fs::File::open(path)?;
        let mut filled = 0;
        while filled < head.len() {
            let n = file.read(&mut head[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        let head = &head[..filled];

        if head.starts_with(ZIP_LOCAL_HEADER) || head.starts_with(ZIP_EMPTY_ARCHIVE) {
            Ok(Some(Self::Zip))
        } else if head.starts_with(SEVEN_Z_SIGNATURE) {
            Ok(Some(Self::SevenZ))
        } else {
            Ok(None)
        }
    }

    /// Magic bytes win; the extension is only consulted when they are inconclusive.
    pub fn detect(path: &Path) -> io::Result<Option<Self>> {
        Ok(Self::sniff(path)?.or_else(|| Self::from_path(path)))
    }
}

/// Which backend produced an extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    Native,
    External7Zip,
}

/// Caller policy for one extraction.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ExtractOptions {
    /// Replace a populated destination instead of failing with `DestinationNotEmpty`.
    pub overwrite: bool,
    /// Expand archives found inside the extracted tree.
    pub expand_nested: bool,
}

/// Result of an extraction operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub root_dir: PathBuf,
    pub file_count: usize,
    pub backend_used: BackendKind,
    pub nested_expanded: usize,
}

/// Outcome of a single backend attempt. Only the extractor turns these into `ExtractError`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend does not understand this container.
    Unsupported(String),
    /// The backend understood the container but could not read it.
    Corrupt(String),
    /// An entry would land outside the destination root.
    Unsafe(String),
    /// The backend is not present on this machine.
    Unavailable(String),
    /// The extraction was abandoned before it finished.
    Cancelled,
    Io(String),
}

impl BackendError {
    /// Whether the next backend in the chain should get a turn.
    pub fn allows_fallback(&self) -> bool {
        matches!(self, Self::Unsupported(_) | Self::Corrupt(_))
    }
}

/// Shared stop signal for work that outlives the future driving it.
///
/// A blocking decompression task keeps running after its caller is dropped, so it
/// checks this flag between entries and stops writing once it is set.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
