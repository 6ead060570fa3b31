use serde::Serialize;
use thiserror::Error;

/// Failures while turning a raw selector into a live device. All of them end the run.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("No device specified. Set DEVICE (or DEVICES / config/devices.txt)")]
    NoDeviceSpecified,
    #[error("Device unreachable: {selector} (last output: {last_output})")]
    DeviceUnreachable {
        selector: String,
        last_output: String,
    },
    #[error("Device not confirmed: {selector} resolved to {serial}, which is not listed (last output: {last_output})")]
    DeviceNotConfirmed {
        selector: String,
        serial: String,
        last_output: String,
    },
}

impl ResolveError {
    /// The raw selector the failure originated from, when one was given.
    pub fn selector(&self) -> Option<&str> {
        match self {
            Self::NoDeviceSpecified => None,
            Self::DeviceUnreachable { selector, .. }
            | Self::DeviceNotConfirmed { selector, .. } => Some(selector),
        }
    }
}

/// Transport-level failures of the device shell boundary.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("Failed to spawn `{program}`: {message}")]
    Spawn { program: String, message: String },
    #[error("`{command}` timed out after {seconds}s")]
    Timeout { command: String, seconds: u64 },
    #[error("`{command}` exited with {code:?}: {output}")]
    NonZeroExit {
        command: String,
        code: Option<i32>,
        output: String,
    },
}

impl ShellError {
    /// Best-effort text of what the shell printed, for diagnostics.
    pub fn output(&self) -> &str {
        match self {
            Self::NonZeroExit { output, .. } => output,
            Self::Spawn { message, .. } => message,
            Self::Timeout { .. } => "",
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Bugreport fetch failed: HTTP {status}")]
    FetchFailed { status: u16 },
    #[error("Bugreport transport error: {0}")]
    Transport(String),
    #[error("Bugreport source missing: {0}")]
    SourceMissing(String),
    /// The bugreport service answered, but not with anything usable.
    #[error("Unexpected bugreport service response: {0}")]
    BadResponse(String),
    #[error("I/O error: {0}")]
    Io(String),
}

/// The URL is dropped: presigned URLs carry their credentials in the query.
impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        FetchError::Transport(error.without_url().to_string())
    }
}

impl From<std::io::Error> for FetchError {
    fn from(error: std::io::Error) -> Self {
        FetchError::Io(error.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    /// No usable backend on this machine. Fix the environment.
    #[error("Extraction unavailable: {0}")]
    ExtractionUnavailable(String),
    /// A backend ran but the archive could not be read. Re-fetch the archive.
    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),
    #[error("Unsafe archive entry rejected: {0}")]
    UnsafeEntry(String),
    #[error("Destination not empty: {0}")]
    DestinationNotEmpty(String),
    #[error("I/O error: {0}")]
    Io(String),
}

impl ExtractError {
    /// True when the operator must fix the machine rather than the data.
    pub fn is_environment_problem(&self) -> bool {
        matches!(self, Self::ExtractionUnavailable(_) | Self::Io(_))
    }
}

impl From<std::io::Error> for ExtractError {
    fn from(error: std::io::Error) -> Self {
        ExtractError::Io(error.to_string())
    }
}

/// Why bugreport fixtures are missing from an otherwise successful run.
#[derive(Debug, Error)]
pub enum BugreportError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error("No bugreport source configured")]
    NoSource,
}

impl BugreportError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch(FetchError::FetchFailed { .. }) => "FetchFailed",
            Self::Fetch(_) => "FetchError",
            Self::Extract(ExtractError::ExtractionUnavailable(_)) => "ExtractionUnavailable",
            Self::Extract(ExtractError::ExtractionFailed(_)) => "ExtractionFailed",
            Self::Extract(ExtractError::UnsafeEntry(_)) => "UnsafeEntry",
            Self::Extract(ExtractError::DestinationNotEmpty(_)) => "DestinationNotEmpty",
            Self::Extract(ExtractError::Io(_)) => "ExtractIo",
            Self::NoSource => "NoSource",
        }
    }
}

/// Errors that end a run. Bugreport problems never surface here.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Handoff failed: {0}")]
    Handoff(String),
    #[error("Run task aborted: {0}")]
    Aborted(String),
}

impl From<std::io::Error> for RunError {
    fn from(error: std::io::Error) -> Self {
        RunError::Io(error.to_string())
    }
}

macro_rules! serialize_as_display {
    ($($ty:ty),*) => {
        $(
            impl Serialize for $ty {
                fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
                where
                    S: serde::Serializer,
                {
                    serializer.serialize_str(self.to_string().as_ref())
                }
            }
        )*
    };
}

serialize_as_display!(ResolveError, FetchError, ExtractError, BugreportError, RunError);

#[cfg(test)]
#[path = "tests/errors_tests.rs"]
mod tests;
