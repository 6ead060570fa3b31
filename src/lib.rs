//! Device-under-test runner: resolves a device, picks its test suite and
//! prepares bugreport fixtures for the external pytest run.

pub mod services;
pub mod types;
#[cfg(test)]
pub mod test_utils;

pub use services::config::RunnerConfig;
pub use services::device::{AdbShell, SuiteTarget};
pub use services::run::{ManifestHandoff, Orchestrator, RunOutcome};
pub use types::errors::RunError;
