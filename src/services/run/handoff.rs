use super::layout::RunLayout;
use crate::services::archive::ExtractionResult;
use crate::services::bugreport::BugreportFixtures;
use crate::services::device::{ConnectedDevice, DeviceInfo, SuiteTarget};
use crate::types::errors::RunError;
use serde::Serialize;

/// Everything the downstream test runner needs from one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub selector: String,
    pub device: ConnectedDevice,
    pub device_info: DeviceInfo,
    pub suite: SuiteTarget,
    pub pytest_target: String,
    pub layout: RunLayout,
    pub bugreport_requested: bool,
    /// Absent when no bugreport was requested or acquiring it failed.
    pub extraction: Option<ExtractionResult>,
    pub fixtures: Option<BugreportFixtures>,
    /// Typed kind of the swallowed bugreport failure, e.g. `FetchFailed`.
    pub bugreport_error_kind: Option<String>,
    pub bugreport_error: Option<String>,
}

impl RunOutcome {
    /// Arguments for `pytest` producing the HTML and JUnit reports of this run.
    pub fn pytest_args(&self) -> Vec<String> {
        vec![
            self.pytest_target.clone(),
            "-q".to_string(),
            "--disable-warnings".to_string(),
            "--html".to_string(),
            self.layout.html_report.display().to_string(),
            "--self-contained-html".to_string(),
            format!("--junit-xml={}", self.layout.junit_report.display()),
        ]
    }

    pub fn bugreport_available(&self) -> bool {
        self.extraction.is_some()
    }
}

/// The boundary to the external test runner.
pub trait TestHandoff: Send + Sync {
    fn hand_off(&self, outcome: &RunOutcome) -> Result<(), RunError>;
}

/// Writes `run_manifest.json` into the device's report directory and logs the
/// pytest invocation the CI job should run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestHandoff;

impl TestHandoff for ManifestHandoff {
    fn hand_off(&self, outcome: &RunOutcome) -> Result<(), RunError> {
        let json = serde_json::to_string_pretty(outcome)
            .map_err(|e| RunError::Handoff(format!("Failed to serialize manifest: {e}")))?;
        std::fs::write(&outcome.layout.manifest, json).map_err(|e| {
            RunError::Handoff(format!(
                "Failed to write {}: {e}",
                outcome.layout.manifest.display()
            ))
        })?;

        log::info!(
            "[{}] pytest {}",
            outcome.device.serial,
            outcome.pytest_args().join(" ")
        );
        log::info!("Manifest written: {}", outcome.layout.manifest.display());
        Ok(())
    }
}
