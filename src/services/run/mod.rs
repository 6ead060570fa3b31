//! Per-run layout, orchestration and the hand-off to the external test runner.

mod handoff;
mod layout;
mod orchestrator;

pub use handoff::{ManifestHandoff, RunOutcome, TestHandoff};
pub use layout::{device_slug, new_run_id, RunLayout, JUNIT_FILE, MANIFEST_FILE};
pub use orchestrator::Orchestrator;

#[cfg(test)]
#[path = "tests/layout_tests.rs"]
mod layout_tests;

#[cfg(test)]
#[path = "tests/orchestrator_tests.rs"]
mod orchestrator_tests;
