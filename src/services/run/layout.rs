use crate::types::errors::RunError;
use sanitize_filename::{sanitize_with_options, Options};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// JUnit output written next to the HTML report.
pub const JUNIT_FILE: &str = "results.xml";

pub const MANIFEST_FILE: &str = "run_manifest.json";

/// Directories and report paths owned by one run. Two runs never share a subtree.
#[derive(Debug, Clone, Serialize)]
pub struct RunLayout {
    pub run_id: String,
    pub device_slug: String,
    /// `<reports_root>/<slug>/`
    pub reports_dir: PathBuf,
    /// `<work_root>/<slug>-<run_id>/`
    pub scratch_dir: PathBuf,
    pub downloads_dir: PathBuf,
    pub extracted_dir: PathBuf,
    pub html_report: PathBuf,
    pub junit_report: PathBuf,
    pub manifest: PathBuf,
}

impl RunLayout {
    pub fn new(selector: &str, reports_root: &Path, work_root: &Path, report_file: &str) -> Self {
        let run_id = new_run_id();
        let device_slug = device_slug(selector);
        let reports_dir = reports_root.join(&device_slug);
        let scratch_dir = work_root.join(format!("{device_slug}-{run_id}"));

        Self {
            downloads_dir: scratch_dir.join("downloads"),
            extracted_dir: scratch_dir.join("extracted"),
            html_report: reports_dir.join(report_file),
            junit_report: reports_dir.join(JUNIT_FILE),
            manifest: reports_dir.join(MANIFEST_FILE),
            run_id,
            device_slug,
            reports_dir,
            scratch_dir,
        }
    }

    /// Create the report and download directories. `extracted_dir` is left to the extractor.
    pub fn create_dirs(&self) -> Result<(), RunError> {
        fs::create_dir_all(&self.reports_dir)?;
        fs::create_dir_all(&self.downloads_dir)?;
        Ok(())
    }
}

/// `<UTC timestamp>-<8 hex chars>`, sortable and unique across parallel runs.
pub fn new_run_id() -> String {
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{stamp}-{}", &suffix[..8])
}

/// File-system safe name for a selector (`10.0.0.5:5555` -> `10.0.0.5_5555`).
pub fn device_slug(selector: &str) -> String {
    let options = Options {
        windows: true,
        truncate: true,
        replacement: "_",
    };
    let slug = sanitize_with_options(selector.trim(), options);
    let slug = slug.trim_matches(|c: char| c == '.' || c == '_' || c.is_whitespace());
    if slug.is_empty() {
        "device".to_string()
    } else {
        slug.to_string()
    }
}
