//! Runner configuration: defaults, `.env`/process environment, and validation.
//!
//! Everything is read once here and handed to components at construction.

pub mod models;

pub use models::*;

use crate::services::bugreport::{FetchCredentials, ReportKind};
use crate::services::device::clean_selector_value;
use crate::types::errors::RunError;
use std::path::{Path, PathBuf};

/// Default location of the device list inside a CI workspace.
const DEVICES_FILE: &str = "config/devices.txt";

impl RunnerConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // Try to load .env, ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| clean_selector_value(&v))
                .filter(|v| !v.is_empty())
        };
        let workspace = get("WORKSPACE").map(PathBuf::from);
        let defaults = Self::default();

        Self {
            devices: device_selectors(get("DEVICE"), get("DEVICES"), workspace.as_deref()),
            // Header values are opaque: no unquoting or trimming beyond presence.
            credentials: FetchCredentials {
                authorization: lookup("AUTH").filter(|v| !v.trim().is_empty()),
                cookie: lookup("COOKIE").filter(|v| !v.trim().is_empty()),
            },
            seven_zip: get("SEVEN_ZIP").map(PathBuf::from),
            reports_dir: get("REPORTS_DIR")
                .map(PathBuf::from)
                .or_else(|| workspace.as_ref().map(|w| w.join("reports")))
                .unwrap_or(defaults.reports_dir),
            report_file: get("REPORT_FILE").unwrap_or(defaults.report_file),
            bugreport_source: get("BUGREPORT_SOURCE"),
            bugreport_api: get("BUGREPORT_API"),
            bugreport_kind: get("BUGREPORT_KIND")
                .and_then(|v| {
                    let kind = ReportKind::parse(&v);
                    if kind.is_none() {
                        log::warn!("Ignoring unknown BUGREPORT_KIND {v}; accepting any report");
                    }
                    kind
                })
                .unwrap_or(defaults.bugreport_kind),
            bugreport_window_minutes: get("BUGREPORT_WINDOW_MINUTES")
                .and_then(|v| {
                    let minutes = v.parse().ok();
                    if minutes.is_none() {
                        log::warn!("Ignoring non-numeric BUGREPORT_WINDOW_MINUTES {v}");
                    }
                    minutes
                })
                .unwrap_or(defaults.bugreport_window_minutes),
            work_dir: get("WORK_DIR").map(PathBuf::from).unwrap_or(defaults.work_dir),
            adb_path: get("ADB_PATH").map(PathBuf::from).unwrap_or(defaults.adb_path),
            ..defaults
        }
    }

    /// Presence checks only. Credential contents are never inspected.
    pub fn validate(&self) -> Result<(), RunError> {
        if self.report_file.trim().is_empty() {
            return Err(RunError::Config("REPORT_FILE must not be empty".into()));
        }
        if self.report_file.contains(['/', '\\']) {
            return Err(RunError::Config(format!(
                "REPORT_FILE must be a file name, got {}",
                self.report_file
            )));
        }
        if self.reports_dir.as_os_str().is_empty() || self.work_dir.as_os_str().is_empty() {
            return Err(RunError::Config(
                "Reports and work directories must be set".into(),
            ));
        }
        if self.connect_attempts == 0 {
            return Err(RunError::Config("connect attempts must be at least 1".into()));
        }
        if self.adb_timeout_secs == 0 || self.http_timeout_secs == 0 || self.extract_timeout_secs == 0
        {
            return Err(RunError::Config("timeouts must be greater than zero".into()));
        }
        if let Some(api) = &self.bugreport_api {
            let lower = api.to_lowercase();
            if !lower.starts_with("http://") && !lower.starts_with("https://") {
                return Err(RunError::Config(format!(
                    "BUGREPORT_API must be an http(s) URL, got {api}"
                )));
            }
            if self.bugreport_window_minutes == 0 {
                return Err(RunError::Config(
                    "BUGREPORT_WINDOW_MINUTES must be greater than zero".into(),
                ));
            }
        }
        Ok(())
    }
}

/// `DEVICE`, then every `DEVICES` entry, then the first line of the workspace device file.
fn device_selectors(
    device: Option<String>,
    devices: Option<String>,
    workspace: Option<&Path>,
) -> Vec<String> {
    if let Some(device) = device {
        return vec![device];
    }
    if let Some(list) = devices {
        let parsed = split_device_list(&list);
        if !parsed.is_empty() {
            return parsed;
        }
    }
    workspace
        .and_then(|w| first_device_in_file(&w.join(DEVICES_FILE)))
        .into_iter()
        .collect()
}

/// Split a comma, semicolon or whitespace separated device list.
pub fn split_device_list(list: &str) -> Vec<String> {
    list.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .map(clean_selector_value)
        .filter(|s| !s.is_empty())
        .collect()
}

fn first_device_in_file(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    content
        .lines()
        .map(clean_selector_value)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
