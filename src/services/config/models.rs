use crate::services::bugreport::{FetchCredentials, ReportKind, RetentionPolicy};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// When a run fetches and unpacks a bugreport.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BugreportPolicy {
    /// Only for suites that read bugreport fixtures, and only with a source configured.
    #[default]
    Auto,
    /// Caller asked for fixtures regardless of suite.
    Always,
    Never,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RunnerConfig {
    /// Raw selectors, in priority order. The first one is the default run target.
    pub devices: Vec<String>,
    /// Never serialized: these are opaque session tokens.
    #[serde(skip)]
    pub credentials: FetchCredentials,
    pub seven_zip: Option<PathBuf>,
    pub reports_dir: PathBuf,
    pub report_file: String,
    /// Explicit archive location. Takes precedence over `bugreport_api`.
    pub bugreport_source: Option<String>,
    /// Base URL of the bugreport service, e.g. `https://host/api`.
    pub bugreport_api: Option<String>,
    pub bugreport_kind: ReportKind,
    pub bugreport_window_minutes: u64,
    pub work_dir: PathBuf,
    pub adb_path: PathBuf,
    pub adb_timeout_secs: u64,
    pub http_timeout_secs: u64,
    pub extract_timeout_secs: u64,
    pub connect_attempts: u32,
    pub connect_delay_ms: u64,
    pub retention: RetentionPolicy,
    pub overwrite: bool,
    pub expand_nested: bool,
    pub bugreport_policy: BugreportPolicy,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            devices: Vec::new(),
            credentials: FetchCredentials::default(),
            seven_zip: None,
            reports_dir: PathBuf::from("reports"),
            report_file: "index.html".into(),
            bugreport_source: None,
            bugreport_api: None,
            bugreport_kind: ReportKind::Any,
            bugreport_window_minutes: 60,
            work_dir: std::env::temp_dir().join("dut-runner"),
            adb_path: PathBuf::from("adb"),
            adb_timeout_secs: 30,
            http_timeout_secs: 120,
            extract_timeout_secs: 600,
            connect_attempts: 2,
            connect_delay_ms: 3000,
            retention: RetentionPolicy::Keep,
            overwrite: false,
            expand_nested: true,
            bugreport_policy: BugreportPolicy::Auto,
        }
    }
}

impl RunnerConfig {
    pub fn primary_device(&self) -> Option<&str> {
        self.devices.first().map(String::as_str)
    }

    pub fn has_bugreport_source(&self) -> bool {
        self.bugreport_source.is_some() || self.bugreport_api.is_some()
    }
}
