use anyhow::Context;
use clap::{Parser, ValueEnum};
use dut_runner_lib::services::bugreport::{ReportKind, RetentionPolicy};
use dut_runner_lib::services::config::{split_device_list, BugreportPolicy};
use dut_runner_lib::services::device::clean_selector_value;
use dut_runner_lib::types::errors::ResolveError;
use dut_runner_lib::{AdbShell, ManifestHandoff, Orchestrator, RunError, RunnerConfig};
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    Auto,
    Always,
    Never,
}

impl From<PolicyArg> for BugreportPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Auto => BugreportPolicy::Auto,
            PolicyArg::Always => BugreportPolicy::Always,
            PolicyArg::Never => BugreportPolicy::Never,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    OnDemand,
    Periodic,
    Any,
}

impl From<KindArg> for ReportKind {
    fn from(arg: KindArg) -> Self {
        match arg {
            KindArg::OnDemand => ReportKind::OnDemand,
            KindArg::Periodic => ReportKind::Periodic,
            KindArg::Any => ReportKind::Any,
        }
    }
}

/// Credentials are read from AUTH and COOKIE only, never from the command line.
#[derive(Parser)]
#[command(name = "dut-runner")]
#[command(version)]
#[command(about = "Resolve a device under test, pick its suite and prepare bugreport fixtures")]
struct Cli {
    /// Device selector: serial, IP or ip:port. Comma separated or repeated for several devices
    #[arg(short, long = "device", env = "DEVICE", value_delimiter = ',')]
    devices: Vec<String>,

    /// Run every configured device in parallel instead of only the first
    #[arg(long)]
    all_devices: bool,

    /// Bugreport archive: local file, directory of debugarchive_*.zip, or http(s) URL
    #[arg(long, env = "BUGREPORT_SOURCE")]
    bugreport: Option<String>,

    /// Bugreport service base URL, used when no --bugreport is given
    #[arg(long, env = "BUGREPORT_API")]
    bugreport_api: Option<String>,

    /// Which service reports to accept
    #[arg(long, value_enum)]
    bugreport_kind: Option<KindArg>,

    /// How far back the service lookup reaches
    #[arg(long)]
    bugreport_window_minutes: Option<u64>,

    #[arg(long, value_enum, default_value = "auto")]
    bugreport_policy: PolicyArg,

    /// Explicit 7-Zip executable
    #[arg(long, env = "SEVEN_ZIP")]
    seven_zip: Option<PathBuf>,

    #[arg(long, env = "REPORTS_DIR")]
    reports_dir: Option<PathBuf>,

    #[arg(long, env = "REPORT_FILE")]
    report_file: Option<String>,

    /// Scratch space for downloads and extracted archives
    #[arg(long, env = "WORK_DIR")]
    work_dir: Option<PathBuf>,

    #[arg(long, env = "ADB_PATH")]
    adb: Option<PathBuf>,

    /// Delete downloaded archives after extraction
    #[arg(long)]
    delete_archives: bool,

    /// Replace an existing extraction destination
    #[arg(long)]
    overwrite: bool,

    /// Do not unpack archives found inside the bugreport
    #[arg(long)]
    no_nested: bool,

    #[arg(long, default_value_t = 120)]
    http_timeout_secs: u64,

    #[arg(long, default_value_t = 600)]
    extract_timeout_secs: u64,

    #[arg(long, default_value_t = 30)]
    adb_timeout_secs: u64,
}

impl Cli {
    fn apply(&self, config: &mut RunnerConfig) {
        let devices: Vec<String> = self
            .devices
            .iter()
            .flat_map(|d| split_device_list(&clean_selector_value(d)))
            .collect();
        if !devices.is_empty() {
            config.devices = devices;
        }
        if let Some(source) = &self.bugreport {
            config.bugreport_source = Some(source.clone());
        }
        if let Some(api) = &self.bugreport_api {
            config.bugreport_api = Some(api.clone());
        }
        if let Some(kind) = self.bugreport_kind {
            config.bugreport_kind = kind.into();
        }
        if let Some(minutes) = self.bugreport_window_minutes {
            config.bugreport_window_minutes = minutes;
        }
        if let Some(path) = &self.seven_zip {
            config.seven_zip = Some(path.clone());
        }
        if let Some(dir) = &self.reports_dir {
            config.reports_dir = dir.clone();
        }
        if let Some(name) = &self.report_file {
            config.report_file = name.clone();
        }
        if let Some(dir) = &self.work_dir {
            config.work_dir = dir.clone();
        }
        if let Some(adb) = &self.adb {
            config.adb_path = adb.clone();
        }
        config.bugreport_policy = self.bugreport_policy.into();
        if self.delete_archives {
            config.retention = RetentionPolicy::Delete;
        }
        config.overwrite = self.overwrite;
        config.expand_nested = !self.no_nested;
        config.http_timeout_secs = self.http_timeout_secs;
        config.extract_timeout_secs = self.extract_timeout_secs;
        config.adb_timeout_secs = self.adb_timeout_secs;
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    // Load .env before parsing so env-bound flags see it.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // Dropping the run future aborts device tasks and removes partial extractions.
    let result = tokio::select! {
        result = run(cli) => result,
        signal = shutdown_signal() => {
            error!("Received {signal}, abandoning in-flight runs");
            return ExitCode::from(130);
        }
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Resolves with the name of the first termination signal received.
async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => tokio::select! {
                _ = tokio::signal::ctrl_c() => "Ctrl-C",
                _ = terminate.recv() => "SIGTERM",
            },
            Err(e) => {
                log::warn!("SIGTERM handler unavailable: {e}");
                ctrl_c_or_pending().await
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c_or_pending().await
    }
}

async fn ctrl_c_or_pending() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("Ctrl-C handler unavailable: {e}");
        std::future::pending::<()>().await;
    }
    "Ctrl-C"
}

/// Returns whether every run succeeded.
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let mut config = RunnerConfig::from_env();
    cli.apply(&mut config);
    config.validate()?;

    let selectors: Vec<String> = if cli.all_devices {
        config.devices.clone()
    } else {
        config.primary_device().map(str::to_string).into_iter().collect()
    };
    if selectors.is_empty() {
        return Err(RunError::from(ResolveError::NoDeviceSpecified).into());
    }

    let shell = AdbShell::new(
        config.adb_path.clone(),
        Duration::from_secs(config.adb_timeout_secs),
    );
    let orchestrator = Arc::new(Orchestrator::new(config, shell, ManifestHandoff));

    if let [selector] = selectors.as_slice() {
        let outcome = orchestrator
            .run_once(selector)
            .await
            .with_context(|| format!("Run for {selector} failed"))?;
        info!(
            "Done: {} -> {} (bugreport fixtures: {})",
            outcome.device.serial,
            outcome.pytest_target,
            if outcome.bugreport_available() { "yes" } else { "no" }
        );
        return Ok(true);
    }

    info!("Dispatching {} parallel runs", selectors.len());
    let results = orchestrator.run_many(&selectors).await?;
    let mut all_ok = true;
    for (selector, result) in &results {
        match result {
            Ok(outcome) => info!("{selector}: {} ({})", outcome.suite.label(), outcome.pytest_target),
            Err(e) => {
                all_ok = false;
                error!("{selector}: {e}");
            }
        }
    }
    Ok(all_ok)
}
