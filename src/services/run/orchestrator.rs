//! One run per device: resolve, classify, optionally fetch and unpack a
//! bugreport, then hand the result to the test runner.

use super::handoff::{RunOutcome, TestHandoff};
use super::layout::{device_slug, RunLayout};
use crate::services::archive::{ExtractOptions, ExtractionResult, Extractor, ExtractorConfig};
use crate::services::bugreport::{
    locate_fixtures, ApiQuery, BugreportFetcher, BugreportFixtures, BugreportSource,
};
use crate::services::config::{BugreportPolicy, RunnerConfig};
use crate::services::device::{
    normalize_selector, DeviceResolver, DeviceShell, ResolverConfig, SuiteTarget,
};
use crate::types::errors::{BugreportError, RunError};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

pub struct Orchestrator<S, H> {
    config: RunnerConfig,
    shell: S,
    handoff: H,
    extractor: Extractor,
}

impl<S, H> Orchestrator<S, H>
where
    S: DeviceShell + Clone + 'static,
    H: TestHandoff + 'static,
{
    pub fn new(config: RunnerConfig, shell: S, handoff: H) -> Self {
        let extractor = Extractor::new(ExtractorConfig {
            seven_zip_override: config.seven_zip.clone(),
            tool_timeout: Duration::from_secs(config.extract_timeout_secs),
        });
        Self {
            config,
            shell,
            handoff,
            extractor,
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run the full pipeline for one selector.
    ///
    /// Resolution errors end the run. Bugreport errors are logged with their kind
    /// and recorded in the outcome; the suite still runs without fixtures.
    pub async fn run_once(&self, selector: &str) -> Result<RunOutcome, RunError> {
        let resolver = DeviceResolver::new(
            self.shell.clone(),
            ResolverConfig {
                connect_attempts: self.config.connect_attempts,
                connect_delay: Duration::from_millis(self.config.connect_delay_ms),
            },
        );

        let device = resolver.resolve(selector).await.map_err(|e| {
            log::error!("Device resolution failed: {e}");
            e
        })?;
        let device_info = resolver.device_info(&device).await;
        log::info!(
            "Selected device: {} | {} / {}",
            device_info.serial_no.as_deref().unwrap_or(&device.serial),
            device_info.board.as_deref().unwrap_or("?"),
            device_info.display_name.as_deref().unwrap_or("?")
        );
        let suite = resolver.classify(&device).await;

        let layout = RunLayout::new(
            selector,
            &self.config.reports_dir,
            &self.config.work_dir,
            &self.config.report_file,
        );
        layout.create_dirs()?;
        log::info!("Run {} for {} -> {}", layout.run_id, device.serial, suite.label());

        let bugreport_requested = self.wants_bugreport(suite);
        let mut outcome = RunOutcome {
            selector: selector.to_string(),
            pytest_target: suite.pytest_target().to_string(),
            device,
            device_info,
            suite,
            layout,
            bugreport_requested,
            extraction: None,
            fixtures: None,
            bugreport_error_kind: None,
            bugreport_error: None,
        };

        if bugreport_requested {
            // The service knows devices by the serial they report, not the adb address.
            let device_id = outcome
                .device_info
                .serial_no
                .as_deref()
                .unwrap_or(&outcome.device.serial);
            match self.acquire_bugreport(&outcome.layout, device_id).await {
                Ok((extraction, fixtures)) => {
                    outcome.extraction = Some(extraction);
                    outcome.fixtures = Some(fixtures);
                }
                Err(e) => {
                    log::warn!(
                        "Bugreport fixtures unavailable ({}): {e}. Continuing without them",
                        e.kind()
                    );
                    outcome.bugreport_error_kind = Some(e.kind().to_string());
                    outcome.bugreport_error = Some(e.to_string());
                }
            }
        }

        self.handoff.hand_off(&outcome)?;
        Ok(outcome)
    }

    fn wants_bugreport(&self, suite: SuiteTarget) -> bool {
        match self.config.bugreport_policy {
            BugreportPolicy::Never => false,
            BugreportPolicy::Always => true,
            BugreportPolicy::Auto => {
                if !suite.uses_bugreport_fixtures() {
                    return false;
                }
                if !self.config.has_bugreport_source() {
                    log::info!(
                        "{} reads bugreport fixtures but neither BUGREPORT_SOURCE nor BUGREPORT_API is set",
                        suite.label()
                    );
                    return false;
                }
                true
            }
        }
    }

    fn bugreport_source(&self, device_id: &str) -> Option<BugreportSource> {
        if let Some(source) = self.config.bugreport_source.as_deref() {
            return Some(BugreportSource::parse(source));
        }
        self.config.bugreport_api.as_ref().map(|base_url| {
            BugreportSource::Api(ApiQuery {
                base_url: base_url.clone(),
                device_id: device_id.to_string(),
                kind: self.config.bugreport_kind,
                window_minutes: self.config.bugreport_window_minutes,
            })
        })
    }

    async fn acquire_bugreport(
        &self,
        layout: &RunLayout,
        device_id: &str,
    ) -> Result<(ExtractionResult, BugreportFixtures), BugreportError> {
        let source = self
            .bugreport_source(device_id)
            .ok_or(BugreportError::NoSource)?;

        let fetcher = BugreportFetcher::new(Duration::from_secs(self.config.http_timeout_secs))?;
        let archive = fetcher
            .fetch(&source, &self.config.credentials, &layout.downloads_dir)
            .await?;

        let options = ExtractOptions {
            overwrite: self.config.overwrite,
            expand_nested: self.config.expand_nested,
        };
        let extracted = self
            .extractor
            .extract(&archive.path, &layout.extracted_dir, options)
            .await;
        archive.dispose(self.config.retention);
        let extraction = extracted?;

        let fixtures = locate_fixtures(&extraction.root_dir);
        if fixtures.is_empty() {
            log::info!("No known fixture files in {}", extraction.root_dir.display());
        }
        Ok((extraction, fixtures))
    }

    /// Run every selector in its own task. Selectors naming the same device, or
    /// mapping to the same report directory, are rejected before anything starts.
    ///
    /// Dropping the returned future aborts every run still in flight.
    pub async fn run_many(
        self: &Arc<Self>,
        selectors: &[String],
    ) -> Result<Vec<(String, Result<RunOutcome, RunError>)>, RunError> {
        let mut seen_targets = HashSet::new();
        let mut seen_slugs = HashMap::new();
        for selector in selectors {
            let key = normalize_selector(selector)
                .map(|n| n.target)
                .unwrap_or_else(|_| selector.trim().to_string());
            if !seen_targets.insert(key.clone()) {
                return Err(RunError::Config(format!(
                    "Device {key} is listed more than once; parallel runs need distinct devices"
                )));
            }
            let slug = device_slug(selector);
            if let Some(other) = seen_slugs.insert(slug.clone(), selector.as_str()) {
                return Err(RunError::Config(format!(
                    "Devices {other} and {selector} would share the report directory {slug}"
                )));
            }
        }

        let mut tasks = JoinSet::new();
        let mut task_index = HashMap::with_capacity(selectors.len());
        for (index, selector) in selectors.iter().enumerate() {
            let this = Arc::clone(self);
            let task_selector = selector.clone();
            let handle = tasks.spawn(async move { this.run_once(&task_selector).await });
            task_index.insert(handle.id(), index);
        }

        let mut slots: Vec<Option<Result<RunOutcome, RunError>>> =
            selectors.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next_with_id().await {
            let (id, result) = match joined {
                Ok((id, result)) => (id, result),
                Err(e) => (e.id(), Err(RunError::Aborted(e.to_string()))),
            };
            if let Some(&index) = task_index.get(&id) {
                if let Err(e) = &result {
                    log::error!("Run for {} failed: {e}", selectors[index]);
                }
                slots[index] = Some(result);
            }
        }

        Ok(selectors
            .iter()
            .cloned()
            .zip(slots)
            .map(|(selector, slot)| {
                let result = slot.unwrap_or_else(|| {
                    Err(RunError::Aborted(format!("run for {selector} never finished")))
                });
                (selector, result)
            })
            .collect())
    }
}
