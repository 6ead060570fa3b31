use super::focus::{classify_token, extract_focus_token, SuiteTarget};
use super::selector::{normalize_selector, DeviceSource};
use super::shell::{connect_succeeded, live_serials, DeviceShell};
use crate::types::errors::ResolveError;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use std::time::Duration;

static GETPROP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[([^\]]+)\]:\s*\[(.*?)\]").expect("valid getprop regex")
});

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Total `adb connect` attempts for a network target.
    pub connect_attempts: u32,
    pub connect_delay: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            connect_attempts: 2,
            connect_delay: Duration::from_secs(3),
        }
    }
}

/// A live device handle. Only built after the device answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectedDevice {
    pub serial: String,
    pub source: DeviceSource,
}

/// Identity properties logged and written to the manifest. Missing ones stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub serial_no: Option<String>,
    pub board: Option<String>,
    pub display_name: Option<String>,
}

/// Parse the `[key]: [value]` lines printed by `getprop`.
pub fn parse_device_info(getprop: &str) -> DeviceInfo {
    let mut info = DeviceInfo::default();
    for caps in getprop.lines().filter_map(|l| GETPROP_RE.captures(l.trim())) {
        let value = caps[2].trim();
        if value.is_empty() {
            continue;
        }
        let slot = match &caps[1] {
            "ro.serialno" => &mut info.serial_no,
            "ro.product.board" => &mut info.board,
            "ro.product.displayname" => &mut info.display_name,
            _ => continue,
        };
        *slot = Some(value.to_string());
    }
    info
}

/// Turns raw selectors into connected devices and picks their suite.
pub struct DeviceResolver<S> {
    shell: S,
    config: ResolverConfig,
}

impl<S: DeviceShell> DeviceResolver<S> {
    pub fn new(shell: S, config: ResolverConfig) -> Self {
        Self { shell, config }
    }

    pub fn shell(&self) -> &S {
        &self.shell
    }

    /// Resolve `raw` to a connected device.
    ///
    /// Network targets are connected (bounded retry) and then confirmed in the
    /// live device list. Serials are used as given.
    pub async fn resolve(&self, raw: &str) -> Result<ConnectedDevice, ResolveError> {
        let selector = normalize_selector(raw)?;

        if selector.source == DeviceSource::NetworkIp {
            self.connect_with_retry(raw, &selector.target).await?;
            self.confirm_listed(raw, &selector.target).await?;
        }

        log::info!("Resolved device {} ({:?})", selector.target, selector.source);
        Ok(ConnectedDevice {
            serial: selector.target,
            source: selector.source,
        })
    }

    async fn connect_with_retry(&self, raw: &str, addr: &str) -> Result<(), ResolveError> {
        // Stale sessions make `adb connect` report success for a dead device.
        if let Err(e) = self.shell.disconnect(addr).await {
            log::debug!("Pre-connect disconnect of {addr} ignored: {e}");
        }

        let attempts = self.config.connect_attempts.max(1);
        let mut last_output = String::new();
        for attempt in 1..=attempts {
            match self.shell.connect(addr).await {
                Ok(output) if connect_succeeded(&output) => {
                    log::info!("Connected to {addr} (attempt {attempt}/{attempts})");
                    return Ok(());
                }
                Ok(output) => last_output = output.trim().to_string(),
                Err(e) => last_output = e.to_string(),
            }
            log::warn!("Connect to {addr} failed (attempt {attempt}/{attempts}): {last_output}");
            if attempt < attempts {
                tokio::time::sleep(self.config.connect_delay).await;
            }
        }

        Err(ResolveError::DeviceUnreachable {
            selector: raw.to_string(),
            last_output,
        })
    }

    async fn confirm_listed(&self, raw: &str, serial: &str) -> Result<(), ResolveError> {
        let listing = match self.shell.list_devices().await {
            Ok(listing) => listing,
            Err(e) => {
                return Err(ResolveError::DeviceNotConfirmed {
                    selector: raw.to_string(),
                    serial: serial.to_string(),
                    last_output: e.to_string(),
                })
            }
        };

        if live_serials(&listing).iter().any(|s| s == serial) {
            return Ok(());
        }
        Err(ResolveError::DeviceNotConfirmed {
            selector: raw.to_string(),
            serial: serial.to_string(),
            last_output: listing.trim().to_string(),
        })
    }

    /// Pick the suite from the focused window. Any failure falls back to `AllSuites`.
    pub async fn classify(&self, device: &ConnectedDevice) -> SuiteTarget {
        let token = match self.shell.focus_dump(&device.serial).await {
            Ok(dump) => extract_focus_token(&dump),
            Err(e) => {
                log::warn!("Focus query on {} failed, running all suites: {e}", device.serial);
                None
            }
        };

        let suite = classify_token(token.as_deref());
        log::info!(
            "Focused app on {}: {} -> {}",
            device.serial,
            token.as_deref().unwrap_or("<none>"),
            suite.label()
        );
        suite
    }

    /// Best-effort identity lookup. Never fails the run.
    pub async fn device_info(&self, device: &ConnectedDevice) -> DeviceInfo {
        match self.shell.getprop(&device.serial).await {
            Ok(output) => parse_device_info(&output),
            Err(e) => {
                log::warn!("getprop on {} failed: {e}", device.serial);
                DeviceInfo::default()
            }
        }
    }
}
