use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use crate::types::errors::ResolveError;

/// Port `adb connect` uses when a bare IP is given.
pub const DEFAULT_ADB_PORT: u16 = 5555;

static BARE_IP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{1,3}(?:\.\d{1,3}){3}$").expect("valid bare ip regex")
});

/// How a selector reaches the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeviceSource {
    /// Already paired (USB or previously connected); no network connect.
    Serial,
    /// `ip:port`, reached through `adb connect`.
    NetworkIp,
}

/// A selector after trimming and port defaulting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedSelector {
    pub target: String,
    pub source: DeviceSource,
}

/// Normalize a raw selector.
///
/// Bare IPs gain `:5555`; anything with a colon is a network target;
/// everything else is a serial. Empty input is `NoDeviceSpecified`.
pub fn normalize_selector(raw: &str) -> Result<NormalizedSelector, ResolveError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ResolveError::NoDeviceSpecified);
    }

    let target = if BARE_IP_RE.is_match(trimmed) {
        format!("{trimmed}:{DEFAULT_ADB_PORT}")
    } else {
        trimmed.to_string()
    };

    let source = if target.contains(':') {
        DeviceSource::NetworkIp
    } else {
        DeviceSource::Serial
    };

    Ok(NormalizedSelector { target, source })
}

/// Strip whitespace and one pair of surrounding quotes from a configured value.
pub fn clean_selector_value(value: &str) -> String {
    let trimmed = value.trim();
    let unquoted = ['"', '\'']
        .iter()
        .find_map(|q| {
            trimmed
                .strip_prefix(*q)
                .and_then(|rest| rest.strip_suffix(*q))
        })
        .unwrap_or(trimmed);
    unquoted.trim().to_string()
}
