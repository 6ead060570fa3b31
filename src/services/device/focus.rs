//! Focused-window parsing and the focus-to-suite classifier.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static CURRENT_FOCUS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"mCurrentFocus=(.*)").expect("valid current focus regex"));

static FOCUSED_APP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"mFocusedApp=(.*)").expect("valid focused app regex"));

/// Pull the `package/activity` token out of a `dumpsys window` dump.
///
/// `mCurrentFocus` wins; `mFocusedApp` is used when it yields nothing.
/// Among matching lines the last one without `null` is taken.
pub fn extract_focus_token(dump: &str) -> Option<String> {
    token_from(&CURRENT_FOCUS_RE, dump).or_else(|| token_from(&FOCUSED_APP_RE, dump))
}

fn token_from(re: &Regex, dump: &str) -> Option<String> {
    let field = dump
        .lines()
        .filter_map(|line| re.captures(line))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .filter(|value| !value.contains("null"))
        .last()?;

    // Window titles without an activity (e.g. `Window{1f u0 ZoomRooms}`) fall back to the whole field.
    let token = field
        .split_whitespace()
        .find(|part| part.contains('/'))
        .unwrap_or(field)
        .trim()
        .trim_end_matches('}');
    (!token.is_empty()).then(|| token.to_string())
}

/// The suite a run targets. Exactly one per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SuiteTarget {
    Zoom,
    Teams,
    DeviceMode,
    AllSuites,
}

impl SuiteTarget {
    /// Path handed to pytest for this suite.
    pub fn pytest_target(&self) -> &'static str {
        match self {
            Self::Zoom => "testcases/tests_zoom",
            Self::Teams => "testcases/tests_mtr",
            Self::DeviceMode => "testcases/tests_device_mode",
            Self::AllSuites => "testcases",
        }
    }

    /// Suites whose cases read unpacked bugreport files.
    pub fn uses_bugreport_fixtures(&self) -> bool {
        !matches!(self, Self::AllSuites)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Zoom => "Zoom",
            Self::Teams => "Teams/MTR",
            Self::DeviceMode => "DeviceMode",
            Self::AllSuites => "AllSuites",
        }
    }
}

/// Tokens that mark the device-mode companion app. It also carries "teams" in
/// its package name, so Teams must exclude these explicitly.
const DEVICE_MODE_MARKERS: &[&str] = &["frogger", "device_mode", "devicemode"];

fn is_zoom(token: &str) -> bool {
    token.contains("zoom")
}

fn is_device_mode(token: &str) -> bool {
    DEVICE_MODE_MARKERS.iter().any(|m| token.contains(m))
}

fn is_teams(token: &str) -> bool {
    (token.contains("teams") || token.contains("mtr")) && !is_device_mode(token)
}

/// Evaluated top to bottom on the lowercased token; first match wins.
const RULES: &[(fn(&str) -> bool, SuiteTarget)] = &[
    (is_zoom, SuiteTarget::Zoom),
    (is_device_mode, SuiteTarget::DeviceMode),
    (is_teams, SuiteTarget::Teams),
];

/// Map a focus token to its suite. No token, or no match, is `AllSuites`.
pub fn classify_token(token: Option<&str>) -> SuiteTarget {
    let Some(token) = token else {
        return SuiteTarget::AllSuites;
    };
    let lower = token.to_lowercase();
    RULES
        .iter()
        .find(|(matches, _)| matches(&lower))
        .map(|(_, suite)| *suite)
        .unwrap_or(SuiteTarget::AllSuites)
}
