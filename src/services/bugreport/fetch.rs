//! Bugreport acquisition: local pass-through, a direct HTTP download, or a lookup
//! through the bugreport service API followed by a presigned download.

use crate::types::errors::FetchError;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, AUTHORIZATION, COOKIE};
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::io::AsyncWriteExt;

/// Prefix of archive names produced by the bugreport endpoint.
const DEBUG_ARCHIVE_PREFIX: &str = "debugarchive_";

/// Report tag the service gives debug archives.
const DEBUG_ARCHIVE_TAG: &str = "debugarchive";

/// Upper bound on an API lookup window (one year).
const MAX_WINDOW_MINUTES: u64 = 366 * 24 * 60;

/// Where a bugreport archive comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BugreportSource {
    /// A file used as is, or a directory holding `debugarchive_*.zip` files.
    Local(PathBuf),
    Remote(String),
    /// The newest matching report the service lists for a device.
    Api(ApiQuery),
}

/// Which reports an API lookup accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportKind {
    OnDemand,
    Periodic,
    #[default]
    Any,
}

impl ReportKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().replace('_', "-").as_str() {
            "on-demand" | "ondemand" => Some(Self::OnDemand),
            "periodic" => Some(Self::Periodic),
            "any" | "" => Some(Self::Any),
            _ => None,
        }
    }

    fn accepts(self, item: &Value) -> bool {
        match self {
            Self::OnDemand => is_on_demand(item),
            Self::Periodic => is_periodic(item),
            Self::Any => true,
        }
    }
}

/// A service lookup: `GET {base_url}/bugreports/{device_id}?from=..&to=..`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiQuery {
    pub base_url: String,
    pub device_id: String,
    pub kind: ReportKind,
    /// The lookup covers this many minutes back from now.
    pub window_minutes: u64,
}

impl BugreportSource {
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        let lower = value.to_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Self::Remote(value.to_string())
        } else {
            Self::Local(PathBuf::from(value))
        }
    }
}

/// Opaque header values passed through verbatim.
#[derive(Clone, Default)]
pub struct FetchCredentials {
    pub authorization: Option<String>,
    pub cookie: Option<String>,
}

impl std::fmt::Debug for FetchCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchCredentials")
            .field("authorization", &self.authorization.as_deref().map(redact))
            .field("cookie", &self.cookie.as_deref().map(redact))
            .finish()
    }
}

/// Loggable stand-in for a credential value.
pub fn redact(value: &str) -> String {
    format!("<redacted {} bytes>", value.len())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionPolicy {
    #[default]
    Keep,
    /// Remove archives this run downloaded once extraction is done.
    Delete,
}

/// An archive ready for extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchedArchive {
    pub path: PathBuf,
    /// True when this run created the file (and therefore may delete it).
    pub downloaded: bool,
}

impl FetchedArchive {
    /// Apply the retention policy. Caller-supplied local files are never touched.
    pub fn dispose(&self, policy: RetentionPolicy) {
        if policy == RetentionPolicy::Keep || !self.downloaded {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => log::info!("Removed downloaded archive {}", self.path.display()),
            Err(e) => log::warn!(
                "Failed to remove downloaded archive {}: {e}",
                self.path.display()
            ),
        }
    }
}

pub struct BugreportFetcher {
    client: Client,
}

impl BugreportFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Produce a local archive for `source`.
    ///
    /// Remote bodies are streamed into `downloads_dir`. No retries: a failed
    /// request is reported, since repeating it can trigger another report build.
    pub async fn fetch(
        &self,
        source: &BugreportSource,
        credentials: &FetchCredentials,
        downloads_dir: &Path,
    ) -> Result<FetchedArchive, FetchError> {
        match source {
            BugreportSource::Local(path) => {
                let path = resolve_local(path)?;
                log::info!("Using local bugreport archive {}", path.display());
                Ok(FetchedArchive {
                    path,
                    downloaded: false,
                })
            }
            BugreportSource::Remote(url) => {
                let target = downloads_dir.join(archive_file_name(url));
                let path = self
                    .download(url, Some(credentials), downloads_dir, target)
                    .await?;
                Ok(FetchedArchive {
                    path,
                    downloaded: true,
                })
            }
            BugreportSource::Api(query) => {
                let path = self.fetch_from_api(query, credentials, downloads_dir).await?;
                Ok(FetchedArchive {
                    path,
                    downloaded: true,
                })
            }
        }
    }

    /// List the device's reports in the window, presign the newest match and
    /// download it. The signed URL carries its own authorization, so the
    /// credentials only go to the service itself.
    async fn fetch_from_api(
        &self,
        query: &ApiQuery,
        credentials: &FetchCredentials,
        downloads_dir: &Path,
    ) -> Result<PathBuf, FetchError> {
        let to = Utc::now();
        let minutes = query.window_minutes.min(MAX_WINDOW_MINUTES) as i64;
        let from = to - chrono::Duration::minutes(minutes);
        let list_url = report_list_url(&query.base_url, &query.device_id, from, to)?;
        log::info!(
            "Listing {:?} bugreports for {} from {} to {}",
            query.kind,
            query.device_id,
            iso_z(from),
            iso_z(to)
        );

        let response = with_credentials(self.client.get(list_url), credentials)
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let items: Value = read_json(response, "bugreport list").await?;
        let items = items.as_array().map(Vec::as_slice).unwrap_or_default();

        let (stamp, item) = newest_debug_archive_item(items, query.kind).ok_or_else(|| {
            FetchError::SourceMissing(format!(
                "No {:?} {DEBUG_ARCHIVE_TAG} for {} in the last {} minutes",
                query.kind, query.device_id, query.window_minutes
            ))
        })?;
        let report_path = item
            .get("path")
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| FetchError::BadResponse("listed report has no path".to_string()))?;
        log::info!("Found {} bugreport from {}", report_label(item), iso_z(stamp));

        let signed_url = self.presign(&query.base_url, report_path, credentials).await?;
        let name = format!(
            "{DEBUG_ARCHIVE_PREFIX}{}_{}.zip",
            report_label(item),
            stamp.format("%Y%m%dT%H%M%S%3fZ")
        );
        self.download(&signed_url, None, downloads_dir, downloads_dir.join(name))
            .await
    }

    async fn presign(
        &self,
        base_url: &str,
        report_path: &str,
        credentials: &FetchCredentials,
    ) -> Result<String, FetchError> {
        let url = format!("{}/bugreports/get-download-url", base_url.trim_end_matches('/'));
        let response = with_credentials(self.client.post(&url), credentials)
            .header(ACCEPT, "application/json")
            .json(&serde_json::json!({ "path": report_path }))
            .send()
            .await?;
        let reply: Value = read_json(response, "download URL request").await?;
        ["url", "signedUrl", "download_url"]
            .iter()
            .find_map(|key| reply.get(*key).and_then(Value::as_str))
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                FetchError::BadResponse("download URL reply carries no URL".to_string())
            })
    }

    /// Stream `url` into `final_path` via a `.part` sibling.
    async fn download(
        &self,
        url: &str,
        credentials: Option<&FetchCredentials>,
        downloads_dir: &Path,
        final_path: PathBuf,
    ) -> Result<PathBuf, FetchError> {
        let mut req = self.client.get(url);
        match credentials {
            Some(credentials) => {
                log::info!(
                    "Fetching bugreport from {} (authorization: {}, cookie: {})",
                    display_url(url),
                    describe(credentials.authorization.as_deref()),
                    describe(credentials.cookie.as_deref()),
                );
                req = with_credentials(req, credentials);
            }
            None => log::info!("Fetching bugreport from {}", display_url(url)),
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            log::warn!("Bugreport fetch failed: HTTP {status}");
            return Err(FetchError::FetchFailed {
                status: status.as_u16(),
            });
        }

        tokio::fs::create_dir_all(downloads_dir).await?;
        let part_path = part_path_for(&final_path);

        match stream_to_file(response, &part_path).await {
            Ok(bytes) => {
                tokio::fs::rename(&part_path, &final_path).await?;
                log::info!(
                    "Downloaded bugreport to {} ({bytes} bytes)",
                    final_path.display()
                );
                Ok(final_path)
            }
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&part_path).await {
                    log::debug!("Could not remove {}: {rm}", part_path.display());
                }
                Err(e)
            }
        }
    }
}

fn with_credentials(mut req: RequestBuilder, credentials: &FetchCredentials) -> RequestBuilder {
    if let Some(auth) = credentials.authorization.as_deref() {
        req = req.header(AUTHORIZATION, auth);
    }
    if let Some(cookie) = credentials.cookie.as_deref() {
        req = req.header(COOKIE, cookie);
    }
    req
}

fn describe(credential: Option<&str>) -> String {
    credential.map(redact).unwrap_or_else(|| "none".to_string())
}

/// `url` without its query or fragment. Signed URLs carry their token there.
pub fn display_url(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}

/// UTC timestamp with milliseconds and a `Z` suffix, as the service expects.
pub fn iso_z(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

fn report_list_url(
    base_url: &str,
    device_id: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Url, FetchError> {
    let invalid = || FetchError::SourceMissing(format!("Invalid bugreport API URL: {base_url}"));
    let mut url = Url::parse(base_url.trim_end_matches('/')).map_err(|_| invalid())?;
    url.path_segments_mut()
        .map_err(|_| invalid())?
        .pop_if_empty()
        .push("bugreports")
        .push(device_id);
    url.query_pairs_mut()
        .append_pair("from", &iso_z(from))
        .append_pair("to", &iso_z(to));
    Ok(url)
}

async fn read_json(response: reqwest::Response, what: &str) -> Result<Value, FetchError> {
    let status = response.status();
    if !status.is_success() {
        log::warn!("Bugreport service {what} failed: HTTP {status}");
        return Err(FetchError::FetchFailed {
            status: status.as_u16(),
        });
    }
    response.json().await.map_err(|e| {
        if e.is_decode() {
            FetchError::BadResponse(format!("{what} is not JSON: {}", e.without_url()))
        } else {
            e.into()
        }
    })
}

/// `metadata.ondemand` set to `true` or `"true"`.
fn is_on_demand(item: &Value) -> bool {
    match item.pointer("/metadata/ondemand") {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(flag)) => flag.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// A missing or unrecognised `metadata.ondemand` counts as periodic.
fn is_periodic(item: &Value) -> bool {
    match item.pointer("/metadata/ondemand") {
        Some(Value::Bool(flag)) => !*flag,
        Some(Value::String(flag)) => {
            !matches!(flag.trim().to_lowercase().as_str(), "true" | "1" | "yes")
        }
        _ => true,
    }
}

fn report_label(item: &Value) -> &'static str {
    if is_on_demand(item) {
        "on-demand"
    } else {
        "periodic"
    }
}

/// `metadata.time` (RFC 3339) wins over `ts` (epoch milliseconds).
fn report_time(item: &Value) -> Option<DateTime<Utc>> {
    if let Some(time) = item.pointer("/metadata/time").and_then(Value::as_str) {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(time) {
            return Some(parsed.with_timezone(&Utc));
        }
    }
    item.get("ts")
        .and_then(Value::as_i64)
        .and_then(DateTime::<Utc>::from_timestamp_millis)
}

/// Newest debug archive of `kind` among listed items. Items without a usable
/// timestamp are skipped.
pub fn newest_debug_archive_item(
    items: &[Value],
    kind: ReportKind,
) -> Option<(DateTime<Utc>, &Value)> {
    items
        .iter()
        .filter(|item| {
            item.pointer("/metadata/reporttag")
                .and_then(Value::as_str)
                .is_some_and(|tag| tag.eq_ignore_ascii_case(DEBUG_ARCHIVE_TAG))
        })
        .filter(|item| kind.accepts(item))
        .filter_map(|item| report_time(item).map(|at| (at, item)))
        .max_by_key(|(at, _)| *at)
}

async fn stream_to_file(response: reqwest::Response, path: &Path) -> Result<u64, FetchError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

fn part_path_for(final_path: &Path) -> PathBuf {
    let mut name = final_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    final_path.with_file_name(name)
}

/// File name for a downloaded archive: the URL's last segment when it looks like
/// an archive, otherwise a timestamped `debugarchive_*.zip`.
pub fn archive_file_name(url: &str) -> String {
    let last = display_url(url)
        .rsplit('/')
        .next()
        .unwrap_or("");
    let lower = last.to_lowercase();
    if lower.ends_with(".zip") || lower.ends_with(".7z") {
        let cleaned = sanitize_filename::sanitize(last);
        if !cleaned.is_empty() {
            return cleaned;
        }
    }
    format!(
        "{DEBUG_ARCHIVE_PREFIX}{}.zip",
        chrono::Utc::now().format("%Y%m%d_%H%M%S")
    )
}

fn resolve_local(path: &Path) -> Result<PathBuf, FetchError> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }
    if path.is_dir() {
        return newest_debug_archive(path)?.ok_or_else(|| {
            FetchError::SourceMissing(format!(
                "No {DEBUG_ARCHIVE_PREFIX}*.zip in {}",
                path.display()
            ))
        });
    }
    Err(FetchError::SourceMissing(path.display().to_string()))
}

/// Newest `debugarchive_*.zip` directly inside `dir`, by modification time.
pub fn newest_debug_archive(dir: &Path) -> Result<Option<PathBuf>, FetchError> {
    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_lowercase();
        if !path.is_file() || !name.starts_with(DEBUG_ARCHIVE_PREFIX) || !name.ends_with(".zip") {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        if newest.as_ref().is_none_or(|(t, _)| modified > *t) {
            newest = Some((modified, path));
        }
    }
    Ok(newest.map(|(_, p)| p))
}
