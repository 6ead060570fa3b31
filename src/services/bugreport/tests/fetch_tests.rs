use super::*;
use crate::test_utils::{init_logging, serve_once, CannedResponse, TestServer};
use crate::types::errors::FetchError;
use filetime::{set_file_mtime, FileTime};
use serde_json::json;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

fn fetcher() -> BugreportFetcher {
    BugreportFetcher::new(Duration::from_secs(10)).unwrap()
}

fn dir_is_empty(dir: &std::path::Path) -> bool {
    !dir.exists() || fs::read_dir(dir).unwrap().next().is_none()
}

#[test]
fn test_source_parse() {
    assert_eq!(
        BugreportSource::parse(" https://host/report.zip "),
        BugreportSource::Remote("https://host/report.zip".to_string())
    );
    assert_eq!(
        BugreportSource::parse("HTTP://host/x"),
        BugreportSource::Remote("HTTP://host/x".to_string())
    );
    assert_eq!(
        BugreportSource::parse("/tmp/debugarchive_1.zip"),
        BugreportSource::Local("/tmp/debugarchive_1.zip".into())
    );
}

#[test]
fn test_redact_hides_value() {
    let secret = "Bearer abc.def.ghi";
    let shown = redact(secret);
    assert_eq!(shown, "<redacted 18 bytes>");
    assert!(!shown.contains("abc"));

    let creds = FetchCredentials {
        authorization: Some(secret.to_string()),
        cookie: Some("session=xyz".to_string()),
    };
    let debug = format!("{creds:?}");
    assert!(!debug.contains("abc.def"));
    assert!(!debug.contains("xyz"));
}

#[test]
fn test_archive_file_name() {
    assert_eq!(
        archive_file_name("https://h/api/debugarchive_42.zip?token=1"),
        "debugarchive_42.zip"
    );
    let generated = archive_file_name("https://h/api/generate");
    assert!(generated.starts_with("debugarchive_"));
    assert!(generated.ends_with(".zip"));
}

#[tokio::test]
async fn test_local_file_passes_through() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("given.zip");
    fs::write(&archive, b"PK").unwrap();

    let fetched = fetcher()
        .fetch(
            &BugreportSource::Local(archive.clone()),
            &FetchCredentials::default(),
            &dir.path().join("downloads"),
        )
        .await
        .unwrap();
    assert_eq!(fetched.path, archive);
    assert!(!fetched.downloaded);

    // Caller-owned files survive the delete policy.
    fetched.dispose(RetentionPolicy::Delete);
    assert!(archive.exists());
}

#[tokio::test]
async fn test_local_dir_picks_newest_debug_archive() {
    let dir = TempDir::new().unwrap();
    let old = dir.path().join("debugarchive_old.zip");
    let new = dir.path().join("debugarchive_new.zip");
    let other = dir.path().join("unrelated.zip");
    for p in [&old, &new, &other] {
        fs::write(p, b"PK").unwrap();
    }
    set_file_mtime(&old, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();
    set_file_mtime(&new, FileTime::from_unix_time(1_700_000_000, 0)).unwrap();
    set_file_mtime(&other, FileTime::from_unix_time(1_800_000_000, 0)).unwrap();

    let fetched = fetcher()
        .fetch(
            &BugreportSource::Local(dir.path().to_path_buf()),
            &FetchCredentials::default(),
            &dir.path().join("downloads"),
        )
        .await
        .unwrap();
    assert_eq!(fetched.path, new);
}

#[tokio::test]
async fn test_local_missing_source() {
    let dir = TempDir::new().unwrap();
    let result = fetcher()
        .fetch(
            &BugreportSource::Local(dir.path().to_path_buf()),
            &FetchCredentials::default(),
            &dir.path().join("downloads"),
        )
        .await;
    assert!(matches!(result, Err(FetchError::SourceMissing(_))));

    let result = fetcher()
        .fetch(
            &BugreportSource::Local(dir.path().join("nope.zip")),
            &FetchCredentials::default(),
            &dir.path().join("downloads"),
        )
        .await;
    assert!(matches!(result, Err(FetchError::SourceMissing(_))));
}

#[tokio::test]
async fn test_remote_download_sends_headers_verbatim() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let downloads = dir.path().join("downloads");
    let body = b"PK\x05\x06 archive bytes".to_vec();
    let (base, server) = serve_once(200, body.clone(), None).await;

    let creds = FetchCredentials {
        authorization: Some("Basic dXNlcjpwYXNz".to_string()),
        cookie: Some("JSESSIONID=abc; other=1".to_string()),
    };
    let fetched = fetcher()
        .fetch(
            &BugreportSource::Remote(format!("{base}/files/debugarchive_7.zip")),
            &creds,
            &downloads,
        )
        .await
        .unwrap();

    assert!(fetched.downloaded);
    assert_eq!(fetched.path, downloads.join("debugarchive_7.zip"));
    assert_eq!(fs::read(&fetched.path).unwrap(), body);
    assert!(!downloads.join("debugarchive_7.zip.part").exists());

    let request = server.await.unwrap().to_lowercase();
    assert!(request.contains("authorization: basic dxnlcjpwyxnz"));
    assert!(request.contains("cookie: jsessionid=abc; other=1"));

    fetched.dispose(RetentionPolicy::Delete);
    assert!(!fetched.path.exists());
}

#[tokio::test]
async fn test_http_401_leaves_no_file() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let downloads = dir.path().join("downloads");
    let (base, _server) = serve_once(401, b"denied".to_vec(), None).await;

    let result = fetcher()
        .fetch(
            &BugreportSource::Remote(format!("{base}/debugarchive_1.zip")),
            &FetchCredentials::default(),
            &downloads,
        )
        .await;
    assert!(matches!(result, Err(FetchError::FetchFailed { status: 401 })));
    assert!(dir_is_empty(&downloads));
}

#[tokio::test]
async fn test_truncated_body_removes_part_file() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let downloads = dir.path().join("downloads");
    let (base, _server) = serve_once(200, b"short".to_vec(), Some(4096)).await;

    let result = fetcher()
        .fetch(
            &BugreportSource::Remote(format!("{base}/debugarchive_2.zip")),
            &FetchCredentials::default(),
            &downloads,
        )
        .await;
    assert!(matches!(result, Err(FetchError::Transport(_))));
    assert!(dir_is_empty(&downloads));
}

#[test]
fn test_display_url_hides_signature() {
    assert_eq!(
        display_url("https://bucket.s3/a/debugarchive.zip?X-Amz-Signature=deadbeef&X-Amz-Credential=k"),
        "https://bucket.s3/a/debugarchive.zip"
    );
    assert_eq!(display_url("https://h/x.zip#frag"), "https://h/x.zip");
    assert_eq!(display_url("https://h/plain.zip"), "https://h/plain.zip");
}

#[test]
fn test_iso_z_has_millis_and_zulu() {
    let at = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(1_700_000_000_123).unwrap();
    assert_eq!(iso_z(at), "2023-11-14T22:13:20.123Z");
}

#[test]
fn test_report_kind_parse() {
    assert_eq!(ReportKind::parse("on-demand"), Some(ReportKind::OnDemand));
    assert_eq!(ReportKind::parse("ON_DEMAND"), Some(ReportKind::OnDemand));
    assert_eq!(ReportKind::parse(" periodic "), Some(ReportKind::Periodic));
    assert_eq!(ReportKind::parse("any"), Some(ReportKind::Any));
    assert_eq!(ReportKind::parse("weekly"), None);
}

fn report_items() -> Vec<serde_json::Value> {
    vec![
        json!({"path": "r/old-od.zip", "metadata": {"reporttag": "DebugArchive", "ondemand": true, "time": "2026-10-18T08:00:00.000Z"}}),
        json!({"path": "r/new-od.zip", "metadata": {"reporttag": "debugarchive", "ondemand": "true"}, "ts": 1_792_317_600_000i64}),
        json!({"path": "r/periodic.zip", "metadata": {"reporttag": "debugarchive", "time": "2026-10-18T09:30:00.000Z"}}),
        json!({"path": "r/other.zip", "metadata": {"reporttag": "screenshot", "ondemand": true, "time": "2030-01-01T00:00:00.000Z"}}),
        json!({"path": "r/undated.zip", "metadata": {"reporttag": "debugarchive", "ondemand": true}}),
    ]
}

#[test]
fn test_newest_debug_archive_item_by_kind() {
    let items = report_items();

    let (_, item) = newest_debug_archive_item(&items, ReportKind::OnDemand).unwrap();
    assert_eq!(item["path"], "r/new-od.zip");

    let (at, item) = newest_debug_archive_item(&items, ReportKind::Periodic).unwrap();
    assert_eq!(item["path"], "r/periodic.zip");
    assert_eq!(iso_z(at), "2026-10-18T09:30:00.000Z");

    // Other report tags never win, however new.
    let (_, item) = newest_debug_archive_item(&items, ReportKind::Any).unwrap();
    assert_eq!(item["path"], "r/new-od.zip");

    assert!(newest_debug_archive_item(&items[3..], ReportKind::Any).is_none());
}

fn api_query(base_url: String, kind: ReportKind) -> BugreportSource {
    BugreportSource::Api(ApiQuery {
        base_url,
        device_id: "DEV123".to_string(),
        kind,
        window_minutes: 30,
    })
}

#[tokio::test]
async fn test_api_lists_presigns_and_downloads() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let downloads = dir.path().join("downloads");
    let server = TestServer::bind().await;
    let base = format!("{}/api", server.url);
    let signed = format!("{}/bucket/a.zip?X-Amz-Signature=secret", server.url);
    let archive = b"PK\x05\x06 service archive".to_vec();
    let list = serde_json::to_vec(&report_items()).unwrap();
    let presigned = serde_json::to_vec(&json!({ "signedUrl": signed })).unwrap();
    let requests = server.serve(vec![
        CannedResponse::new(200, list),
        CannedResponse::new(200, presigned),
        CannedResponse::new(200, archive.clone()),
    ]);

    let creds = FetchCredentials {
        authorization: Some("eyJraw.jwt".to_string()),
        cookie: Some("session=s1".to_string()),
    };
    let fetched = fetcher()
        .fetch(&api_query(base, ReportKind::Periodic), &creds, &downloads)
        .await
        .unwrap();

    assert!(fetched.downloaded);
    assert_eq!(fs::read(&fetched.path).unwrap(), archive);
    let name = fetched.path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("debugarchive_periodic_20261018T093000000Z"), "{name}");
    assert!(!downloads.join(format!("{name}.part")).exists());

    let requests: Vec<String> = requests
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.to_lowercase())
        .collect();
    assert_eq!(requests.len(), 3);
    assert!(requests[0].starts_with("get /api/bugreports/dev123?from="));
    assert!(requests[0].contains("&to="));
    assert!(requests[0].contains("authorization: eyjraw.jwt"));
    assert!(requests[0].contains("cookie: session=s1"));

    assert!(requests[1].starts_with("post /api/bugreports/get-download-url"));
    assert!(requests[1].contains("authorization: eyjraw.jwt"));
    assert!(requests[1].ends_with(r#"{"path":"r/periodic.zip"}"#));

    // The signed URL authorizes itself; session credentials stay with the service.
    assert!(requests[2].starts_with("get /bucket/a.zip?x-amz-signature=secret"));
    assert!(!requests[2].contains("authorization:"));
    assert!(!requests[2].contains("cookie:"));
}

#[tokio::test]
async fn test_api_without_matching_report_is_source_missing() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let downloads = dir.path().join("downloads");
    let server = TestServer::bind().await;
    let base = server.url.clone();
    let list = serde_json::to_vec(&report_items()[2..4]).unwrap();
    let requests = server.serve(vec![CannedResponse::new(200, list)]);

    let result = fetcher()
        .fetch(
            &api_query(base, ReportKind::OnDemand),
            &FetchCredentials::default(),
            &downloads,
        )
        .await;

    assert!(matches!(result, Err(FetchError::SourceMissing(_))), "{result:?}");
    assert_eq!(requests.await.unwrap().len(), 1);
    assert!(dir_is_empty(&downloads));
}

#[tokio::test]
async fn test_api_rejected_listing_is_fetch_failure() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let downloads = dir.path().join("downloads");
    let server = TestServer::bind().await;
    let base = server.url.clone();
    let _requests = server.serve(vec![CannedResponse::new(403, b"expired".to_vec())]);

    let result = fetcher()
        .fetch(
            &api_query(base, ReportKind::Any),
            &FetchCredentials::default(),
            &downloads,
        )
        .await;

    assert!(matches!(result, Err(FetchError::FetchFailed { status: 403 })));
    assert!(dir_is_empty(&downloads));
}

#[tokio::test]
async fn test_api_presign_without_url_is_bad_response() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let downloads = dir.path().join("downloads");
    let server = TestServer::bind().await;
    let base = server.url.clone();
    let list = serde_json::to_vec(&report_items()).unwrap();
    let _requests = server.serve(vec![
        CannedResponse::new(200, list),
        CannedResponse::new(200, b"{\"expires\": 60}".to_vec()),
    ]);

    let result = fetcher()
        .fetch(
            &api_query(base, ReportKind::Any),
            &FetchCredentials::default(),
            &downloads,
        )
        .await;

    assert!(matches!(result, Err(FetchError::BadResponse(_))), "{result:?}");
    assert!(dir_is_empty(&downloads));
}

#[tokio::test]
async fn test_transport_error_omits_signed_query() {
    let dir = TempDir::new().unwrap();
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let url = format!("http://127.0.0.1:{port}/a.zip?X-Amz-Signature=topsecret");

    let err = fetcher()
        .fetch(
            &BugreportSource::Remote(url),
            &FetchCredentials::default(),
            &dir.path().join("downloads"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Transport(_)), "{err:?}");
    assert!(!err.to_string().contains("topsecret"));
}
