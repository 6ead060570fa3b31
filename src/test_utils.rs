use crate::services::device::DeviceShell;
use crate::types::errors::ShellError;
use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Once};

static INIT: Once = Once::new();

pub fn init_logging() {
    INIT.call_once(|| {
        // Initialize logger only once
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Scripted `DeviceShell` replaying canned output. Clones share state.
#[derive(Clone, Default)]
pub struct FakeShell {
    state: Arc<Mutex<FakeState>>,
}

#[derive(Default)]
struct FakeState {
    connect_replies: VecDeque<Result<String, String>>,
    devices: String,
    focus: Option<Result<String, String>>,
    getprop: String,
    calls: Vec<String>,
}

impl FakeShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one reply per `connect` call. Once drained, connect keeps failing.
    pub fn connect_replies(self, replies: Vec<Result<&str, &str>>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.connect_replies = replies
                .into_iter()
                .map(|r| r.map(str::to_string).map_err(str::to_string))
                .collect();
        }
        self
    }

    pub fn devices(self, listing: &str) -> Self {
        self.state.lock().unwrap().devices = listing.to_string();
        self
    }

    pub fn focus(self, dump: &str) -> Self {
        self.state.lock().unwrap().focus = Some(Ok(dump.to_string()));
        self
    }

    pub fn focus_error(self, message: &str) -> Self {
        self.state.lock().unwrap().focus = Some(Err(message.to_string()));
        self
    }

    pub fn getprop(self, output: &str) -> Self {
        self.state.lock().unwrap().getprop = output.to_string();
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

fn shell_err(command: &str, output: String) -> ShellError {
    ShellError::NonZeroExit {
        command: command.to_string(),
        code: Some(1),
        output,
    }
}

impl DeviceShell for FakeShell {
    async fn list_devices(&self) -> Result<String, ShellError> {
        self.record("devices".to_string());
        Ok(self.state.lock().unwrap().devices.clone())
    }

    async fn connect(&self, addr: &str) -> Result<String, ShellError> {
        self.record(format!("connect {addr}"));
        let reply = self.state.lock().unwrap().connect_replies.pop_front();
        match reply {
            Some(Ok(out)) => Ok(out),
            Some(Err(out)) => Err(shell_err("adb connect", out)),
            None => Ok(format!("failed to connect to {addr}")),
        }
    }

    async fn disconnect(&self, addr: &str) -> Result<String, ShellError> {
        self.record(format!("disconnect {addr}"));
        Ok(format!("disconnected {addr}"))
    }

    async fn focus_dump(&self, serial: &str) -> Result<String, ShellError> {
        self.record(format!("focus {serial}"));
        let focus = self.state.lock().unwrap().focus.clone();
        match focus {
            Some(Ok(dump)) => Ok(dump),
            Some(Err(out)) => Err(shell_err("adb shell dumpsys window", out)),
            None => Ok(String::new()),
        }
    }

    async fn getprop(&self, serial: &str) -> Result<String, ShellError> {
        self.record(format!("getprop {serial}"));
        Ok(self.state.lock().unwrap().getprop.clone())
    }
}

/// One canned HTTP reply. `declared_len` overrides Content-Length so a truncated
/// body can be simulated.
pub struct CannedResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub declared_len: Option<usize>,
}

impl CannedResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
            declared_len: None,
        }
    }
}

/// Local HTTP server answering one request per connection from a queue.
pub struct TestServer {
    listener: tokio::net::TcpListener,
    pub url: String,
}

impl TestServer {
    pub async fn bind() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        Self { listener, url }
    }

    /// Answer `responses` in order, then stop. The handle yields each request
    /// received, head and body, as text.
    pub fn serve(self, responses: Vec<CannedResponse>) -> tokio::task::JoinHandle<Vec<String>> {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        tokio::spawn(async move {
            let mut requests = Vec::with_capacity(responses.len());
            for reply in responses {
                let (mut socket, _) = self.listener.accept().await.unwrap();
                let mut raw = Vec::new();
                let mut buf = [0u8; 1024];
                let head_end = loop {
                    if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                        break pos + 4;
                    }
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break raw.len();
                    }
                    raw.extend_from_slice(&buf[..n]);
                };
                let body_len = String::from_utf8_lossy(&raw[..head_end])
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                while raw.len() < head_end + body_len {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    raw.extend_from_slice(&buf[..n]);
                }

                let head = format!(
                    "HTTP/1.1 {} Status\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    reply.status,
                    reply.declared_len.unwrap_or(reply.body.len())
                );
                socket.write_all(head.as_bytes()).await.unwrap();
                socket.write_all(&reply.body).await.unwrap();
                socket.shutdown().await.ok();
                requests.push(String::from_utf8_lossy(&raw).to_string());
            }
            requests
        })
    }
}

/// Answer exactly one HTTP request with `status` and `body`, then close.
///
/// The handle yields the raw request the server received.
pub async fn serve_once(
    status: u16,
    body: Vec<u8>,
    declared_len: Option<usize>,
) -> (String, tokio::task::JoinHandle<String>) {
    let server = TestServer::bind().await;
    let url = server.url.clone();
    let requests = server.serve(vec![CannedResponse {
        status,
        body,
        declared_len,
    }]);
    let handle = tokio::spawn(async move {
        requests
            .await
            .unwrap()
            .into_iter()
            .next()
            .unwrap_or_default()
    });
    (url, handle)
}

/// Helper: create a minimal valid ZIP.
pub fn create_test_zip(dir: &Path, name: &str, files: &[(&str, &[u8])]) -> PathBuf {
    let zip_path = dir.join(name);
    let file = std::fs::File::create(&zip_path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options =
        zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

    for (entry_name, content) in files {
        writer.start_file(entry_name.to_string(), options).unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap();
    zip_path
}
