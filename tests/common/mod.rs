#![allow(dead_code)]

use dut_runner_lib::services::device::DeviceShell;
use dut_runner_lib::types::errors::ShellError;
use std::collections::HashMap;
use std::fs;
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

/// Device shell answering per serial. Every network connect succeeds and the
/// device then shows up in the listing.
#[derive(Clone, Default)]
pub struct BenchShell {
    focus_by_serial: Arc<HashMap<String, String>>,
    connected: Arc<Mutex<Vec<String>>>,
}

impl BenchShell {
    pub fn new(focus: &[(&str, &str)]) -> Self {
        Self {
            focus_by_serial: Arc::new(
                focus
                    .iter()
                    .map(|(s, f)| (s.to_string(), f.to_string()))
                    .collect(),
            ),
            connected: Arc::default(),
        }
    }
}

impl DeviceShell for BenchShell {
    async fn list_devices(&self) -> Result<String, ShellError> {
        let mut out = String::from("List of devices attached\n");
        for serial in self.connected.lock().unwrap().iter() {
            out.push_str(&format!("{serial}\tdevice\n"));
        }
        Ok(out)
    }

    async fn connect(&self, addr: &str) -> Result<String, ShellError> {
        self.connected.lock().unwrap().push(addr.to_string());
        Ok(format!("connected to {addr}"))
    }

    async fn disconnect(&self, addr: &str) -> Result<String, ShellError> {
        Ok(format!("disconnected {addr}"))
    }

    async fn focus_dump(&self, serial: &str) -> Result<String, ShellError> {
        let app = self
            .focus_by_serial
            .get(serial)
            .cloned()
            .unwrap_or_default();
        Ok(format!("  mCurrentFocus=Window{{1a u0 {app}}}\n"))
    }

    async fn getprop(&self, serial: &str) -> Result<String, ShellError> {
        Ok(format!("[ro.serialno]: [{serial}]\n"))
    }
}

pub fn create_zip(path: &Path, files: &[(&str, &[u8])]) -> PathBuf {
    let file = fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options =
        zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, content) in files {
        writer.start_file(name.to_string(), options).unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap();
    path.to_path_buf()
}

/// Every regular file below `root`.
pub fn files_under(root: &Path) -> Vec<PathBuf> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect()
}
