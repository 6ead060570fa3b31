//! `DeviceShell` over the `adb` executable.

use super::shell::DeviceShell;
use crate::types::errors::ShellError;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct AdbShell {
    adb: PathBuf,
    timeout: Duration,
}

impl AdbShell {
    pub fn new(adb: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            adb: adb.into(),
            timeout,
        }
    }

    /// Run `adb <args>` and return stdout and stderr together.
    ///
    /// The child is killed if the timeout expires or the future is dropped.
    async fn run(&self, args: &[&str]) -> Result<String, ShellError> {
        let command = format!("adb {}", args.join(" "));
        log::debug!("Running {command}");

        let child = Command::new(&self.adb)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ShellError::Spawn {
                program: self.adb.display().to_string(),
                message: e.to_string(),
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ShellError::Timeout {
                command: command.clone(),
                seconds: self.timeout.as_secs(),
            })?
            .map_err(|e| ShellError::Spawn {
                program: self.adb.display().to_string(),
                message: e.to_string(),
            })?;

        let mut text = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }

        if !output.status.success() {
            return Err(ShellError::NonZeroExit {
                command,
                code: output.status.code(),
                output: text.trim().to_string(),
            });
        }
        Ok(text)
    }
}

impl Default for AdbShell {
    fn default() -> Self {
        Self::new("adb", Duration::from_secs(30))
    }
}

impl DeviceShell for AdbShell {
    async fn list_devices(&self) -> Result<String, ShellError> {
        self.run(&["devices", "-l"]).await
    }

    async fn connect(&self, addr: &str) -> Result<String, ShellError> {
        self.run(&["connect", addr]).await
    }

    async fn disconnect(&self, addr: &str) -> Result<String, ShellError> {
        self.run(&["disconnect", addr]).await
    }

    async fn focus_dump(&self, serial: &str) -> Result<String, ShellError> {
        self.run(&["-s", serial, "shell", "dumpsys", "window"]).await
    }

    async fn getprop(&self, serial: &str) -> Result<String, ShellError> {
        self.run(&["-s", serial, "shell", "getprop"]).await
    }
}
