use crate::types::errors::ShellError;
use std::future::Future;

/// Read-only device queries plus the connect/disconnect pair a network target needs.
///
/// Every method returns the raw text the transport printed; parsing lives with the
/// callers so fake shells only have to replay captured output.
pub trait DeviceShell: Send + Sync {
    /// Enumerate visible devices (`adb devices -l` format).
    fn list_devices(&self) -> impl Future<Output = Result<String, ShellError>> + Send;

    fn connect(&self, addr: &str) -> impl Future<Output = Result<String, ShellError>> + Send;

    fn disconnect(&self, addr: &str) -> impl Future<Output = Result<String, ShellError>> + Send;

    /// Window manager dump containing the current focus field.
    fn focus_dump(&self, serial: &str)
        -> impl Future<Output = Result<String, ShellError>> + Send;

    fn getprop(&self, serial: &str) -> impl Future<Output = Result<String, ShellError>> + Send;
}

/// A device line from `adb devices -l`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedDevice {
    pub serial: String,
    pub state: String,
}

impl ListedDevice {
    /// Only `device` is usable; `offline` and `unauthorized` are not.
    pub fn is_live(&self) -> bool {
        self.state == "device"
    }
}

/// Parse `adb devices -l` output, skipping the header and blank lines.
pub fn parse_device_list(output: &str) -> Vec<ListedDevice> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with("List of devices"))
        .filter(|line| !line.starts_with('*')) // daemon start-up chatter
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let serial = parts.next()?;
            let state = parts.next()?;
            Some(ListedDevice {
                serial: serial.to_string(),
                state: state.to_string(),
            })
        })
        .collect()
}

/// Serials of devices that are ready for commands.
pub fn live_serials(output: &str) -> Vec<String> {
    parse_device_list(output)
        .into_iter()
        .filter(ListedDevice::is_live)
        .map(|d| d.serial)
        .collect()
}

/// `adb connect` exits 0 even when it fails, so the text decides.
pub fn connect_succeeded(output: &str) -> bool {
    let lower = output.to_lowercase();
    if lower.contains("failed") || lower.contains("cannot") || lower.contains("unable") {
        return false;
    }
    lower.contains("connected to")
}
