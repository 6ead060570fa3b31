//! Device resolution and suite selection.
//!
//! A raw selector is normalized, connected when it names a network target and
//! confirmed in the live device list. The focused window then picks the suite.

mod adb;
mod focus;
mod resolver;
mod selector;
mod shell;

pub use adb::AdbShell;
pub use focus::{classify_token, extract_focus_token, SuiteTarget};
pub use resolver::{parse_device_info, ConnectedDevice, DeviceInfo, DeviceResolver, ResolverConfig};
pub use selector::{
    clean_selector_value, normalize_selector, DeviceSource, NormalizedSelector, DEFAULT_ADB_PORT,
};
pub use shell::{connect_succeeded, live_serials, parse_device_list, DeviceShell, ListedDevice};

#[cfg(test)]
#[path = "tests/selector_tests.rs"]
mod selector_tests;

#[cfg(test)]
#[path = "tests/focus_tests.rs"]
mod focus_tests;

#[cfg(test)]
#[path = "tests/resolver_tests.rs"]
mod resolver_tests;
