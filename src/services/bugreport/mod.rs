//! Bugreport fetch (local, HTTP or service API) and fixture discovery in unpacked archives.

mod fetch;
mod fixtures;

pub use fetch::{
    archive_file_name, display_url, iso_z, newest_debug_archive, newest_debug_archive_item,
    redact, ApiQuery, BugreportFetcher, BugreportSource, FetchCredentials, FetchedArchive,
    ReportKind, RetentionPolicy,
};
pub use fixtures::{locate_fixtures, BugreportFixtures};

#[cfg(test)]
#[path = "tests/fetch_tests.rs"]
mod fetch_tests;

#[cfg(test)]
#[path = "tests/fixtures_tests.rs"]
mod fixtures_tests;
