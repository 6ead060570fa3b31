use serde::Serialize;
use std::path::{Path, PathBuf};

/// Well-known files inside an unpacked bugreport, reported by path only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BugreportFixtures {
    /// `cameraserver*.txt`
    pub camera_server: Vec<PathBuf>,
    /// `bugreport-*.txt`
    pub bugreports: Vec<PathBuf>,
    /// `*.log` partner logs
    pub partner_logs: Vec<PathBuf>,
    /// Any file whose name mentions `edid`
    pub edid: Vec<PathBuf>,
}

impl BugreportFixtures {
    pub fn is_empty(&self) -> bool {
        self.camera_server.is_empty()
            && self.bugreports.is_empty()
            && self.partner_logs.is_empty()
            && self.edid.is_empty()
    }
}

/// Walk `root` and collect fixture paths, sorted for stable manifests.
/// A file may land in more than one bucket.
pub fn locate_fixtures(root: &Path) -> BugreportFixtures {
    let mut found = BugreportFixtures::default();

    for entry in walkdir::WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let name = entry.file_name().to_string_lossy().to_lowercase();
        let path = entry.path();

        if name.starts_with("cameraserver") && name.ends_with(".txt") {
            found.camera_server.push(path.to_path_buf());
        }
        if name.starts_with("bugreport-") && name.ends_with(".txt") {
            found.bugreports.push(path.to_path_buf());
        }
        if name.ends_with(".log") {
            found.partner_logs.push(path.to_path_buf());
        }
        if name.contains("edid") {
            found.edid.push(path.to_path_buf());
        }
    }

    for bucket in [
        &mut found.camera_server,
        &mut found.bugreports,
        &mut found.partner_logs,
        &mut found.edid,
    ] {
        bucket.sort();
    }

    log::debug!(
        "Fixtures under {}: {} camera, {} bugreport, {} log, {} edid",
        root.display(),
        found.camera_server.len(),
        found.bugreports.len(),
        found.partner_logs.len(),
        found.edid.len()
    );
    found
}
