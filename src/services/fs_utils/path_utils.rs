use std::path::{Component, Path, PathBuf};

/// Validates that `entry_name` (a path stored inside an archive) stays _inside_ the
/// extraction root once joined onto it.
///
/// Archive names use `/` but Windows-made archives sometimes carry `\`, so both count as
/// separators. Absolute names, drive prefixes and any `..` that climbs above the root are unsafe.
pub fn is_entry_name_safe(entry_name: &str) -> bool {
    let normalized = entry_name.replace('\\', "/");
    if normalized.starts_with('/') || has_drive_prefix(&normalized) {
        return false;
    }

    let mut depth: i64 = 0;
    for part in normalized.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => depth += 1,
        }
    }
    true
}

fn has_drive_prefix(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Lexically resolves `.` and `..` in `path` without touching the filesystem.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Joins an archive entry name onto `root`, refusing names that would escape it.
pub fn resolve_entry_path(root: &Path, entry_name: &str) -> std::io::Result<PathBuf> {
    if !is_entry_name_safe(entry_name) {
        return Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            format!("Path traversal blocked: `{entry_name}` escapes the extraction root"),
        ));
    }
    let relative = entry_name.replace('\\', "/");
    Ok(normalize_lexically(&root.join(relative)))
}

/// Checks that `candidate` resolves inside `root` after following symlinks.
/// Both paths must exist.
pub fn is_within_root(root: &Path, candidate: &Path) -> std::io::Result<bool> {
    let root = root.canonicalize()?;
    let candidate = candidate.canonicalize()?;
    Ok(candidate.starts_with(root))
}
