//! Path helpers for layer discovery.

use crate::ConfigError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Resolve `cwd` to an absolute path, tolerating directories that do not exist yet.
pub(super) fn normalize_path(path: &Path) -> Result<PathBuf, ConfigError> {
    path.canonicalize().or_else(|err| match err.kind() {
        ErrorKind::NotFound => Ok(path.to_path_buf()),
        _ => Err(ConfigError::ReadFailed(err)),
    })
}

/// Identity of a layer file, so a project root that is also the cwd loads once.
pub(super) fn dedup_key(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Walk up from `cwd` to the first directory containing any of `markers`.
pub(super) fn find_project_root(cwd: &Path, markers: &[String]) -> Option<PathBuf> {
    let is_root = |dir: &Path| markers.iter().any(|marker| dir.join(marker).exists());
    cwd.ancestors().find(|dir| is_root(dir)).map(Path::to_path_buf)
}
