//! Discovery and management of the `.harvest/` directory.
//!
//! The `.harvest/` directory holds `config.yaml` and, by default, the SQLite
//! database. It is found by walking up from the working directory.

use crate::config::ConfigError;
use std::path::{Path, PathBuf};

/// The name of the harvest metadata directory.
pub const HARVEST_DIR_NAME: &str = ".harvest";

/// The name of the environment variable that can override the directory.
pub const HARVEST_DIR_ENV: &str = "HARVEST_DIR";

/// Walk up the directory tree from `start` looking for a `.harvest/` directory.
///
/// The `HARVEST_DIR` environment variable is checked first and wins when it
/// names an existing directory.
///
/// # Examples
///
/// ```no_run
/// use harvest_config::harvest_dir::find_harvest_dir;
/// use std::path::Path;
///
/// if let Some(dir) = find_harvest_dir(Path::new(".")) {
///     println!("Found harvest dir at {}", dir.display());
/// }
/// ```
pub fn find_harvest_dir(start: &Path) -> Option<PathBuf> {
    if let Ok(env_dir) = std::env::var(HARVEST_DIR_ENV) {
        let env_path = PathBuf::from(&env_dir);
        if env_path.is_dir() {
            return Some(env_path);
        }
    }
    walk_up(start)
}

fn walk_up(start: &Path) -> Option<PathBuf> {
    let start = start.canonicalize().ok()?;

    let mut current = start.as_path();
    loop {
        let candidate = current.join(HARVEST_DIR_NAME);
        if candidate.is_dir() {
            return Some(candidate);
        }

        match current.parent() {
            Some(parent) if parent != current => {
                current = parent;
            }
            _ => break,
        }
    }

    None
}

/// Like [`find_harvest_dir`], but returns
/// [`ConfigError::HarvestDirNotFound`] when nothing is found.
pub fn find_harvest_dir_or_error(start: &Path) -> Result<PathBuf, ConfigError> {
    find_harvest_dir(start).ok_or(ConfigError::HarvestDirNotFound)
}

/// Ensure a `.harvest/` directory exists at the given path.
///
/// If `path` itself is not called `.harvest`, a `.harvest/` subdirectory is
/// created under it. Returns the path to the `.harvest/` directory.
pub fn ensure_harvest_dir(path: &Path) -> Result<PathBuf, ConfigError> {
    let harvest_dir = if path.ends_with(HARVEST_DIR_NAME) {
        path.to_path_buf()
    } else {
        path.join(HARVEST_DIR_NAME)
    };

    std::fs::create_dir_all(&harvest_dir)?;
    Ok(harvest_dir)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_dir_in_start() {
        let dir = tempfile::tempdir().unwrap();
        let harvest = dir.path().join(".harvest");
        std::fs::create_dir(&harvest).unwrap();

        let found = walk_up(dir.path()).unwrap().canonicalize().unwrap();
        assert_eq!(found, harvest.canonicalize().unwrap());
    }

    #[test]
    fn finds_dir_from_child() {
        let dir = tempfile::tempdir().unwrap();
        let harvest = dir.path().join(".harvest");
        std::fs::create_dir(&harvest).unwrap();

        let child = dir.path().join("reports").join("q3");
        std::fs::create_dir_all(&child).unwrap();

        let found = walk_up(&child).unwrap().canonicalize().unwrap();
        assert_eq!(found, harvest.canonicalize().unwrap());
    }

    #[test]
    fn missing_start_is_none() {
        assert!(walk_up(Path::new("/nonexistent/harvest/start")).is_none());
    }

    #[test]
    fn ensure_creates_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let first = ensure_harvest_dir(dir.path()).unwrap();
        assert!(first.is_dir());
        assert!(first.ends_with(".harvest"));
        assert_eq!(ensure_harvest_dir(dir.path()).unwrap(), first);
        assert_eq!(ensure_harvest_dir(&first).unwrap(), first);
    }
}
