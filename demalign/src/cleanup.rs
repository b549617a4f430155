//! Artifact cleanup: remove the original input after a successful run.

use std::fs;
use std::path::Path;

use tracing::{info, warn};

/// Delete the input raster at `path`.
///
/// Best-effort: a failure is logged and returned as a warning message, never
/// as an error, since the resampled output already exists by the time this
/// runs. Returns `None` when the file was removed.
pub fn remove_input<P: AsRef<Path>>(path: P) -> Option<String> {
    let path = path.as_ref();
    match fs::remove_file(path) {
        Ok(()) => {
            info!(path = %path.display(), "removed input raster");
            None
        }
        Err(e) => {
            let message = format!("could not remove input {}: {}", path.display(), e);
            warn!("{}", message);
            Some(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_remove_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("input.tif");
        fs::write(&path, b"data").unwrap();

        assert!(remove_input(&path).is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_already_removed_is_a_warning() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone.tif");

        let warning = remove_input(&path).unwrap();
        assert!(warning.contains("gone.tif"));
    }

    #[test]
    fn test_directory_is_not_removed() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("input.tif");
        fs::create_dir(&sub).unwrap();

        assert!(remove_input(&sub).is_some());
        assert!(sub.exists());
    }
}
