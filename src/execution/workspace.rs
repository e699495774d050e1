//! Isolated per-run workspace.
//!
//! Each run gets a fresh temporary directory holding its source file and the
//! toolchain's cache directories. The directory is removed when the
//! [`Workspace`] is closed or dropped, whatever way the run ended.

// ============================================================================
// Imports
// ============================================================================

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::{Error, Result};

// ============================================================================
// Workspace
// ============================================================================

/// A temporary directory owned by one run.
#[derive(Debug)]
pub struct Workspace {
    /// Temporary directory handle (removes the directory on drop).
    dir: TempDir,
}

impl Workspace {
    /// Creates a new workspace in the system temp directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Workspace`] if the directory cannot be created.
    pub fn create(prefix: &str) -> Result<Self> {
        let dir = TempDir::with_prefix(prefix).map_err(Error::workspace)?;
        debug!(path = %dir.path().display(), "Created workspace");
        Ok(Self { dir })
    }

    /// Returns the workspace root.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Writes the submitted source as `name` and returns its path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SourceWrite`] if the file cannot be written.
    pub fn write_source(&self, name: &str, source: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        fs::write(&path, source).map_err(Error::source_write)?;
        debug!(path = %path.display(), bytes = source.len(), "Wrote source file");
        Ok(path)
    }

    /// Resolves `(variable, subdirectory)` pairs to absolute paths inside the
    /// workspace.
    #[must_use]
    pub fn env_dirs(&self, dirs: &[(String, String)]) -> Vec<(String, PathBuf)> {
        dirs.iter()
            .map(|(var, subdir)| (var.clone(), self.dir.path().join(subdir)))
            .collect()
    }

    /// Removes the workspace now, logging any failure.
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!(path = %path.display(), "Removed workspace"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove workspace"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_close_removes_directory() {
        let workspace = Workspace::create("playground-test-").expect("create should succeed");
        let path = workspace.path().to_path_buf();
        assert!(path.is_dir());
        assert!(
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("playground-test-"))
        );

        workspace.close();
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_removes_directory() {
        let workspace = Workspace::create("playground-test-").unwrap();
        let path = workspace.path().to_path_buf();
        drop(workspace);
        assert!(!path.exists());
    }

    #[test]
    fn test_write_source() {
        let workspace = Workspace::create("playground-test-").unwrap();
        let path = workspace
            .write_source("main.go", "package main\n")
            .expect("write should succeed");

        assert_eq!(path.parent(), Some(workspace.path()));
        assert_eq!(fs::read_to_string(&path).unwrap(), "package main\n");
    }

    #[test]
    fn test_write_source_failure_is_source_write_error() {
        let workspace = Workspace::create("playground-test-").unwrap();
        let err = workspace
            .write_source("missing-dir/main.go", "x")
            .unwrap_err();
        assert!(matches!(err, Error::SourceWrite { .. }));
        assert!(err.to_string().starts_with("Failed to write temporary file"));
    }

    #[test]
    fn test_env_dirs_are_inside_workspace() {
        let workspace = Workspace::create("playground-test-").unwrap();
        let dirs = workspace.env_dirs(&[("GOCACHE".to_string(), "go-cache".to_string())]);
        assert_eq!(dirs[0].0, "GOCACHE");
        assert!(dirs[0].1.starts_with(workspace.path()));
        assert!(dirs[0].1.ends_with("go-cache"));
    }
}
