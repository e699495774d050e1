//! Run configuration.
//!
//! Controls which toolchain is launched, how the workspace is laid out, and
//! the limits applied to every run.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use playground_server::RunOptions;
//!
//! let options = RunOptions::new()
//!     .with_program("go")
//!     .with_timeout(Duration::from_secs(30))
//!     .with_flush_threshold(512);
//!
//! options.validate()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Wall-clock budget for one run (2 minutes).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Output buffer size that forces a flush without a line break.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 1024;

/// How long to wait for output to close after a forced kill.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(5);

/// Temp directory name prefix.
pub const DEFAULT_WORKSPACE_PREFIX: &str = "playground-";

// ============================================================================
// RunOptions
// ============================================================================

/// Configuration shared by every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Toolchain executable.
    pub program: PathBuf,

    /// Arguments placed before the source file path.
    pub args: Vec<String>,

    /// Name of the single source file inside the workspace.
    pub source_file: String,

    /// Environment variables pointed at subdirectories of the workspace,
    /// as `(variable, subdirectory)` pairs.
    pub env_dirs: Vec<(String, String)>,

    /// Wall-clock budget per run.
    pub timeout: Duration,

    /// Buffered output size that triggers a flush.
    pub flush_threshold: usize,

    /// Grace period for output to close after a kill.
    pub kill_grace: Duration,

    /// Prefix for workspace directory names.
    pub workspace_prefix: String,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl RunOptions {
    /// Creates options for `go run main.go` with isolated Go caches.
    #[must_use]
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("go"),
            args: vec!["run".to_string()],
            source_file: "main.go".to_string(),
            env_dirs: vec![
                ("GOCACHE".to_string(), "go-cache".to_string()),
                ("GOPATH".to_string(), "go-path".to_string()),
            ],
            timeout: DEFAULT_TIMEOUT,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            kill_grace: DEFAULT_KILL_GRACE,
            workspace_prefix: DEFAULT_WORKSPACE_PREFIX.to_string(),
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl RunOptions {
    /// Sets the toolchain executable.
    #[inline]
    #[must_use]
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Replaces the arguments placed before the source path.
    #[inline]
    #[must_use]
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the source file name.
    #[inline]
    #[must_use]
    pub fn with_source_file(mut self, name: impl Into<String>) -> Self {
        self.source_file = name.into();
        self
    }

    /// Adds an environment variable pointing into the workspace.
    #[inline]
    #[must_use]
    pub fn with_env_dir(mut self, var: impl Into<String>, subdir: impl Into<String>) -> Self {
        self.env_dirs.push((var.into(), subdir.into()));
        self
    }

    /// Removes all workspace environment variables.
    #[inline]
    #[must_use]
    pub fn without_env_dirs(mut self) -> Self {
        self.env_dirs.clear();
        self
    }

    /// Sets the wall-clock budget per run.
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the flush threshold in bytes.
    #[inline]
    #[must_use]
    pub fn with_flush_threshold(mut self, threshold: usize) -> Self {
        self.flush_threshold = threshold;
        self
    }

    /// Sets the post-kill grace period.
    #[inline]
    #[must_use]
    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    /// Sets the workspace directory prefix.
    #[inline]
    #[must_use]
    pub fn with_workspace_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.workspace_prefix = prefix.into();
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl RunOptions {
    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a limit is zero or a workspace-relative
    /// name would escape the workspace.
    pub fn validate(&self) -> Result<()> {
        if self.program.as_os_str().is_empty() {
            return Err(Error::config("Toolchain program must not be empty"));
        }

        if self.timeout.is_zero() {
            return Err(Error::config("Run timeout must be greater than zero"));
        }

        if self.flush_threshold == 0 {
            return Err(Error::config("Flush threshold must be greater than zero"));
        }

        if !is_plain_name(&self.source_file) {
            return Err(Error::config(format!(
                "Source file must be a plain file name, got {:?}",
                self.source_file
            )));
        }

        for (var, subdir) in &self.env_dirs {
            if var.is_empty() || var.contains('=') {
                return Err(Error::config(format!("Invalid environment variable {var:?}")));
            }
            if !is_plain_name(subdir) {
                return Err(Error::config(format!(
                    "Workspace directory for {var} must be a plain name, got {subdir:?}"
                )));
            }
        }

        Ok(())
    }
}

/// Returns `true` if `name` is a single normal path component.
fn is_plain_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

// ============================================================================
// Tests
// ============================================================================
