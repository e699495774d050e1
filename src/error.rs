//! Error types for the playground server.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use playground_server::{Result, Server};
//!
//! async fn example(server: Server) -> Result<()> {
//!     server.bind().await?.serve().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants | Effect |
//! |----------|----------|--------|
//! | Configuration | [`Error::Config`] | Startup fails |
//! | Handshake | [`Error::Handshake`] | Upgrade attempt rejected |
//! | Protocol | [`Error::Protocol`] | Session closes silently |
//! | Transport | [`Error::ConnectionClosed`], [`Error::Io`] | Session closes silently |
//! | Execution | [`Error::Workspace`], [`Error::SourceWrite`], [`Error::Pipe`], [`Error::ProcessLaunchFailed`], [`Error::ExecutionTimeout`] | Reported to the client |
//! | External | [`Error::Json`] | Logged |

// ============================================================================
// Imports
// ============================================================================

use std::io::{Error as IoError, ErrorKind};
use std::result::Result as StdResult;
use std::time::Duration;

use thiserror::Error;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Execution variants carry the exact text shown to the client, so their
/// `Display` output is sent as-is inside an `error` event.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when server or run configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Handshake Errors
    // ========================================================================
    /// WebSocket upgrade could not be completed.
    ///
    /// Returned when the key is missing or the transport cannot be taken over.
    #[error("Handshake error: {message}")]
    Handshake {
        /// Description of the handshake failure.
        message: String,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation on the wire.
    ///
    /// Returned for fragmented frames, malformed lengths, reserved opcodes.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Peer closed the connection cleanly between frames.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// Temporary workspace could not be created.
    #[error("Failed to create temporary directory: {message}")]
    Workspace {
        /// Underlying failure.
        message: String,
    },

    /// Submitted source could not be written into the workspace.
    #[error("Failed to write temporary file: {message}")]
    SourceWrite {
        /// Underlying failure.
        message: String,
    },

    /// An output pipe of the child process was not available.
    #[error("Failed to create {stream} pipe")]
    Pipe {
        /// Which stream failed ("output" or "error output").
        stream: &'static str,
    },

    /// Toolchain process failed to start.
    #[error("Failed to start command: {message}")]
    ProcessLaunchFailed {
        /// Description of the launch failure.
        message: String,
    },

    /// Run exceeded its wall-clock budget and was killed.
    #[error("Execution timeout, terminated")]
    ExecutionTimeout {
        /// Milliseconds the run was allowed.
        timeout_ms: u64,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a handshake error.
    #[inline]
    pub fn handshake(message: impl Into<String>) -> Self {
        Self::Handshake {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a workspace creation error.
    #[inline]
    pub fn workspace(err: IoError) -> Self {
        Self::Workspace {
            message: err.to_string(),
        }
    }

    /// Creates a source write error.
    #[inline]
    pub fn source_write(err: IoError) -> Self {
        Self::SourceWrite {
            message: err.to_string(),
        }
    }

    /// Creates a pipe error for the named stream.
    #[inline]
    pub fn pipe(stream: &'static str) -> Self {
        Self::Pipe { stream }
    }

    /// Creates a process launch failed error.
    #[inline]
    pub fn process_launch_failed(err: IoError) -> Self {
        Self::ProcessLaunchFailed {
            message: err.to_string(),
        }
    }

    /// Creates an execution timeout error.
    #[inline]
    pub fn execution_timeout(timeout: Duration) -> Self {
        Self::ExecutionTimeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ExecutionTimeout { .. })
    }

    /// Returns `true` if this error belongs to a single run.
    ///
    /// Run-local errors are reported to the client and never end a session.
    #[inline]
    #[must_use]
    pub fn is_execution_error(&self) -> bool {
        matches!(
            self,
            Self::Workspace { .. }
                | Self::SourceWrite { .. }
                | Self::Pipe { .. }
                | Self::ProcessLaunchFailed { .. }
                | Self::ExecutionTimeout { .. }
        )
    }

    /// Returns `true` if this error ends a connection.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Protocol { .. } | Self::ConnectionClosed | Self::Io(_)
        )
    }

    /// Returns `true` if the peer went away without a protocol violation.
    ///
    /// Used only to pick the log level when a session ends.
    #[must_use]
    pub fn is_clean_close(&self) -> bool {
        match self {
            Self::ConnectionClosed => true,
            Self::Io(e) => matches!(
                e.kind(),
                ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
