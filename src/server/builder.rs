//! Builder pattern for server configuration.
//!
//! Provides a fluent API for configuring and creating [`Server`] instances.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use playground_server::{RunOptions, Server};
//!
//! # async fn example() -> playground_server::Result<()> {
//! let server = Server::builder()
//!     .addr("127.0.0.1:8080")
//!     .path("/ws")
//!     .run_options(RunOptions::new().with_timeout(Duration::from_secs(30)))
//!     .build()?;
//!
//! server.bind().await?.serve().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::execution::{CommandToolchain, RunOptions, Runner, Toolchain};
use crate::protocol::DEFAULT_MAX_PAYLOAD;

use super::core::Server;

// ============================================================================
// Constants
// ============================================================================

/// Default listen address.
pub const DEFAULT_ADDR: &str = "0.0.0.0:8080";

/// Default upgrade path.
pub const DEFAULT_PATH: &str = "/ws";

// ============================================================================
// ServerBuilder
// ============================================================================

/// Builder for configuring a [`Server`] instance.
///
/// Use [`Server::builder()`] to create a new builder.
#[derive(Clone)]
pub struct ServerBuilder {
    /// Listen address, `host:port`.
    addr: String,
    /// Path that accepts WebSocket upgrades.
    path: String,
    /// Largest accepted frame payload.
    max_message_size: u64,
    /// Run limits and toolchain command.
    run_options: RunOptions,
    /// Toolchain override; defaults to a [`CommandToolchain`].
    toolchain: Option<Arc<dyn Toolchain>>,
}

impl fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerBuilder")
            .field("addr", &self.addr)
            .field("path", &self.path)
            .field("max_message_size", &self.max_message_size)
            .field("run_options", &self.run_options)
            .field("custom_toolchain", &self.toolchain.is_some())
            .finish()
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            path: DEFAULT_PATH.to_string(),
            max_message_size: DEFAULT_MAX_PAYLOAD,
            run_options: RunOptions::default(),
            toolchain: None,
        }
    }
}

// ============================================================================
// ServerBuilder Implementation
// ============================================================================

impl ServerBuilder {
    /// Creates a builder with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the listen address, e.g. `"127.0.0.1:0"`.
    #[inline]
    #[must_use]
    pub fn addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    /// Sets the path that accepts WebSocket upgrades.
    #[inline]
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the largest accepted frame payload, in bytes.
    #[inline]
    #[must_use]
    pub fn max_message_size(mut self, bytes: u64) -> Self {
        self.max_message_size = bytes;
        self
    }

    /// Sets the run options.
    #[inline]
    #[must_use]
    pub fn run_options(mut self, options: RunOptions) -> Self {
        self.run_options = options;
        self
    }

    /// Replaces the process-spawning toolchain.
    #[inline]
    #[must_use]
    pub fn toolchain(mut self, toolchain: Arc<dyn Toolchain>) -> Self {
        self.toolchain = Some(toolchain);
        self
    }

    /// Builds the server with validation. Does not bind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the address, path, message size or run
    /// options are invalid.
    pub fn build(self) -> Result<Server> {
        let addr = self.validate_addr()?;
        self.validate_path()?;

        if self.max_message_size == 0 {
            return Err(Error::config("Max message size must be greater than zero"));
        }

        self.run_options.validate()?;

        let runner = match self.toolchain {
            Some(toolchain) => Runner::new(toolchain, self.run_options),
            None => Runner::new(
                Arc::new(CommandToolchain::from_options(&self.run_options)),
                self.run_options,
            ),
        };

        Ok(Server::new(addr, self.path, self.max_message_size, runner))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ServerBuilder {
    /// Parses the listen address.
    fn validate_addr(&self) -> Result<SocketAddr> {
        self.addr.parse().map_err(|e| {
            Error::config(format!(
                "Invalid listen address {:?}: {e}\n\
                 Example: Server::builder().addr(\"0.0.0.0:8080\")",
                self.addr
            ))
        })
    }

    /// Checks the upgrade path is absolute and has no query.
    fn validate_path(&self) -> Result<()> {
        if !self.path.starts_with('/') || self.path.contains(['?', '#']) {
            return Err(Error::config(format!(
                "Upgrade path must start with '/' and have no query, got {:?}",
                self.path
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
