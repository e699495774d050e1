//! Playground server.
//!
//! This module provides the main entry point for hosting the playground.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Server`] | Shared state, routing and connection registry |
//! | [`ServerBuilder`] | Fluent configuration builder |
//! | [`BoundServer`] | Bound listener running the accept loop |
//!
//! # Routing
//!
//! | Request | Response |
//! |---------|----------|
//! | Upgrade path, `Upgrade: websocket` | `101`, session starts |
//! | Upgrade path, anything else | `400 Expected WebSocket Upgrade` |
//! | Any other path | `404 Not Found` |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for server configuration.
pub mod builder;

/// Core server implementation.
pub mod core;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::{DEFAULT_ADDR, DEFAULT_PATH, ServerBuilder};
pub use self::core::{BoundServer, Server};
