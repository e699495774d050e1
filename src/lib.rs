//! Playground server - live code execution over WebSocket.
//!
//! Clients submit a complete program as one WebSocket text frame. The server
//! runs it in an isolated temporary workspace and streams its combined
//! output back as JSON events while it runs.
//!
//! # Architecture
//!
//! - **Transport**: hand-written HTTP upgrade and WebSocket frame codec
//! - **Session**: one read loop per connection; every submission becomes an
//!   independent run owned by that session
//! - **Execution**: workspace, toolchain process, output tokenizer and
//!   deadline, one set per run
//!
//! Outbound events:
//!
//! | Event | JSON |
//! |-------|------|
//! | Output | `{"type":"output","data":"..."}` |
//! | Error | `{"type":"error","data":"..."}` |
//! | Clear screen | `{"type":"clear"}` |
//!
//! # Quick Start
//!
//! ```no_run
//! use playground_server::{Result, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let server = Server::builder().addr("0.0.0.0:8080").path("/ws").build()?;
//!     let bound = server.bind().await?;
//!     println!("Server is running at {}", bound.ws_url());
//!     bound.serve().await
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`execution`] | Workspaces, toolchain, tokenizer, run pipeline |
//! | [`identifiers`] | Connection and run IDs |
//! | [`protocol`] | WebSocket frames, handshake, event envelope |
//! | [`server`] | Builder, routing, accept loop |
//! | [`transport`] | Upgrade, session loop, frame emitter |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Program execution.
///
/// [`Runner`] takes one submission from source text to cleaned-up workspace.
pub mod execution;

/// Type-safe identifiers for log correlation.
pub mod identifiers;

/// WebSocket wire protocol.
pub mod protocol;

/// Server configuration and accept loop.
///
/// Use [`Server::builder()`] to create a configured server.
pub mod server;

/// Connection transport layer.
pub mod transport;

#[cfg(test)]
mod testutil;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{Error, Result};

// Execution types
pub use execution::{CommandToolchain, RunOptions, RunOutcome, Runner, Toolchain};

// Identifier types
pub use identifiers::{ConnectionId, RunId};

// Protocol types
pub use protocol::OutboundEvent;

// Server types
pub use server::{BoundServer, Server, ServerBuilder};
