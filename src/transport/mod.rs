//! Connection transport layer.
//!
//! Takes an accepted byte stream through the HTTP upgrade and runs the
//! WebSocket session on it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   HTTP GET /ws    ┌────────────────┐
//! │   Browser    │ ────────────────► │ UpgradeRequest │
//! │   client     │ ◄──── 101 ─────── │   → Transport  │
//! │              │                   └───────┬────────┘
//! │              │   text frames             ▼
//! │              │ ────────────────► ┌────────────────┐   spawn   ┌────────┐
//! │              │                   │    Session     │ ────────► │ Runner │
//! │              │ ◄── JSON events ─ │  FrameEmitter  │ ◄──────── │  ...   │
//! └──────────────┘                   └────────────────┘           └────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `UpgradeRequest::read` - Read the request head
//! 2. `UpgradeRequest::accept` - Answer `101`, hand over a `Transport`
//! 3. `Session::run` - Read frames, start runs, stream their events
//! 4. Session closes: runs cancelled, transport shut down
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Session read loop and run ownership |
//! | `emitter` | Serialized frame writes |
//! | `http` | Request head parsing and upgrade |

// ============================================================================
// Submodules
// ============================================================================

/// Session read loop.
pub mod connection;

/// Output emitter.
pub mod emitter;

/// Request head and upgrade.
pub mod http;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{CloseReason, Session};
pub use emitter::{EventSink, FrameEmitter};
pub use http::{MAX_HEAD_LEN, RequestHead, Transport, UpgradeRequest};
