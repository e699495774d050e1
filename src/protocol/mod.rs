//! WebSocket wire protocol.
//!
//! A from-scratch implementation of the parts of the WebSocket protocol the
//! playground needs: the opening handshake, single-frame messages with
//! client masking, and the JSON envelope carried in outbound text frames.
//!
//! # Protocol Overview
//!
//! | Message | Direction | Purpose |
//! |---------|-----------|---------|
//! | Text frame, raw source | Client → Server | One complete submission |
//! | Close frame | Client → Server | Ends the session |
//! | Text frame, [`OutboundEvent`] JSON | Server → Client | Output, error, clear |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `frame` | Frame decode/encode and masking |
//! | `handshake` | Accept key and upgrade response |
//! | `message` | Outbound event envelope |

// ============================================================================
// Submodules
// ============================================================================

/// Frame decode/encode and masking.
pub mod frame;

/// Opening handshake.
pub mod handshake;

/// Outbound event envelope.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use frame::{
    DEFAULT_MAX_PAYLOAD, Frame, LengthForm, MAX_LITERAL_LEN, Opcode, apply_mask, encode_text,
    read_frame,
};
pub use handshake::{WEBSOCKET_GUID, accept_key, upgrade_response};
pub use message::OutboundEvent;
