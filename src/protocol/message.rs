//! Outbound message types.
//!
//! Every server-to-client message is a JSON object with a `type`
//! discriminator:
//!
//! | Event | JSON |
//! |-------|------|
//! | Output | `{"type":"output","data":"..."}` |
//! | Error | `{"type":"error","data":"..."}` |
//! | Clear | `{"type":"clear"}` |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// OutboundEvent
// ============================================================================

/// An event produced by a run and sent to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundEvent {
    /// A chunk of program output.
    Output {
        /// Output text.
        data: String,
    },
    /// A run-level failure.
    Error {
        /// Human-readable message.
        data: String,
    },
    /// Clear the client's display.
    Clear,
}

impl OutboundEvent {
    /// Creates an output event.
    #[inline]
    pub fn output(data: impl Into<String>) -> Self {
        Self::Output { data: data.into() }
    }

    /// Creates an error event.
    #[inline]
    pub fn error(data: impl Into<String>) -> Self {
        Self::Error { data: data.into() }
    }

    /// Creates an error event from a run failure.
    #[inline]
    #[must_use]
    pub fn from_error(err: &Error) -> Self {
        Self::Error {
            data: err.to_string(),
        }
    }

    /// Returns the wire `type` value.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Output { .. } => "output",
            Self::Error { .. } => "error",
            Self::Clear => "clear",
        }
    }

    /// Serializes to the JSON envelope.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_json() {
        let json = OutboundEvent::output("hi\n").to_json().unwrap();
        assert_eq!(json, r#"{"type":"output","data":"hi\n"}"#);
    }

    #[test]
    fn test_error_json() {
        let json = OutboundEvent::error("Execution timeout, terminated")
            .to_json()
            .unwrap();
        assert_eq!(
            json,
            r#"{"type":"error","data":"Execution timeout, terminated"}"#
        );
    }

    #[test]
    fn test_clear_json_has_no_data() {
        let json = OutboundEvent::Clear.to_json().unwrap();
        assert_eq!(json, r#"{"type":"clear"}"#);
    }

    #[test]
    fn test_escapes_control_and_quotes() {
        let json = OutboundEvent::output("say \"hi\"\t\u{1b}[0m").to_json().unwrap();
        let back: OutboundEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, OutboundEvent::output("say \"hi\"\t\u{1b}[0m"));
    }

    #[test]
    fn test_from_error_uses_display() {
        let err = Error::pipe("error output");
        assert_eq!(
            OutboundEvent::from_error(&err),
            OutboundEvent::error("Failed to create error output pipe")
        );
    }

    #[test]
    fn test_kind() {
        assert_eq!(OutboundEvent::Clear.kind(), "clear");
        assert_eq!(OutboundEvent::output("").kind(), "output");
    }
}
