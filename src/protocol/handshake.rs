//! WebSocket opening handshake.
//!
//! Computes the `Sec-WebSocket-Accept` value and the literal
//! `101 Switching Protocols` response. Taking over the socket is done by
//! [`crate::transport::UpgradeRequest::accept`].

// ============================================================================
// Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64Standard;
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Fixed GUID appended to the client key before hashing.
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

// ============================================================================
// Functions
// ============================================================================

/// Derives the accept key: `base64(SHA-1(client_key + GUID))`.
#[must_use]
pub fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    Base64Standard.encode(hasher.finalize())
}

/// Builds the full upgrade response for a client key.
///
/// # Errors
///
/// Returns [`Error::Handshake`] if the key is missing or blank.
pub fn upgrade_response(client_key: Option<&str>) -> Result<String> {
    let key = client_key
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| Error::handshake("Sec-WebSocket-Key is missing"))?;

    Ok(format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\r\n",
        accept_key(key)
    ))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc_accept_vector() {
        assert_eq!(
            accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn test_response_has_three_headers() {
        let response = upgrade_response(Some("dGhlIHNhbXBsZSBub25jZQ==")).unwrap();
        assert!(response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(response.contains("Upgrade: websocket\r\n"));
        assert!(response.contains("Connection: Upgrade\r\n"));
        assert!(response.ends_with("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n"));
    }

    #[test]
    fn test_missing_key_is_handshake_error() {
        assert!(matches!(
            upgrade_response(None),
            Err(Error::Handshake { .. })
        ));
        assert!(matches!(
            upgrade_response(Some("   ")),
            Err(Error::Handshake { .. })
        ));
    }
}
