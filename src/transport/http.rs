//! HTTP request head and WebSocket upgrade.
//!
//! Only as much HTTP as the upgrade needs: one request head is read, then the
//! connection is either answered with a plain status and closed, or switched
//! to WebSocket and handed off as a [`Transport`].
//!
//! The buffered reader that consumed the head travels with the stream into
//! the transport, so bytes the client sent right behind the head (an early
//! first frame) are not lost.

// ============================================================================
// Imports
// ============================================================================

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf,
    WriteHalf, split,
};
use httparse::Status;
use tracing::{debug, trace};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::upgrade_response;

// ============================================================================
// Constants
// ============================================================================

/// Upper bound on the request line plus headers.
pub const MAX_HEAD_LEN: u64 = 8 * 1024;

/// Upper bound on the number of headers.
pub const MAX_HEADERS: usize = 64;

/// Base used to resolve origin-form request targets.
const TARGET_BASE: &str = "http://localhost/";

// ============================================================================
// RequestHead
// ============================================================================

/// Parsed request line and headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    /// Request method, e.g. `GET`.
    method: String,
    /// Raw request target.
    target: String,
    /// Target path without query or fragment.
    path: String,
    /// Headers in arrival order.
    headers: Vec<(String, String)>,
}

impl RequestHead {
    /// Parses a complete head, request line through the blank line.
    fn parse(buf: &[u8]) -> Result<Self> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut request = httparse::Request::new(&mut headers);

        match request.parse(buf) {
            Ok(Status::Complete(_)) => {}
            Ok(Status::Partial) => return Err(Error::handshake("Request head truncated")),
            Err(e) => return Err(Error::handshake(format!("Malformed request head: {e}"))),
        }

        let (Some(method), Some(target)) = (request.method, request.path) else {
            return Err(Error::handshake("Missing request line"));
        };

        let path = Url::parse(TARGET_BASE)
            .and_then(|base| base.join(target))
            .map_err(|e| Error::handshake(format!("Invalid request target {target:?}: {e}")))?
            .path()
            .to_string();

        let headers = request
            .headers
            .iter()
            .map(|h| {
                let value = String::from_utf8_lossy(h.value).trim().to_string();
                (h.name.to_string(), value)
            })
            .collect();

        Ok(Self {
            method: method.to_string(),
            target: target.to_string(),
            path,
            headers,
        })
    }

    /// Returns the request method.
    #[inline]
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the raw request target.
    #[inline]
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Returns the target path, without query string.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the first header with this name (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns `true` if the `Upgrade` header asks for WebSocket.
    #[must_use]
    pub fn is_websocket_upgrade(&self) -> bool {
        self.header("Upgrade")
            .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
    }
}

// ============================================================================
// UpgradeRequest
// ============================================================================

/// A connection whose request head has been read but not yet answered.
#[derive(Debug)]
pub struct UpgradeRequest<S> {
    head: RequestHead,
    stream: BufReader<S>,
}

impl<S> UpgradeRequest<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Reads the request head from a fresh connection.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the peer closes before sending anything
    /// - [`Error::Handshake`] if the head is malformed, truncated or too large
    /// - [`Error::Io`] on read failure
    pub async fn read(stream: S) -> Result<Self> {
        let mut stream = BufReader::new(stream);
        let mut buf = Vec::new();

        // Line by line, so bytes past the blank line stay in the reader.
        loop {
            let start = buf.len();
            let remaining = MAX_HEAD_LEN.saturating_sub(start as u64);
            let n = (&mut stream)
                .take(remaining)
                .read_until(b'\n', &mut buf)
                .await?;

            if n == 0 {
                if buf.is_empty() {
                    return Err(Error::ConnectionClosed);
                }
                if remaining == 0 {
                    return Err(Error::handshake("Request head too large"));
                }
                return Err(Error::handshake("Request head truncated"));
            }

            if buf.last() != Some(&b'\n') {
                if buf.len() as u64 >= MAX_HEAD_LEN {
                    return Err(Error::handshake("Request head too large"));
                }
                return Err(Error::handshake("Request head truncated"));
            }

            let line = &buf[start..];
            if start > 0 && matches!(line, b"\r\n" | b"\n") {
                break;
            }
        }

        let head = RequestHead::parse(&buf)?;
        trace!(method = %head.method, target = %head.target, "Request head read");

        Ok(Self { head, stream })
    }

    /// Returns the request head.
    #[inline]
    #[must_use]
    pub fn head(&self) -> &RequestHead {
        &self.head
    }

    /// Answers with a plain-text status response and closes the connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the write fails.
    pub async fn respond(mut self, status: u16, reason: &str, body: &str) -> Result<()> {
        self.write_status(status, reason, body).await?;
        self.stream.shutdown().await?;
        Ok(())
    }

    /// Completes the WebSocket handshake and hands the stream over.
    ///
    /// A request that is not a valid upgrade is answered `400 Bad Request`
    /// before the error is returned.
    ///
    /// # Errors
    ///
    /// - [`Error::Handshake`] if the request is not a WebSocket upgrade or
    ///   lacks `Sec-WebSocket-Key`
    /// - [`Error::Io`] if writing the response fails
    pub async fn accept(mut self) -> Result<Transport<S>> {
        if !self.head.is_websocket_upgrade() {
            self.write_status(400, "Bad Request", "Expected WebSocket Upgrade")
                .await?;
            return Err(Error::handshake("Expected WebSocket Upgrade"));
        }

        let response = match upgrade_response(self.head.header("Sec-WebSocket-Key")) {
            Ok(response) => response,
            Err(e) => {
                self.write_status(400, "Bad Request", &e.to_string()).await?;
                return Err(e);
            }
        };

        self.stream.write_all(response.as_bytes()).await?;
        self.stream.flush().await?;
        debug!(path = %self.head.path, "WebSocket upgrade complete");

        Ok(Transport {
            stream: self.stream,
        })
    }

    /// Writes a complete `Connection: close` response.
    async fn write_status(&mut self, status: u16, reason: &str, body: &str) -> Result<()> {
        let response = format!(
            "HTTP/1.1 {status} {reason}\r\n\
             Content-Type: text/plain; charset=utf-8\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\r\n{body}",
            body.len()
        );
        self.stream.write_all(response.as_bytes()).await?;
        self.stream.flush().await?;
        Ok(())
    }
}

// ============================================================================
// Transport
// ============================================================================

/// An upgraded connection, owned by exactly one session.
///
/// Only [`UpgradeRequest::accept`] creates one.
#[derive(Debug)]
pub struct Transport<S> {
    stream: BufReader<S>,
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite,
{
    /// Splits into independently owned read and write halves.
    #[must_use]
    pub fn into_split(self) -> (ReadHalf<BufReader<S>>, WriteHalf<BufReader<S>>) {
        split(self.stream)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::duplex;

    use crate::protocol::{Frame, Opcode, read_frame};

    const UPGRADE: &str = "GET /ws?lang=go HTTP/1.1\r\n\
                           Host: localhost\r\n\
                           upgrade: WebSocket\r\n\
                           Connection: Upgrade\r\n\
                           Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
                           Sec-WebSocket-Version: 13\r\n\r\n";

    async fn read_all(mut stream: impl AsyncRead + Unpin) -> String {
        let mut out = String::new();
        stream.read_to_string(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn test_parses_request_head() {
        let (server, mut client) = duplex(4096);
        client.write_all(UPGRADE.as_bytes()).await.unwrap();

        let request = UpgradeRequest::read(server).await.unwrap();
        let head = request.head();

        assert_eq!(head.method(), "GET");
        assert_eq!(head.target(), "/ws?lang=go");
        assert_eq!(head.path(), "/ws");
        assert_eq!(head.header("HOST"), Some("localhost"));
        assert_eq!(head.header("missing"), None);
        assert!(head.is_websocket_upgrade());
    }

    #[tokio::test]
    async fn test_accept_writes_switching_protocols() {
        let (server, mut client) = duplex(4096);
        client.write_all(UPGRADE.as_bytes()).await.unwrap();

        let request = UpgradeRequest::read(server).await.unwrap();
        let transport = request.accept().await.unwrap();
        drop(transport);

        let response = read_all(&mut client).await;
        assert!(response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(response.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
    }

    #[tokio::test]
    async fn test_bytes_after_head_reach_transport() {
        let (server, mut client) = duplex(4096);
        let mut bytes = UPGRADE.as_bytes().to_vec();
        bytes.extend(Frame::text("early").masked([1, 2, 3, 4]).to_bytes());
        client.write_all(&bytes).await.unwrap();

        let transport = UpgradeRequest::read(server)
            .await
            .unwrap()
            .accept()
            .await
            .unwrap();
        let (mut reader, _writer) = transport.into_split();

        let frame = read_frame(&mut reader, 1024).await.unwrap();
        assert_eq!(frame.opcode, Opcode::Text);
        assert_eq!(frame.payload, b"early");
    }

    #[tokio::test]
    async fn test_non_websocket_upgrade_rejected() {
        let (server, mut client) = duplex(4096);
        client
            .write_all(b"GET /ws HTTP/1.1\r\nUpgrade: h2c\r\n\r\n")
            .await
            .unwrap();

        let request = UpgradeRequest::read(server).await.unwrap();
        assert!(!request.head().is_websocket_upgrade());
        let err = request.accept().await.unwrap_err();
        assert!(matches!(err, Error::Handshake { .. }));

        let response = read_all(&mut client).await;
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(response.ends_with("Expected WebSocket Upgrade"));
    }

    #[tokio::test]
    async fn test_missing_key_rejected() {
        let (server, mut client) = duplex(4096);
        client
            .write_all(b"GET /ws HTTP/1.1\r\nUpgrade: websocket\r\n\r\n")
            .await
            .unwrap();

        let err = UpgradeRequest::read(server)
            .await
            .unwrap()
            .accept()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Handshake { .. }));

        let response = read_all(&mut client).await;
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[tokio::test]
    async fn test_respond_closes_connection() {
        let (server, mut client) = duplex(4096);
        client.write_all(b"GET /other HTTP/1.1\r\n\r\n").await.unwrap();

        let request = UpgradeRequest::read(server).await.unwrap();
        assert_eq!(request.head().path(), "/other");
        request.respond(404, "Not Found", "Not Found").await.unwrap();

        let response = read_all(&mut client).await;
        assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(response.contains("Content-Length: 9\r\n"));
    }

    #[tokio::test]
    async fn test_empty_connection_is_closed() {
        let (server, client) = duplex(64);
        drop(client);

        let err = UpgradeRequest::read(server).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_malformed_request_line() {
        let (server, mut client) = duplex(64);
        client.write_all(b"HELLO\r\n\r\n").await.unwrap();

        let err = UpgradeRequest::read(server).await.unwrap_err();
        assert!(matches!(err, Error::Handshake { .. }));
    }

    #[tokio::test]
    async fn test_truncated_head() {
        let (server, mut client) = duplex(64);
        client.write_all(b"GET /ws HTTP/1.1\r\nHost: x").await.unwrap();
        drop(client);

        let err = UpgradeRequest::read(server).await.unwrap_err();
        assert!(matches!(err, Error::Handshake { .. }));
    }

    #[tokio::test]
    async fn test_bare_lf_line_endings() {
        let (server, mut client) = duplex(256);
        client
            .write_all(b"GET /ws HTTP/1.1\nUpgrade: websocket\n\n")
            .await
            .unwrap();

        let request = UpgradeRequest::read(server).await.unwrap();
        assert_eq!(request.head().path(), "/ws");
        assert!(request.head().is_websocket_upgrade());
    }

    #[tokio::test]
    async fn test_invalid_header_name() {
        let (server, mut client) = duplex(256);
        client
            .write_all(b"GET /ws HTTP/1.1\r\nBad Header: x\r\n\r\n")
            .await
            .unwrap();

        let err = UpgradeRequest::read(server).await.unwrap_err();
        assert!(matches!(err, Error::Handshake { .. }));
    }

    #[tokio::test]
    async fn test_too_many_headers() {
        let (server, mut client) = duplex(16 * 1024);
        let mut bytes = b"GET /ws HTTP/1.1\r\n".to_vec();
        for i in 0..=MAX_HEADERS {
            bytes.extend(format!("X-{i}: v\r\n").into_bytes());
        }
        bytes.extend(b"\r\n");
        client.write_all(&bytes).await.unwrap();

        let err = UpgradeRequest::read(server).await.unwrap_err();
        assert!(matches!(err, Error::Handshake { .. }));
    }

    #[tokio::test]
    async fn test_oversized_head() {
        let (server, mut client) = duplex(64 * 1024);
        let mut bytes = b"GET /ws HTTP/1.1\r\n".to_vec();
        bytes.extend(format!("X-Padding: {}\r\n\r\n", "a".repeat(10_000)).into_bytes());
        client.write_all(&bytes).await.unwrap();

        let err = UpgradeRequest::read(server).await.unwrap_err();
        assert!(err.to_string().contains("too large"));
    }
}
