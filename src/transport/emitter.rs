//! Output emitter.
//!
//! Serializes [`OutboundEvent`]s into text frames and writes them to the
//! connection. Every run on a connection shares one [`FrameEmitter`]; the
//! write lock is held for a whole frame (header, payload, flush), so frames
//! from concurrent runs never interleave on the wire.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::identifiers::ConnectionId;
use crate::protocol::{OutboundEvent, encode_text};

// ============================================================================
// EventSink
// ============================================================================

/// Destination for run events.
///
/// Emission never fails from the caller's point of view: a sink that cannot
/// deliver an event logs and drops it.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Delivers one event.
    async fn emit(&self, event: OutboundEvent);
}

// ============================================================================
// FrameEmitter
// ============================================================================

/// Writes events as WebSocket text frames to a shared writer.
pub struct FrameEmitter<W> {
    /// Write side of the transport, locked per frame.
    writer: Arc<Mutex<W>>,
    /// Owning connection, for logs.
    connection_id: ConnectionId,
}

impl<W> Clone for FrameEmitter<W> {
    fn clone(&self) -> Self {
        Self {
            writer: Arc::clone(&self.writer),
            connection_id: self.connection_id,
        }
    }
}

impl<W> FrameEmitter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Wraps the write side of a transport.
    #[must_use]
    pub fn new(writer: W, connection_id: ConnectionId) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
            connection_id,
        }
    }

    /// Serializes and writes one event as a single frame.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::Json`] if serialization fails
    /// - [`crate::Error::Io`] if the write or flush fails
    pub async fn send(&self, event: &OutboundEvent) -> Result<()> {
        let json = event.to_json()?;
        let frame = encode_text(json.as_bytes());

        let mut writer = self.writer.lock().await;
        writer.write_all(&frame).await?;
        writer.flush().await?;

        trace!(
            connection_id = %self.connection_id,
            kind = event.kind(),
            bytes = frame.len(),
            "Frame sent"
        );
        Ok(())
    }

    /// Shuts down the write side.
    pub async fn shutdown(&self) {
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            debug!(connection_id = %self.connection_id, error = %e, "Error shutting down writer");
        }
    }
}

#[async_trait]
impl<W> EventSink for FrameEmitter<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn emit(&self, event: OutboundEvent) {
        if let Err(e) = self.send(&event).await {
            warn!(
                connection_id = %self.connection_id,
                kind = event.kind(),
                error = %e,
                "Failed to send event"
            );
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
