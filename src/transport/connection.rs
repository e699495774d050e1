//! Connection session.
//!
//! One [`Session`] per upgraded connection. It owns the transport and every
//! run it starts.
//!
//! # Read Loop
//!
//! ```text
//! Open → ReadingFrame → Dispatching → ReadingFrame … → Closed
//! ```
//!
//! - Text frame: payload is a complete submission, started as its own run
//! - Close frame: loop ends
//! - Binary, ping, pong, continuation: ignored
//! - Decode or I/O failure: loop ends
//!
//! Runs are not queued against each other. Each is a task in the session's
//! [`JoinSet`]; finished ones are reaped as frames arrive, and closing the
//! session cancels and awaits the rest, which kills their processes and
//! removes their workspaces.

// ============================================================================
// Imports
// ============================================================================

use tokio::io::{AsyncRead, AsyncWrite, BufReader, ReadHalf, WriteHalf};
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace};

use crate::error::Error;
use crate::execution::Runner;
use crate::identifiers::ConnectionId;
use crate::protocol::{Opcode, read_frame};

use super::emitter::FrameEmitter;
use super::http::Transport;

// ============================================================================
// CloseReason
// ============================================================================

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Client sent a close frame.
    CloseFrame,
    /// Client went away (EOF, reset).
    Disconnected,
    /// Malformed frame or unexpected I/O failure.
    Failed {
        /// Error description, for logs.
        message: String,
    },
}

impl CloseReason {
    fn from_error(err: &Error) -> Self {
        if err.is_clean_close() {
            Self::Disconnected
        } else {
            Self::Failed {
                message: err.to_string(),
            }
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// Drives one WebSocket connection.
pub struct Session<S> {
    /// Connection identity, for logs.
    id: ConnectionId,
    /// Read side of the transport.
    reader: ReadHalf<BufReader<S>>,
    /// Write side, shared with every run.
    emitter: FrameEmitter<WriteHalf<BufReader<S>>>,
    /// Executes submissions.
    runner: Runner,
    /// Runs started by this session.
    runs: JoinSet<()>,
    /// Largest accepted frame payload.
    max_payload: u64,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Creates a session over an upgraded transport.
    #[must_use]
    pub fn new(transport: Transport<S>, id: ConnectionId, runner: Runner, max_payload: u64) -> Self {
        let (reader, writer) = transport.into_split();
        Self {
            id,
            reader,
            emitter: FrameEmitter::new(writer, id),
            runner,
            runs: JoinSet::new(),
            max_payload,
        }
    }

    /// Runs the read loop until the connection ends, then closes the session.
    pub async fn run(mut self) -> CloseReason {
        debug!(connection_id = %self.id, "Session started");

        let reason = loop {
            self.reap_finished();

            let frame = match read_frame(&mut self.reader, self.max_payload).await {
                Ok(frame) => frame,
                Err(Error::ConnectionClosed) => {
                    debug!(connection_id = %self.id, "Client closed the stream");
                    break CloseReason::Disconnected;
                }
                Err(e) if e.is_clean_close() => {
                    debug!(connection_id = %self.id, error = %e, "Client disconnected");
                    break CloseReason::from_error(&e);
                }
                Err(e) => {
                    error!(connection_id = %self.id, error = %e, "Session read failed");
                    break CloseReason::from_error(&e);
                }
            };

            match frame.opcode {
                Opcode::Text => self.dispatch(&frame.payload),
                Opcode::Close => {
                    debug!(connection_id = %self.id, "Close frame received");
                    break CloseReason::CloseFrame;
                }
                opcode => {
                    trace!(connection_id = %self.id, ?opcode, len = frame.payload_len(), "Ignoring frame");
                }
            }
        };

        self.close().await;
        reason
    }

    /// Starts a run for one submission.
    fn dispatch(&mut self, payload: &[u8]) {
        let source = String::from_utf8_lossy(payload).into_owned();
        let runner = self.runner.clone();
        let emitter = self.emitter.clone();

        debug!(
            connection_id = %self.id,
            bytes = source.len(),
            active = self.runs.len(),
            "Dispatching submission"
        );

        self.runs.spawn(async move {
            runner.run(&source, &emitter).await;
        });
    }

    /// Collects runs that have already finished.
    fn reap_finished(&mut self) {
        while let Some(result) = self.runs.try_join_next() {
            if let Err(e) = result
                && e.is_panic()
            {
                error!(connection_id = %self.id, error = %e, "Run panicked");
            }
        }
    }

    /// Cancels outstanding runs and releases the transport.
    async fn close(mut self) {
        let outstanding = self.runs.len();
        self.runs.shutdown().await;
        self.emitter.shutdown().await;

        info!(connection_id = %self.id, cancelled_runs = outstanding, "Session closed");
    }
}

// ============================================================================
// Tests
// ============================================================================
