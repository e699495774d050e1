//! Shared test doubles.
//!
//! `RecordingSink` captures emitted events; `FakeToolchain` stands in for a
//! real compiler so pipeline and session tests never spawn processes;
//! `upgraded_pair` yields an in-memory connection past the handshake.

use std::fs;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};

use crate::error::{Error, Result};
use crate::execution::{Invocation, Launched, OutputSender, OutputStream, ProcessHandle, Toolchain};
use crate::protocol::OutboundEvent;
use crate::transport::{EventSink, Transport, UpgradeRequest};

/// Client side of a well-formed upgrade request.
pub(crate) const UPGRADE_REQUEST: &str = "GET /ws HTTP/1.1\r\n\
                                          Host: localhost\r\n\
                                          Upgrade: websocket\r\n\
                                          Connection: Upgrade\r\n\
                                          Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
                                          Sec-WebSocket-Version: 13\r\n\r\n";

// ============================================================================
// Connections
// ============================================================================

/// Returns an upgraded server transport and the client end, with the `101`
/// response already consumed.
pub(crate) async fn upgraded_pair() -> (Transport<DuplexStream>, DuplexStream) {
    let (server, mut client) = duplex(256 * 1024);
    client.write_all(UPGRADE_REQUEST.as_bytes()).await.unwrap();

    let transport = UpgradeRequest::read(server)
        .await
        .unwrap()
        .accept()
        .await
        .unwrap();

    let head = read_response_head(&mut client).await;
    assert!(head.starts_with("HTTP/1.1 101"), "unexpected response: {head}");
    (transport, client)
}

/// Reads an HTTP response head byte by byte, leaving any frames unread.
pub(crate) async fn read_response_head<R>(reader: &mut R) -> String
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut head = Vec::new();
    while !head.ends_with(b"\r\n\r\n") {
        head.push(reader.read_u8().await.unwrap());
    }
    String::from_utf8(head).unwrap()
}

// ============================================================================
// RecordingSink
// ============================================================================

/// Collects every emitted event in order.
#[derive(Default)]
pub(crate) struct RecordingSink {
    events: Mutex<Vec<OutboundEvent>>,
}

impl RecordingSink {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn events(&self) -> Vec<OutboundEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn emit(&self, event: OutboundEvent) {
        self.events.lock().push(event);
    }
}

// ============================================================================
// FakeToolchain
// ============================================================================

#[derive(Clone, Copy)]
enum Behavior {
    /// Send the chunks, close output, exit with the code.
    Exit(i32),
    /// Send the chunks and keep output open until killed.
    Hang,
    /// Fail to start.
    Fail,
}

/// Scripted toolchain.
pub(crate) struct FakeToolchain {
    chunks: Vec<Vec<u8>>,
    behavior: Behavior,
    killed: Arc<AtomicBool>,
    /// Each start's invocation and the source text found on disk at that time.
    started: Mutex<Vec<(Invocation, String)>>,
}

impl FakeToolchain {
    fn with(chunks: Vec<Vec<u8>>, behavior: Behavior) -> Self {
        Self {
            chunks,
            behavior,
            killed: Arc::new(AtomicBool::new(false)),
            started: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn exiting(chunks: Vec<Vec<u8>>, code: i32) -> Self {
        Self::with(chunks, Behavior::Exit(code))
    }

    pub(crate) fn hanging(chunks: Vec<Vec<u8>>) -> Self {
        Self::with(chunks, Behavior::Hang)
    }

    pub(crate) fn failing() -> Self {
        Self::with(Vec::new(), Behavior::Fail)
    }

    pub(crate) fn started(&self) -> Vec<(Invocation, String)> {
        self.started.lock().clone()
    }

    pub(crate) fn was_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Toolchain for FakeToolchain {
    async fn start(&self, invocation: Invocation) -> Result<Launched> {
        if let Behavior::Fail = self.behavior {
            return Err(Error::process_launch_failed(io::Error::new(
                io::ErrorKind::NotFound,
                "fake toolchain missing",
            )));
        }

        let source = fs::read_to_string(&invocation.source).unwrap_or_default();
        self.started.lock().push((invocation, source));

        let (tx, output) = OutputStream::channel();
        for chunk in &self.chunks {
            let _ = tx.send(chunk.clone());
        }

        let (sender, code) = match self.behavior {
            Behavior::Exit(code) => (None, Some(code)),
            _ => (Some(tx), None),
        };

        Ok(Launched {
            output,
            process: Box::new(FakeProcess {
                sender,
                code,
                killed: Arc::clone(&self.killed),
            }),
        })
    }
}

/// Process handle whose output stays open while it holds the sender.
struct FakeProcess {
    sender: Option<OutputSender>,
    code: Option<i32>,
    killed: Arc<AtomicBool>,
}

#[async_trait]
impl ProcessHandle for FakeProcess {
    fn pid(&self) -> Option<u32> {
        None
    }

    fn kill(&mut self) -> io::Result<()> {
        self.sender = None;
        self.killed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn wait(&mut self) -> io::Result<Option<i32>> {
        Ok(self.code)
    }
}
