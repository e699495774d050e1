//! Toolchain invocation.
//!
//! The pipeline never spawns processes directly. It asks a [`Toolchain`] to
//! start a program and gets back a merged output stream plus a
//! [`ProcessHandle`] it can kill and wait on. [`CommandToolchain`] is the
//! real implementation; tests substitute their own.
//!
//! # Process Isolation
//!
//! On Unix the child is placed in its own process group, and a forced kill
//! signals the whole group. `go run` compiles to a temporary binary and runs
//! it as a grandchild, so killing only the direct child would leave the
//! user program running with the output pipes still open.

// ============================================================================
// Imports
// ============================================================================

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::{Error, Result};

use super::options::RunOptions;

// ============================================================================
// Constants
// ============================================================================

/// Size of a single pipe read.
const READ_CHUNK: usize = 4096;

// ============================================================================
// Invocation
// ============================================================================

/// What to run and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Path of the source file to run.
    pub source: PathBuf,
    /// Working directory (the run's workspace).
    pub workdir: PathBuf,
    /// Extra environment, on top of the inherited one.
    pub env: Vec<(String, PathBuf)>,
}

// ============================================================================
// OutputStream
// ============================================================================

/// Sending side of an [`OutputStream`].
pub type OutputSender = mpsc::UnboundedSender<Vec<u8>>;

/// Combined stdout and stderr of a program, in arrival order.
///
/// Ends once every sender has been dropped.
#[derive(Debug)]
pub struct OutputStream {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl OutputStream {
    /// Creates a stream and the sender that feeds it.
    #[must_use]
    pub fn channel() -> (OutputSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }

    /// Merges several readers into one stream.
    ///
    /// One forwarding task is spawned per reader; the stream ends when all
    /// of them reach EOF.
    #[must_use]
    pub fn merge<R>(readers: impl IntoIterator<Item = R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, stream) = Self::channel();
        for reader in readers {
            tokio::spawn(forward(reader, tx.clone()));
        }
        stream
    }

    /// Waits for the next chunk, or `None` at end of stream.
    #[inline]
    pub async fn next_chunk(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }
}

/// Copies `reader` into `tx` until EOF, a read error, or the receiver closes.
async fn forward<R>(mut reader: R, tx: OutputSender)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!(error = %e, "Error reading output");
                break;
            }
        }
    }
    trace!("Output reader finished");
}

// ============================================================================
// Traits
// ============================================================================

/// A started program.
pub struct Launched {
    /// Merged stdout/stderr.
    pub output: OutputStream,
    /// Control over the process.
    pub process: Box<dyn ProcessHandle>,
}

/// Control over a running program.
#[async_trait]
pub trait ProcessHandle: Send {
    /// OS process ID, if known.
    fn pid(&self) -> Option<u32>;

    /// Forcibly terminates the program. Does not wait for it to exit.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the kill signal could not be delivered.
    fn kill(&mut self) -> io::Result<()>;

    /// Waits for the program to exit and reaps it.
    ///
    /// Returns the exit code, or `None` if killed by a signal.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if waiting fails.
    async fn wait(&mut self) -> io::Result<Option<i32>>;
}

/// Something that can run a source file.
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Starts the program described by `invocation`.
    ///
    /// # Errors
    ///
    /// - [`Error::ProcessLaunchFailed`] if the process cannot start
    /// - [`Error::Pipe`] if an output pipe is unavailable
    async fn start(&self, invocation: Invocation) -> Result<Launched>;
}

// ============================================================================
// CommandToolchain
// ============================================================================

/// Runs `<program> <args...> <source>` as a child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandToolchain {
    /// Executable to launch.
    program: PathBuf,
    /// Arguments placed before the source path.
    args: Vec<OsString>,
}

impl CommandToolchain {
    /// Creates a toolchain for an executable and leading arguments.
    #[must_use]
    pub fn new(
        program: impl Into<PathBuf>,
        args: impl IntoIterator<Item = impl Into<OsString>>,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a toolchain from run options.
    #[must_use]
    pub fn from_options(options: &RunOptions) -> Self {
        Self::new(options.program.clone(), options.args.iter().cloned())
    }

    /// Builds the command for an invocation.
    fn command(&self, invocation: &Invocation) -> Command {
        let mut cmd = Command::new(&self.program);

        cmd.args(&self.args)
            .arg(&invocation.source)
            .current_dir(&invocation.workdir)
            .envs(invocation.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        cmd
    }
}

#[async_trait]
impl Toolchain for CommandToolchain {
    async fn start(&self, invocation: Invocation) -> Result<Launched> {
        let mut child = self
            .command(&invocation)
            .spawn()
            .map_err(Error::process_launch_failed)?;

        // A missing pipe drops `child` here; kill_on_drop terminates it.
        let stdout = child.stdout.take().ok_or_else(|| Error::pipe("output"))?;
        let stderr = child.stderr.take().ok_or_else(|| Error::pipe("error output"))?;

        let output = OutputStream::merge([
            Box::new(stdout) as Box<dyn AsyncRead + Unpin + Send>,
            Box::new(stderr),
        ]);

        let process = ChildProcess::new(child);
        debug!(pid = ?process.pid, program = %self.program.display(), "Toolchain started");

        Ok(Launched {
            output,
            process: Box::new(process),
        })
    }
}

// ============================================================================
// ChildProcess
// ============================================================================

/// Guards a child process and kills its group if dropped before reaping.
struct ChildProcess {
    /// The child process handle.
    child: Child,
    /// Process ID (also the process group ID on Unix).
    pid: Option<u32>,
    /// Set once the exit status has been collected.
    reaped: bool,
}

impl ChildProcess {
    fn new(child: Child) -> Self {
        let pid = child.id();
        Self {
            child,
            pid,
            reaped: false,
        }
    }

    /// Sends SIGKILL to the whole process group.
    #[cfg(unix)]
    fn kill_group(&mut self) -> io::Result<()> {
        let Some(pid) = self.pid else {
            return self.child.start_kill();
        };

        // SAFETY: kill(2) with a negative pid only signals the process group.
        let rc = unsafe { libc::kill(-(pid as libc::pid_t), libc::SIGKILL) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            // Group already gone.
            return Ok(());
        }
        self.child.start_kill().or(Err(err))
    }

    #[cfg(not(unix))]
    fn kill_group(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }
}

#[async_trait]
impl ProcessHandle for ChildProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn kill(&mut self) -> io::Result<()> {
        if self.reaped {
            return Ok(());
        }
        debug!(pid = ?self.pid, "Killing process group");
        self.kill_group()
    }

    async fn wait(&mut self) -> io::Result<Option<i32>> {
        let status = self.child.wait().await?;
        self.reaped = true;
        Ok(status.code())
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        if !self.reaped
            && let Err(e) = self.kill_group()
        {
            debug!(pid = ?self.pid, error = %e, "Failed to send kill signal in Drop");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
