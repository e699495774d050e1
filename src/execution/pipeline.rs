//! Execution pipeline.
//!
//! One [`Runner::run`] call is one run: create a workspace, write the source,
//! start the toolchain, stream tokenized output to an [`EventSink`], and
//! enforce the wall-clock deadline.
//!
//! # Run Lifecycle
//!
//! 1. Workspace created, source written
//! 2. Toolchain started with cache directories inside the workspace
//! 3. Output drained and tokenized, racing the deadline
//! 4. On deadline: process group killed, remaining output drained
//! 5. Process reaped, workspace removed
//! 6. On deadline: one terminal `error` event
//!
//! Every failure is reported to the sink as an `error` event; nothing here
//! ends the caller's connection.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep_until, timeout, timeout_at};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::RunId;
use crate::protocol::OutboundEvent;
use crate::transport::EventSink;

use super::options::RunOptions;
use super::tokenizer::OutputTokenizer;
use super::toolchain::{CommandToolchain, Invocation, Launched, OutputStream, ProcessHandle, Toolchain};
use super::workspace::Workspace;

// ============================================================================
// RunOutcome
// ============================================================================

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Program exited on its own.
    Exited {
        /// Exit code, `None` if killed by a signal or not reaped.
        code: Option<i32>,
    },
    /// Program was killed at the deadline.
    TimedOut,
    /// Run could not start; the message was sent to the client.
    Failed {
        /// Error text sent to the client.
        message: String,
    },
}

// ============================================================================
// Runner
// ============================================================================

/// Executes submissions. Cheap to clone; clones share the toolchain.
#[derive(Clone)]
pub struct Runner {
    /// Program launcher.
    toolchain: Arc<dyn Toolchain>,
    /// Limits and layout.
    options: Arc<RunOptions>,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Runner {
    /// Creates a runner with an explicit toolchain.
    #[must_use]
    pub fn new(toolchain: Arc<dyn Toolchain>, options: RunOptions) -> Self {
        Self {
            toolchain,
            options: Arc::new(options),
        }
    }

    /// Creates a runner that launches `options.program` as a child process.
    #[must_use]
    pub fn with_command_toolchain(options: RunOptions) -> Self {
        let toolchain = Arc::new(CommandToolchain::from_options(&options));
        Self::new(toolchain, options)
    }

    /// Returns the run options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Runs one submission to completion, streaming events to `sink`.
    pub async fn run(&self, source: &str, sink: &dyn EventSink) -> RunOutcome {
        let run_id = RunId::next();
        let started = Instant::now();
        debug!(%run_id, bytes = source.len(), "Run started");

        let outcome = match self.execute(run_id, source, sink).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(%run_id, error = %e, "Run failed");
                sink.emit(OutboundEvent::from_error(&e)).await;
                RunOutcome::Failed {
                    message: e.to_string(),
                }
            }
        };

        info!(
            %run_id,
            ?outcome,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Run finished"
        );
        outcome
    }

    /// Body of [`Runner::run`]; errors are reported by the caller.
    async fn execute(&self, run_id: RunId, source: &str, sink: &dyn EventSink) -> Result<RunOutcome> {
        let options = &*self.options;
        let deadline = Instant::now() + options.timeout;

        let workspace = Workspace::create(&options.workspace_prefix)?;
        let source_path = workspace.write_source(&options.source_file, source)?;

        let invocation = Invocation {
            source: source_path,
            workdir: workspace.path().to_path_buf(),
            env: workspace.env_dirs(&options.env_dirs),
        };

        let Launched {
            mut output,
            mut process,
        } = self.toolchain.start(invocation).await?;
        debug!(%run_id, pid = ?process.pid(), "Program started");

        let mut tokenizer = OutputTokenizer::new(options.flush_threshold);
        let drain = drain_output(&mut output, &mut tokenizer, sink);
        tokio::pin!(drain);

        let mut timed_out = tokio::select! {
            () = &mut drain => false,
            () = sleep_until(deadline) => true,
        };

        let code = if timed_out {
            warn!(%run_id, timeout_ms = options.timeout.as_millis() as u64, "Execution timeout, killing program");
            kill(run_id, process.as_mut());
            if timeout(options.kill_grace, &mut drain).await.is_err() {
                warn!(%run_id, "Output still open after kill, abandoning it");
            }
            reap(run_id, process.as_mut(), options.kill_grace).await
        } else {
            // Output closed; the program may still be running until the deadline.
            match timeout_at(deadline, process.wait()).await {
                Ok(Ok(code)) => code,
                Ok(Err(e)) => {
                    warn!(%run_id, error = %e, "Failed to wait for program");
                    None
                }
                Err(_) => {
                    timed_out = true;
                    warn!(%run_id, "Program outlived its output past the deadline, killing it");
                    kill(run_id, process.as_mut());
                    reap(run_id, process.as_mut(), options.kill_grace).await
                }
            }
        };

        workspace.close();

        if timed_out {
            sink.emit(OutboundEvent::from_error(&Error::execution_timeout(options.timeout)))
                .await;
            return Ok(RunOutcome::TimedOut);
        }

        Ok(RunOutcome::Exited { code })
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Forwards tokenized output to `sink` until the stream ends.
async fn drain_output(
    output: &mut OutputStream,
    tokenizer: &mut OutputTokenizer,
    sink: &dyn EventSink,
) {
    while let Some(chunk) = output.next_chunk().await {
        for event in tokenizer.feed(&chunk) {
            sink.emit(event).await;
        }
    }

    for event in tokenizer.finish() {
        sink.emit(event).await;
    }
}

/// Forcibly terminates the program, logging failure.
fn kill(run_id: RunId, process: &mut dyn ProcessHandle) {
    if let Err(e) = process.kill() {
        warn!(%run_id, error = %e, "Failed to kill program");
    }
}

/// Waits up to `grace` for the killed program to be reaped.
async fn reap(run_id: RunId, process: &mut dyn ProcessHandle, grace: Duration) -> Option<i32> {
    match timeout(grace, process.wait()).await {
        Ok(Ok(code)) => code,
        Ok(Err(e)) => {
            warn!(%run_id, error = %e, "Failed to wait for killed program");
            None
        }
        Err(_) => {
            warn!(%run_id, "Killed program was not reaped in time");
            None
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testutil::{FakeToolchain, RecordingSink};

    fn runner(toolchain: Arc<FakeToolchain>, options: RunOptions) -> Runner {
        Runner::new(toolchain, options)
    }

    #[tokio::test]
    async fn test_streams_tokenized_output() {
        let toolchain = Arc::new(FakeToolchain::exiting(vec![b"abc\x0cdef\n".to_vec()], 0));
        let sink = RecordingSink::new();

        let outcome = runner(Arc::clone(&toolchain), RunOptions::new())
            .run("package main", &sink)
            .await;

        assert_eq!(outcome, RunOutcome::Exited { code: Some(0) });
        assert_eq!(
            sink.events(),
            vec![
                OutboundEvent::output("abc"),
                OutboundEvent::Clear,
                OutboundEvent::output("def\n"),
            ]
        );
    }

    #[tokio::test]
    async fn test_source_and_env_placed_in_workspace() {
        let toolchain = Arc::new(FakeToolchain::exiting(Vec::new(), 0));
        let sink = RecordingSink::new();

        runner(Arc::clone(&toolchain), RunOptions::new())
            .run("package main\n", &sink)
            .await;

        let started = toolchain.started();
        assert_eq!(started.len(), 1);
        let (invocation, source) = &started[0];

        assert_eq!(source, "package main\n");
        assert!(invocation.source.ends_with("main.go"));
        assert!(invocation.source.starts_with(&invocation.workdir));
        for var in ["GOCACHE", "GOPATH"] {
            let (_, dir) = invocation
                .env
                .iter()
                .find(|(name, _)| name == var)
                .expect("cache variable should be set");
            assert!(dir.starts_with(&invocation.workdir));
        }

        assert!(!invocation.workdir.exists(), "workspace should be removed");
    }

    #[tokio::test]
    async fn test_workspace_prefix_names_directory() {
        let toolchain = Arc::new(FakeToolchain::exiting(Vec::new(), 0));
        let sink = RecordingSink::new();
        let options = RunOptions::new().with_workspace_prefix("sandbox-run-");

        runner(Arc::clone(&toolchain), options).run("x", &sink).await;

        let (invocation, _) = &toolchain.started()[0];
        let name = invocation
            .workdir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap();
        assert!(name.starts_with("sandbox-run-"), "unexpected workspace {name}");
    }

    #[tokio::test]
    async fn test_timeout_kills_and_reports_once() {
        let toolchain = Arc::new(FakeToolchain::hanging(vec![b"tick\n".to_vec()]));
        let sink = RecordingSink::new();
        let options = RunOptions::new()
            .with_timeout(Duration::from_millis(200))
            .with_kill_grace(Duration::from_secs(1));

        let outcome = runner(Arc::clone(&toolchain), options).run("loop", &sink).await;

        assert_eq!(outcome, RunOutcome::TimedOut);
        assert!(toolchain.was_killed());

        let events = sink.events();
        assert_eq!(events.first(), Some(&OutboundEvent::output("tick\n")));
        assert_eq!(
            events.last(),
            Some(&OutboundEvent::error("Execution timeout, terminated"))
        );
        let errors = events
            .iter()
            .filter(|e| matches!(e, OutboundEvent::Error { .. }))
            .count();
        assert_eq!(errors, 1);

        let (invocation, _) = &toolchain.started()[0];
        assert!(!invocation.workdir.exists(), "workspace should be removed");
    }

    #[tokio::test]
    async fn test_launch_failure_reported_as_error_event() {
        let toolchain = Arc::new(FakeToolchain::failing());
        let sink = RecordingSink::new();

        let outcome = runner(toolchain, RunOptions::new()).run("x", &sink).await;

        assert!(matches!(outcome, RunOutcome::Failed { .. }));
        let events = sink.events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            OutboundEvent::Error { data } => assert!(data.starts_with("Failed to start command")),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_source_file_reported_as_write_error() {
        let toolchain = Arc::new(FakeToolchain::exiting(Vec::new(), 0));
        let sink = RecordingSink::new();
        let options = RunOptions::new().with_source_file("no-such-dir/main.go");

        let outcome = runner(Arc::clone(&toolchain), options).run("x", &sink).await;

        assert!(matches!(outcome, RunOutcome::Failed { .. }));
        assert!(toolchain.started().is_empty());
        assert!(matches!(
            sink.events().as_slice(),
            [OutboundEvent::Error { data }] if data.starts_with("Failed to write temporary file")
        ));
    }

    #[tokio::test]
    async fn test_long_line_flushed_by_threshold() {
        let toolchain = Arc::new(FakeToolchain::exiting(vec![vec![b'z'; 2000]], 0));
        let sink = RecordingSink::new();

        runner(toolchain, RunOptions::new()).run("x", &sink).await;

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], OutboundEvent::output("z".repeat(1024)));
        assert_eq!(events[1], OutboundEvent::output("z".repeat(976)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_toolchain_end_to_end() {
        let options = RunOptions::new()
            .with_program("sh")
            .with_args(Vec::<String>::new())
            .with_source_file("main.sh");
        let sink = RecordingSink::new();

        let outcome = Runner::with_command_toolchain(options)
            .run("printf 'abc\\fdef\\n'\nexit 3\n", &sink)
            .await;

        assert_eq!(outcome, RunOutcome::Exited { code: Some(3) });
        assert_eq!(
            sink.events(),
            vec![
                OutboundEvent::output("abc"),
                OutboundEvent::Clear,
                OutboundEvent::output("def\n"),
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_toolchain_timeout() {
        let options = RunOptions::new()
            .with_program("sh")
            .with_args(Vec::<String>::new())
            .with_source_file("main.sh")
            .with_timeout(Duration::from_millis(300));
        let sink = RecordingSink::new();

        let outcome = Runner::with_command_toolchain(options)
            .run("echo start\nsleep 30 &\nsleep 30\n", &sink)
            .await;

        assert_eq!(outcome, RunOutcome::TimedOut);
        assert_eq!(
            sink.events(),
            vec![
                OutboundEvent::output("start\n"),
                OutboundEvent::error("Execution timeout, terminated"),
            ]
        );
    }
}
