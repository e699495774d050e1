//! Playground server binary.
//!
//! Usage:
//!   playground-server
//!   playground-server --addr 127.0.0.1:9000 --timeout-secs 30
//!   playground-server --debug
//!
//! Every flag also reads an environment variable (`PLAYGROUND_*`).

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use playground_server::protocol::DEFAULT_MAX_PAYLOAD;
use playground_server::server::{DEFAULT_ADDR, DEFAULT_PATH};
use playground_server::{Result, RunOptions, Server};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Cli
// ============================================================================

/// Live code playground over WebSocket.
#[derive(Parser, Debug)]
#[command(name = "playground-server", version, about)]
struct Cli {
    /// Address to listen on.
    #[arg(long, env = "PLAYGROUND_ADDR", default_value = DEFAULT_ADDR)]
    addr: String,

    /// Path that accepts WebSocket upgrades.
    #[arg(long, env = "PLAYGROUND_PATH", default_value = DEFAULT_PATH)]
    path: String,

    /// Toolchain executable, invoked as `<toolchain> run main.go`.
    #[arg(long, env = "PLAYGROUND_TOOLCHAIN", default_value = "go")]
    toolchain: PathBuf,

    /// Wall-clock limit per run, in seconds.
    #[arg(long, env = "PLAYGROUND_TIMEOUT_SECS", default_value_t = 120)]
    timeout_secs: u64,

    /// Largest accepted submission, in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_PAYLOAD)]
    max_message_size: u64,

    /// Enable debug logging (overridden by RUST_LOG).
    #[arg(long)]
    debug: bool,
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    if let Err(e) = run(cli).await {
        eprintln!("[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let options = RunOptions::new()
        .with_program(cli.toolchain)
        .with_timeout(Duration::from_secs(cli.timeout_secs));

    let server = Server::builder()
        .addr(cli.addr)
        .path(cli.path)
        .max_message_size(cli.max_message_size)
        .run_options(options)
        .build()?;

    let bound = server.bind().await?;
    println!("Server is running at {}", bound.ws_url());

    let handle = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.shutdown();
        }
    });

    bound.serve().await
}

/// Initialize tracing/logging.
fn init_logging(debug: bool) {
    let fallback = if debug {
        "playground_server=debug"
    } else {
        "playground_server=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .with_target(false)
        .init();
}
