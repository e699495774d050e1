//! Program execution.
//!
//! Everything between "a client sent source text" and "the program's output
//! has been streamed back": isolated workspaces, toolchain launch, output
//! tokenization and deadline enforcement.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `options` | Run limits, toolchain command and workspace layout |
//! | `pipeline` | One run from workspace creation to cleanup |
//! | `tokenizer` | Output to `output`/`clear` events |
//! | `toolchain` | Process launch and group kill |
//! | `workspace` | Per-run temporary directory |

// ============================================================================
// Submodules
// ============================================================================

/// Run options.
pub mod options;

/// Execution pipeline.
pub mod pipeline;

/// Output tokenization.
pub mod tokenizer;

/// Toolchain invocation.
pub mod toolchain;

/// Per-run workspace.
pub mod workspace;

// ============================================================================
// Re-exports
// ============================================================================

pub use options::RunOptions;
pub use pipeline::{RunOutcome, Runner};
pub use tokenizer::OutputTokenizer;
pub use toolchain::{
    CommandToolchain, Invocation, Launched, OutputSender, OutputStream, ProcessHandle, Toolchain,
};
pub use workspace::Workspace;
