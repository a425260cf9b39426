//! External process execution
//!
//! - [`ProcessRunner`] spawns one process per phase, forwards its output as it
//!   arrives and enforces the phase timeout
//! - [`ToolLocator`] finds the binaries

pub mod runner;
pub mod tools;

pub use runner::{
    Invocation, OutputChunk, OutputSink, OutputStream, PhaseRunner, ProcessOutcome,
    ProcessRunner, ProcessStatus, STDERR_TAIL_BYTES,
};
pub use tools::{Tool, ToolLocator};
