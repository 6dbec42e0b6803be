//! The runtime error taxonomy.
//!
//! Errors are recoverable by default: they are appended to the runtime's
//! ledger and execution continues. Only invariant violations (stack
//! overflow) are fatal and halt the runtime. Nothing here ever crosses the
//! public façade as a panic.

use core_blocks::BehaviorFailure;
use core_compiler::CompileError;
use core_state::MemoryError;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// A behavior failed during a lifecycle phase; the phase continued.
    #[error("{0}")]
    Behavior(BehaviorFailure),

    /// A statement group had no strategy or failed to build; it was dropped.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// A turn drained more actions than allowed and was aborted. Stack and
    /// memory are preserved.
    #[error("turn {turn} aborted after {limit} actions")]
    MaxIterations { turn: u64, limit: usize },

    /// Fatal: a push would exceed the stack bound.
    #[error("stack overflow: refusing {block} at depth {depth}")]
    StackOverflow { block: String, depth: usize },

    #[error("memory: {0}")]
    Memory(#[from] MemoryError),
}

impl RuntimeError {
    /// Fatal errors halt the runtime after being recorded.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RuntimeError::StackOverflow { .. })
    }
}
