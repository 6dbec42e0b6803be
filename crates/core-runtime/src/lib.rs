//! Stack, execution context, and the `ScriptRuntime` façade.
//!
//! This crate wires the leaves together: compiled blocks run on a bounded
//! LIFO stack, a turn loop drains events and actions under a frozen clock
//! snapshot, and the façade exposes `start`/`stop`/`handle` plus the memory
//! and output subscriptions a UI consumes. External input (ticks, user
//! events) must be serialized into `handle` — one consumer, one turn at a
//! time; the binary puts a single-consumer channel in front.

mod error;
mod runtime;
mod stack;

pub use error::RuntimeError;
pub use runtime::{RuntimeLimits, ScriptRuntime};
pub use stack::BlockStack;
