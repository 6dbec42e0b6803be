//! Blocks, behaviors, and actions: the executable units of a workout.
//!
//! A compiled workout is a tree of `RuntimeBlock`s executed on a stack. Each
//! block owns an ordered list of `Behavior`s that run its lifecycle phases
//! and an arena of tagged memory entries keyed to its `BlockKey`. Behaviors
//! communicate exclusively through memory writes and returned `Action`s;
//! the execution context (in `core-runtime`) drains those actions FIFO
//! within a turn.

mod action;
mod behavior;
pub mod behaviors;
mod block;
mod builder;
mod compile_ctx;
mod context;

pub use action::Action;
pub use behavior::{Behavior, BehaviorFailure, Phase};
pub use block::{BlockEnv, BlockKind, RuntimeBlock};
pub use builder::{BlockBuilder, BuildError, ContainerSpec, RepeaterSpec, TimerSpec};
pub use compile_ctx::CompileContext;
pub use context::{BehaviorContext, completion_of, mark_complete_in};
