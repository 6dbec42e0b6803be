//! The behavior seam.
//!
//! A behavior is a reusable unit implementing one or more lifecycle phases.
//! Variants are data — one trait, many small structs — rather than a class
//! hierarchy; a block holds `Vec<Box<dyn Behavior>>` and delegates each phase
//! in declaration order.
//!
//! Failure containment: a behavior returns `Result`; an error is logged,
//! recorded as a `BehaviorFailure`, and the remaining behaviors of the phase
//! still run. The workout keeps going.

use crate::action::Action;
use crate::context::BehaviorContext;
use core_state::BlockKey;
use std::fmt;

/// Lifecycle phase a block is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Mount,
    Next,
    Unmount,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Mount => "mount",
            Phase::Next => "next",
            Phase::Unmount => "unmount",
        };
        f.write_str(s)
    }
}

/// One behavior error, captured without aborting the phase.
#[derive(Debug)]
pub struct BehaviorFailure {
    pub block: BlockKey,
    pub behavior: &'static str,
    pub phase: Phase,
    pub error: anyhow::Error,
}

impl fmt::Display for BehaviorFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "behavior {} failed during {} of {}: {:#}",
            self.behavior, self.phase, self.block, self.error
        )
    }
}

/// A pluggable lifecycle unit. Default implementations make single-phase
/// behaviors one-method structs.
pub trait Behavior: Send {
    /// Stable name used in logs and failure records.
    fn name(&self) -> &'static str;

    fn on_mount(&mut self, _ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
        Ok(Vec::new())
    }

    fn on_next(&mut self, _ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
        Ok(Vec::new())
    }

    fn on_unmount(&mut self, _ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
        Ok(Vec::new())
    }
}
