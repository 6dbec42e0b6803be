//! Compilation context inherited parent → child.
//!
//! A parent block passes this down when it requests a child compile, so a
//! rep scheme declared on the rounds line (`(21-15-9)`) reaches the effort
//! lines without the parser duplicating fragments.

use core_clock::Millis;
use core_state::RoundTotal;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompileContext {
    /// Round the child is being compiled for (1-based).
    pub round: Option<u32>,
    pub total_rounds: Option<RoundTotal>,
    /// Position of the child within its parent's lap groups.
    pub position: usize,
    /// Inherited rep count for children without a local Rep fragment.
    pub reps: Option<u32>,
    /// Interval length when compiling under an EMOM block.
    pub interval_duration_ms: Option<Millis>,
}
