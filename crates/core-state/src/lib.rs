//! Block identity, typed values, and the reactive memory arena.
//!
//! All mutable runtime state lives here as block-owned, tagged memory
//! entries. Blocks hold entry ids, never owning pointers, so the
//! block ↔ behavior ↔ memory ↔ subscription web stays acyclic; dispose walks
//! the owner's entries, notifies, and deallocates.

mod key;
mod memory;
mod tag;
mod values;

pub use key::{BlockKey, KeySource};
pub use memory::{
    EntryId, MemoryArena, MemoryCriteria, MemoryEntry, MemoryError, SubscriberId, Visibility,
};
pub use tag::MemoryTag;
pub use values::{
    CompletionReason, CompletionState, ControlButton, DisplayState, MemoryValue, RoundState,
    RoundTotal, TimerRole, TimerState,
};
