//! Block identity.
//!
//! A `BlockKey` is assigned once at block construction and never reused
//! within a runtime. Its `Display` form is stable: it appears in logs, in
//! memory ownership, and as the `source_block_key` of every output
//! statement, so analytics can join across all three.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque unique block identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockKey(u64);

impl BlockKey {
    /// Key 0 is reserved for the runtime itself (global handlers, system
    /// bookkeeping). `KeySource` never hands it out.
    pub const RUNTIME: BlockKey = BlockKey(0);

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == BlockKey::RUNTIME {
            write!(f, "runtime")
        } else {
            write!(f, "blk-{}", self.0)
        }
    }
}

/// Per-runtime key allocator. Lives inside the runtime object; there is no
/// process-global counter.
#[derive(Debug)]
pub struct KeySource {
    next: u64,
}

impl Default for KeySource {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl KeySource {
    pub fn fresh(&mut self) -> BlockKey {
        let key = BlockKey(self.next);
        self.next += 1;
        key
    }
}
