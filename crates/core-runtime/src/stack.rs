//! The block stack.
//!
//! Plain LIFO with a depth bound. `push` and `pop` move blocks without any
//! lifecycle calls; the execution context mounts after push and disposes
//! after pop. Exceeding the bound is refused with the block handed back —
//! the stack is left untouched and the runtime treats it as fatal.

use core_blocks::RuntimeBlock;
use core_state::BlockKey;

pub const DEFAULT_MAX_DEPTH: usize = 10;

#[derive(Debug)]
pub struct BlockStack {
    blocks: Vec<RuntimeBlock>,
    max_depth: usize,
}

impl Default for BlockStack {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

impl BlockStack {
    pub fn new(max_depth: usize) -> Self {
        Self {
            blocks: Vec::new(),
            max_depth,
        }
    }

    /// Refuses at the bound, returning the block unconsumed.
    pub fn push(&mut self, block: RuntimeBlock) -> Result<(), RuntimeBlock> {
        if self.blocks.len() >= self.max_depth {
            return Err(block);
        }
        self.blocks.push(block);
        Ok(())
    }

    /// Removes the top without disposing it.
    pub fn pop(&mut self) -> Option<RuntimeBlock> {
        self.blocks.pop()
    }

    pub fn current(&self) -> Option<&RuntimeBlock> {
        self.blocks.last()
    }

    pub fn current_mut(&mut self) -> Option<&mut RuntimeBlock> {
        self.blocks.last_mut()
    }

    pub fn depth(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Keys bottom-up.
    pub fn keys(&self) -> Vec<BlockKey> {
        self.blocks.iter().map(RuntimeBlock::key).collect()
    }

    pub fn bottom_key(&self) -> Option<BlockKey> {
        self.blocks.first().map(RuntimeBlock::key)
    }
}
