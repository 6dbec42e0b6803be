//! What a behavior sees while running a phase.
//!
//! The context exposes the owning block's identity, the memory arena, the
//! event bus for handler registration, the frozen turn clock, and the stack
//! level for output attribution. Behaviors mutate their own block's memory
//! through it; everything cross-block goes out as returned actions.

use crate::action::Action;
use core_clock::Millis;
use core_events::{Event, EventBus, HandlerArgs, HandlerId, HandlerScope};
use core_output::{OutputStatement, OutputType};
use core_script::{Fragment, StatementId, TimeSpan};
use core_state::{
    BlockKey, CompletionReason, CompletionState, EntryId, MemoryArena, MemoryTag, MemoryValue,
    Visibility,
};

/// First-reason-wins completion marking. Shared by behaviors (through the
/// context), event handlers (through `HandlerArgs`), and the execution
/// context applying `MarkComplete` actions. Returns true when the state
/// transitioned on this call.
pub fn mark_complete_in(
    memory: &mut MemoryArena,
    key: BlockKey,
    reason: CompletionReason,
) -> bool {
    let Some(entry) = memory.find_one(key, &MemoryTag::Completion) else {
        tracing::warn!(target: "runtime.blocks", block = %key, "mark_complete without completion memory");
        return false;
    };
    let mut changed = false;
    let _ = memory.update(entry, |value| {
        if let MemoryValue::Completion(state) = value
            && !state.is_complete
        {
            *state = CompletionState::complete(reason);
            changed = true;
        }
    });
    if changed {
        tracing::debug!(target: "runtime.blocks", block = %key, %reason, "complete");
    }
    changed
}

/// Read a block's completion state; default (incomplete) when the entry is
/// missing or already released.
pub fn completion_of(memory: &MemoryArena, key: BlockKey) -> CompletionState {
    memory
        .find_one(key, &MemoryTag::Completion)
        .and_then(|id| memory.get(id))
        .and_then(|v| v.as_completion().copied())
        .unwrap_or_default()
}

pub struct BehaviorContext<'a> {
    pub key: BlockKey,
    pub label: &'a str,
    pub source_ids: &'a [StatementId],
    pub memory: &'a mut MemoryArena,
    pub bus: &'a mut EventBus<Action>,
    pub now: Millis,
    pub stack_level: usize,
}

impl BehaviorContext<'_> {
    /// First entry of this block with `tag`.
    pub fn find(&self, tag: &MemoryTag) -> Option<EntryId> {
        self.memory.find_one(self.key, tag)
    }

    pub fn allocate(
        &mut self,
        tag: MemoryTag,
        value: MemoryValue,
        visibility: Visibility,
    ) -> EntryId {
        self.memory.allocate(self.key, tag, value, visibility)
    }

    pub fn mark_complete(&mut self, reason: CompletionReason) -> bool {
        mark_complete_in(self.memory, self.key, reason)
    }

    pub fn completion(&self) -> CompletionState {
        completion_of(self.memory, self.key)
    }

    /// Register an event handler owned by this block and mirror it into a
    /// `handler` memory entry so its lifetime is coupled to dispose.
    pub fn register_handler(
        &mut self,
        event: &str,
        scope: HandlerScope,
        callback: impl FnMut(&Event, &mut HandlerArgs<'_>) -> Vec<Action> + Send + 'static,
    ) -> HandlerId {
        let id = self.bus.register(event, self.key, scope, callback);
        self.memory.allocate(
            self.key,
            MemoryTag::Handler,
            MemoryValue::Handler(id.raw()),
            Visibility::Private,
        );
        id
    }

    /// Build an attributed output statement.
    ///
    /// Attribution rules: the emitting block stamps `source_block_key`,
    /// `source_statement_id`, and `stack_level`; pause-aware spans are copied
    /// from `timer` memory when present; an empty fragment list is
    /// auto-populated from `fragment:display`; every fragment is tagged with
    /// the block key and the turn clock.
    pub fn emit_output(
        &self,
        output_type: OutputType,
        fragments: Vec<Fragment>,
        completion_reason: Option<CompletionReason>,
    ) -> OutputStatement {
        let key = self.key.to_string();
        let fragments = if fragments.is_empty() {
            self.display_fragments()
        } else {
            fragments
        };
        let fragments: Vec<Fragment> = fragments
            .into_iter()
            .map(|f| f.attributed(&key, self.now))
            .collect();

        let spans = self
            .find(&MemoryTag::Timer)
            .and_then(|id| self.memory.get(id))
            .and_then(|v| v.as_timer())
            .map(|t| t.spans.clone())
            .unwrap_or_default();
        let time_span = match spans.first() {
            Some(first) => TimeSpan::closed(first.started, self.now),
            None => TimeSpan::instant(self.now),
        };

        OutputStatement {
            id: 0,
            output_type,
            time_span,
            spans,
            source_block_key: key,
            source_statement_id: self.source_ids.first().copied(),
            stack_level: self.stack_level,
            fragments,
            completion_reason,
        }
    }

    fn display_fragments(&self) -> Vec<Fragment> {
        self.find(&MemoryTag::FragmentDisplay)
            .and_then(|id| self.memory.get(id))
            .and_then(|v| v.as_fragments().map(<[Fragment]>::to_vec))
            .unwrap_or_default()
    }

    /// Fragments accumulated under `fragment:tracked`.
    pub fn tracked_fragments(&self) -> Vec<Fragment> {
        self.find(&MemoryTag::FragmentTracked)
            .and_then(|id| self.memory.get(id))
            .and_then(|v| v.as_fragments().map(<[Fragment]>::to_vec))
            .unwrap_or_default()
    }

    /// Append to `fragment:tracked` (notifying subscribers).
    pub fn track_fragment(&mut self, fragment: Fragment) {
        if let Some(id) = self.find(&MemoryTag::FragmentTracked) {
            let _ = self.memory.update(id, |value| {
                if let Some(list) = value.as_fragments_mut() {
                    list.push(fragment);
                }
            });
        }
    }
}
