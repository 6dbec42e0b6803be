//! Events and the scoped handler registry.
//!
//! Everything that reaches the runtime from outside a turn — ticks, user
//! advances, pause/resume, stop — arrives as an `Event`. Handlers are
//! registered per event name with an owner key and a scope; dispatch invokes
//! matching handlers in registration order and concatenates the actions they
//! return. Handlers never call each other and never reach the bus: reentrancy
//! is safe because returned actions are executed later by the turn loop's
//! FIFO drain.
//!
//! The bus is generic over the action type so this crate stays below the
//! block layer; the runtime instantiates `EventBus<Action>`.

use core_clock::Millis;
use core_state::{BlockKey, MemoryArena};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Standard event names. Unknown names pass through dispatch unchanged;
/// handlers decide relevance.
pub mod names {
    pub const TICK: &str = "tick";
    pub const NEXT: &str = "next";
    pub const START: &str = "start";
    pub const STOP: &str = "stop";
    pub const PAUSE: &str = "pause";
    pub const RESUME: &str = "resume";
    pub const TIMER_STARTED: &str = "timer:started";
    pub const TIMER_COMPLETE: &str = "timer:complete";
    pub const TIMER_PAUSE: &str = "timer:pause";
    pub const TIMER_RESUME: &str = "timer:resume";
    pub const ROUNDS_ADVANCE: &str = "rounds:advance";
    pub const HISTORY_RECORD: &str = "history:record";
}

/// A named occurrence with the timestamp its producer observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub timestamp: Millis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Event {
    pub fn new(name: &str, timestamp: Millis) -> Self {
        Self {
            name: name.to_string(),
            timestamp,
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.timestamp)
    }
}

/// When a handler fires relative to the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerScope {
    /// Only while the owner is the current top of stack.
    Active,
    /// Always.
    Global,
}

/// Handle for explicit unregistration. Handlers are otherwise removed in
/// bulk by `unregister_owner` during block dispose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

impl HandlerId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// What a handler may touch while deciding: the memory arena, the frozen
/// turn clock, and the stack surface. Mutation of other blocks' memory stays
/// off-limits by convention — a handler mutates its owner's entries and
/// returns actions for everything else.
pub struct HandlerArgs<'a> {
    pub memory: &'a mut MemoryArena,
    pub now: Millis,
    pub top: Option<BlockKey>,
    pub depth: usize,
}

type HandlerFn<A> = Box<dyn FnMut(&Event, &mut HandlerArgs<'_>) -> Vec<A> + Send>;

struct HandlerEntry<A> {
    id: HandlerId,
    event: String,
    owner: BlockKey,
    scope: HandlerScope,
    callback: HandlerFn<A>,
}

/// Registration-ordered event → handler registry.
pub struct EventBus<A> {
    handlers: Vec<HandlerEntry<A>>,
    next_id: u64,
}

impl<A> Default for EventBus<A> {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
            next_id: 0,
        }
    }
}

impl<A> fmt::Debug for EventBus<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handlers.len())
            .finish_non_exhaustive()
    }
}

impl<A> EventBus<A> {
    pub fn register(
        &mut self,
        event: &str,
        owner: BlockKey,
        scope: HandlerScope,
        callback: impl FnMut(&Event, &mut HandlerArgs<'_>) -> Vec<A> + Send + 'static,
    ) -> HandlerId {
        self.next_id += 1;
        let id = HandlerId(self.next_id);
        tracing::trace!(target: "events", event, owner = %owner, ?scope, "register handler");
        self.handlers.push(HandlerEntry {
            id,
            event: event.to_string(),
            owner,
            scope,
            callback: Box::new(callback),
        });
        id
    }

    pub fn unregister(&mut self, id: HandlerId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|h| h.id != id);
        self.handlers.len() != before
    }

    /// Drop every handler owned by `owner`. Called from block dispose.
    pub fn unregister_owner(&mut self, owner: BlockKey) -> usize {
        let before = self.handlers.len();
        self.handlers.retain(|h| h.owner != owner);
        before - self.handlers.len()
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Invoke matching handlers in registration order, concatenating their
    /// actions. `active`-scoped handlers fire only when their owner is the
    /// current top of stack.
    pub fn dispatch(&mut self, event: &Event, args: &mut HandlerArgs<'_>) -> Vec<A> {
        let mut actions = Vec::new();
        for handler in &mut self.handlers {
            if handler.event != event.name {
                continue;
            }
            if handler.scope == HandlerScope::Active && args.top != Some(handler.owner) {
                continue;
            }
            actions.extend((handler.callback)(event, args));
        }
        tracing::trace!(
            target: "events",
            event = %event,
            actions = actions.len(),
            "dispatch"
        );
        actions
    }
}
