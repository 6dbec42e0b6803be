//! Completion triggers driven by the user or external events.

use crate::action::Action;
use crate::behavior::Behavior;
use crate::context::{BehaviorContext, mark_complete_in};
use core_events::{HandlerId, HandlerScope};
use core_state::CompletionReason;

/// Terminal blocks advance on `next`: mark `user-advance` and let the
/// context pop after the drain.
#[derive(Default)]
pub struct PopOnNext;

impl Behavior for PopOnNext {
    fn name(&self) -> &'static str {
        "PopOnNext"
    }

    fn on_next(&mut self, ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
        ctx.mark_complete(CompletionReason::UserAdvance);
        Ok(Vec::new())
    }
}

/// Marks `external` completion when any of the configured events fires
/// while this block is on top.
pub struct PopOnEvent {
    events: Vec<String>,
    handlers: Vec<HandlerId>,
}

impl PopOnEvent {
    pub fn new(events: Vec<String>) -> Self {
        Self {
            events,
            handlers: Vec::new(),
        }
    }
}

impl Behavior for PopOnEvent {
    fn name(&self) -> &'static str {
        "PopOnEvent"
    }

    fn on_mount(&mut self, ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
        let key = ctx.key;
        for event in &self.events {
            let id = ctx.register_handler(event, HandlerScope::Active, move |_, args| {
                mark_complete_in(args.memory, key, CompletionReason::External);
                Vec::new()
            });
            self.handlers.push(id);
        }
        Ok(Vec::new())
    }

    fn on_unmount(&mut self, ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
        for id in self.handlers.drain(..) {
            ctx.bus.unregister(id);
        }
        Ok(Vec::new())
    }
}
