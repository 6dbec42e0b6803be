//! Timer behaviors: span bookkeeping, pause/resume, expiry, and the
//! canonical elapsed computation.
//!
//! Elapsed is computed in exactly one place per completion — `TimerOutput`
//! writes it into `fragment:tracked` on unmount. Everything else (the
//! completion output, analytics) reads the tracked fragment instead of
//! recomputing, so pause arithmetic cannot drift between emitters.

use crate::action::Action;
use crate::behavior::Behavior;
use crate::context::{BehaviorContext, completion_of, mark_complete_in};
use core_clock::Millis;
use core_events::{Event, HandlerArgs, HandlerId, HandlerScope, names};
use core_script::{Fragment, FragmentKind, TimerDirection};
use core_state::{
    BlockKey, CompletionReason, MemoryArena, MemoryTag, MemoryValue, TimerRole, TimerState,
    Visibility,
};

fn touch_timer(memory: &mut MemoryArena, key: BlockKey, mutate: impl FnOnce(&mut TimerState)) {
    if let Some(id) = memory.find_one(key, &MemoryTag::Timer) {
        let _ = memory.update(id, |value| {
            if let Some(timer) = value.as_timer_mut() {
                mutate(timer);
            }
        });
    }
}

fn read_timer(memory: &MemoryArena, key: BlockKey) -> Option<TimerState> {
    memory
        .find_one(key, &MemoryTag::Timer)
        .and_then(|id| memory.get(id))
        .and_then(|v| v.as_timer().cloned())
}

/// Allocates the `timer` entry and opens the initial span on mount; closes
/// the open span on unmount. Announces `timer:started`.
pub struct TimerInit {
    direction: TimerDirection,
    duration_ms: Option<Millis>,
    role: TimerRole,
}

impl TimerInit {
    pub fn new(direction: TimerDirection, duration_ms: Option<Millis>, role: TimerRole) -> Self {
        Self {
            direction,
            duration_ms,
            role,
        }
    }
}

impl Behavior for TimerInit {
    fn name(&self) -> &'static str {
        "TimerInit"
    }

    fn on_mount(&mut self, ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
        let mut state = TimerState::new(self.direction, self.duration_ms, ctx.label);
        state.role = self.role;
        state.open_span(ctx.now);
        ctx.allocate(MemoryTag::Timer, MemoryValue::Timer(state), Visibility::Public);
        let started = Event::new(names::TIMER_STARTED, ctx.now)
            .with_data(serde_json::json!({ "block": ctx.key.to_string() }));
        Ok(vec![Action::Dispatch(started)])
    }

    fn on_unmount(&mut self, ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
        let key = ctx.key;
        let now = ctx.now;
        touch_timer(ctx.memory, key, |timer| {
            timer.close_open_span(now);
        });
        Ok(Vec::new())
    }
}

/// Re-reads the `timer` entry on every tick so display subscribers observe
/// elapsed time advance. Emits nothing itself.
#[derive(Default)]
pub struct TimerTick {
    handler: Option<HandlerId>,
}

impl Behavior for TimerTick {
    fn name(&self) -> &'static str {
        "TimerTick"
    }

    fn on_mount(&mut self, ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
        let key = ctx.key;
        let id = ctx.register_handler(names::TICK, HandlerScope::Global, move |_, args| {
            // An empty update is still a write: subscribers re-derive
            // elapsed against the event clock.
            touch_timer(args.memory, key, |_| {});
            Vec::new()
        });
        self.handler = Some(id);
        Ok(Vec::new())
    }

    fn on_unmount(&mut self, ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
        if let Some(id) = self.handler.take() {
            ctx.bus.unregister(id);
        }
        Ok(Vec::new())
    }
}

/// Closes the open span on `timer:pause`, opens a new one on
/// `timer:resume`. Both directions are idempotent (double-pause leaves one
/// closed span). Resume after completion is ignored.
#[derive(Default)]
pub struct TimerPause {
    handlers: Vec<HandlerId>,
}

impl Behavior for TimerPause {
    fn name(&self) -> &'static str {
        "TimerPause"
    }

    fn on_mount(&mut self, ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
        let key = ctx.key;
        let pause = ctx.register_handler(
            names::TIMER_PAUSE,
            HandlerScope::Global,
            move |_, args: &mut HandlerArgs<'_>| {
                let now = args.now;
                touch_timer(args.memory, key, |timer| {
                    timer.close_open_span(now);
                });
                Vec::new()
            },
        );
        let resume = ctx.register_handler(
            names::TIMER_RESUME,
            HandlerScope::Global,
            move |_, args: &mut HandlerArgs<'_>| {
                if completion_of(args.memory, key).is_complete {
                    return Vec::new();
                }
                let now = args.now;
                touch_timer(args.memory, key, |timer| {
                    timer.open_span(now);
                });
                Vec::new()
            },
        );
        self.handlers = vec![pause, resume];
        Ok(Vec::new())
    }

    fn on_unmount(&mut self, ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
        let key = ctx.key;
        let now = ctx.now;
        touch_timer(ctx.memory, key, |timer| {
            timer.close_open_span(now);
        });
        for id in self.handlers.drain(..) {
            ctx.bus.unregister(id);
        }
        Ok(Vec::new())
    }
}

fn expiry_check(memory: &mut MemoryArena, key: BlockKey, now: Millis) -> Vec<Action> {
    if completion_of(memory, key).is_complete {
        return Vec::new();
    }
    let expired = read_timer(memory, key).is_some_and(|t| t.is_expired(now));
    if expired && mark_complete_in(memory, key, CompletionReason::TimerExpired) {
        let event = Event::new(names::TIMER_COMPLETE, now)
            .with_data(serde_json::json!({ "block": key.to_string() }));
        return vec![Action::Dispatch(event)];
    }
    Vec::new()
}

/// Marks the block complete with `timer-expired` once elapsed reaches the
/// bound, dispatching `timer:complete` exactly once. The mount-time check
/// makes a zero-duration timer complete within its mount turn.
#[derive(Default)]
pub struct TimerCompletion {
    handler: Option<HandlerId>,
}

impl Behavior for TimerCompletion {
    fn name(&self) -> &'static str {
        "TimerCompletion"
    }

    fn on_mount(&mut self, ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
        let key = ctx.key;
        let id = ctx.register_handler(names::TICK, HandlerScope::Global, move |_, args| {
            expiry_check(args.memory, key, args.now)
        });
        self.handler = Some(id);
        Ok(expiry_check(ctx.memory, key, ctx.now))
    }

    fn on_unmount(&mut self, ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
        if let Some(id) = self.handler.take() {
            ctx.bus.unregister(id);
        }
        Ok(Vec::new())
    }
}

/// The canonical elapsed/total computation, written once into
/// `fragment:tracked` on unmount for the completion output to consume.
#[derive(Default)]
pub struct TimerOutput;

impl Behavior for TimerOutput {
    fn name(&self) -> &'static str {
        "TimerOutput"
    }

    fn on_unmount(&mut self, ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
        if let Some(timer) = read_timer(ctx.memory, ctx.key) {
            let elapsed = timer.elapsed(ctx.now);
            let total = timer.total(ctx.now);
            ctx.track_fragment(Fragment::runtime(FragmentKind::Elapsed { ms: elapsed }));
            ctx.track_fragment(Fragment::runtime(FragmentKind::Total { ms: total }));
        }
        Ok(Vec::new())
    }
}
