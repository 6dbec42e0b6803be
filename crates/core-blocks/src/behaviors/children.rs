//! Child orchestration: the index cursor, lap reset, rest gating, and the
//! JIT push of the next child.
//!
//! Children are compiled lazily: the runner holds lap groups of statement
//! ids, not blocks, and requests a compile (`Action::PushStatements`) when a
//! child must go on the stack. Every round instance therefore gets a freshly
//! constructed child block with its own key.
//!
//! Declaration-order contract (enforced by the builder): `RoundAdvance` and
//! `RoundCompletion` run before the behaviors here; `ChildLoop` resets the
//! cursor at the lap boundary, `RestBlockGuard` skips rest groups, and
//! `ChildRunner` finally pushes — or, with no rounds driving it, marks the
//! container complete when the groups are exhausted.

use crate::action::Action;
use crate::behavior::Behavior;
use crate::compile_ctx::CompileContext;
use crate::context::{BehaviorContext, completion_of, mark_complete_in};
use core_clock::Millis;
use core_events::{HandlerId, HandlerScope, names};
use core_script::StatementId;
use core_state::{CompletionReason, EntryId, MemoryTag, MemoryValue, Visibility};

fn index_entry(ctx: &mut BehaviorContext<'_>) -> EntryId {
    match ctx.find(&MemoryTag::child_index()) {
        Some(id) => id,
        None => ctx.allocate(
            MemoryTag::child_index(),
            MemoryValue::Index(0),
            Visibility::Private,
        ),
    }
}

fn read_index(ctx: &BehaviorContext<'_>) -> Option<usize> {
    ctx.find(&MemoryTag::child_index())
        .and_then(|id| ctx.memory.get(id))
        .and_then(MemoryValue::as_index)
}

/// Resets the child cursor at the lap boundary so the next push starts the
/// lap over. Only present on repeating containers.
pub struct ChildLoop {
    groups: usize,
}

impl ChildLoop {
    pub fn new(groups: usize) -> Self {
        Self { groups }
    }
}

impl Behavior for ChildLoop {
    fn name(&self) -> &'static str {
        "ChildLoop"
    }

    fn on_next(&mut self, ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
        if self.groups == 0 {
            return Ok(Vec::new());
        }
        if read_index(ctx).is_some_and(|i| i >= self.groups) {
            let id = index_entry(ctx);
            ctx.memory.set(id, MemoryValue::Index(0))?;
        }
        Ok(Vec::new())
    }
}

/// Skips lap groups flagged as rest phases by advancing the cursor past
/// them before the runner looks.
pub struct RestBlockGuard {
    rest_groups: Vec<usize>,
    groups: usize,
}

impl RestBlockGuard {
    pub fn new(rest_groups: Vec<usize>, groups: usize) -> Self {
        Self { rest_groups, groups }
    }

    fn skip(&self, ctx: &mut BehaviorContext<'_>) -> anyhow::Result<()> {
        let id = index_entry(ctx);
        loop {
            let index = ctx.memory.get(id).and_then(MemoryValue::as_index).unwrap_or(0);
            if index >= self.groups || !self.rest_groups.contains(&index) {
                return Ok(());
            }
            ctx.memory.set(id, MemoryValue::Index(index + 1))?;
        }
    }
}

impl Behavior for RestBlockGuard {
    fn name(&self) -> &'static str {
        "RestBlockGuard"
    }

    fn on_mount(&mut self, ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
        self.skip(ctx)?;
        Ok(Vec::new())
    }

    fn on_next(&mut self, ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
        self.skip(ctx)?;
        Ok(Vec::new())
    }
}

/// Pushes children one lap group at a time; marks the container complete
/// when a non-repeating container runs out of groups. Empty containers
/// complete immediately on mount.
pub struct ChildRunner {
    groups: Vec<Vec<StatementId>>,
    /// Rounds (or an interval rollover) restart the lap; exhaustion is then
    /// the round machinery's call, not the runner's.
    repeating: bool,
    /// Rest phases the runner steps over instead of pushing. The guard
    /// handles trailing rest before the lap boundary check; this handles
    /// leading rest after a lap reset.
    rest_groups: Vec<usize>,
    rep_scheme: Vec<u32>,
    inherited: CompileContext,
}

impl ChildRunner {
    pub fn new(
        groups: Vec<Vec<StatementId>>,
        repeating: bool,
        rest_groups: Vec<usize>,
        rep_scheme: Vec<u32>,
        inherited: CompileContext,
    ) -> Self {
        Self {
            groups,
            repeating,
            rest_groups,
            rep_scheme,
            inherited,
        }
    }

    fn child_context(&self, ctx: &BehaviorContext<'_>, position: usize) -> CompileContext {
        let round = ctx
            .find(&MemoryTag::Round)
            .and_then(|id| ctx.memory.get(id))
            .and_then(|v| v.as_round().copied());
        let current = round.map(|r| r.current);
        let reps = current
            .and_then(|r| self.rep_scheme.get(r.saturating_sub(1) as usize).copied())
            .or(self.inherited.reps);
        CompileContext {
            round: current,
            total_rounds: round.map(|r| r.total),
            position,
            reps,
            interval_duration_ms: self.inherited.interval_duration_ms,
        }
    }

    fn push_next(&self, ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
        let id = index_entry(ctx);
        let mut index = ctx.memory.get(id).and_then(MemoryValue::as_index).unwrap_or(0);
        while index < self.groups.len() && self.rest_groups.contains(&index) {
            index += 1;
            ctx.memory.set(id, MemoryValue::Index(index))?;
        }
        if index >= self.groups.len() {
            if !self.repeating {
                ctx.mark_complete(CompletionReason::RoundsComplete);
            }
            return Ok(Vec::new());
        }
        let context = self.child_context(ctx, index);
        ctx.memory.set(id, MemoryValue::Index(index + 1))?;
        Ok(vec![Action::PushStatements {
            ids: self.groups[index].clone(),
            context,
        }])
    }
}

impl Behavior for ChildRunner {
    fn name(&self) -> &'static str {
        "ChildRunner"
    }

    fn on_mount(&mut self, ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
        index_entry(ctx);
        if self.groups.is_empty() {
            ctx.mark_complete(CompletionReason::RoundsComplete);
            return Ok(Vec::new());
        }
        self.push_next(ctx)
    }

    fn on_next(&mut self, ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
        if ctx.completion().is_complete {
            return Ok(Vec::new());
        }
        self.push_next(ctx)
    }
}

/// EMOM rollover: on every tick, compare the block's timer against the
/// current round boundary (`round × interval`). Crossing it advances the
/// round, resets the lap cursor, and either force-pops the running child or
/// (when the lap already finished early) nudges the block's own `next`.
pub struct IntervalRollover {
    interval_ms: Millis,
    handler: Option<HandlerId>,
}

impl IntervalRollover {
    pub fn new(interval_ms: Millis) -> Self {
        Self {
            interval_ms,
            handler: None,
        }
    }
}

impl Behavior for IntervalRollover {
    fn name(&self) -> &'static str {
        "IntervalRollover"
    }

    fn on_mount(&mut self, ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
        let key = ctx.key;
        let interval = self.interval_ms;
        let id = ctx.register_handler(names::TICK, HandlerScope::Global, move |_, args| {
            if completion_of(args.memory, key).is_complete {
                return Vec::new();
            }
            let elapsed = args
                .memory
                .find_one(key, &MemoryTag::Timer)
                .and_then(|id| args.memory.get(id))
                .and_then(|v| v.as_timer().map(|t| t.elapsed(args.now)));
            let Some(elapsed) = elapsed else {
                return Vec::new();
            };
            let Some(round_id) = args.memory.find_one(key, &MemoryTag::Round) else {
                return Vec::new();
            };
            let Some(round) = args.memory.get(round_id).and_then(|v| v.as_round().copied())
            else {
                return Vec::new();
            };
            if elapsed < u64::from(round.current) * interval {
                return Vec::new();
            }

            let mut exhausted = false;
            let _ = args.memory.update(round_id, |value| {
                if let Some(r) = value.as_round_mut() {
                    r.current += 1;
                    exhausted = r.is_exhausted();
                }
            });
            if let Some(index_id) = args.memory.find_one(key, &MemoryTag::child_index()) {
                let _ = args.memory.set(index_id, MemoryValue::Index(0));
            }

            let mut actions = vec![Action::Dispatch(
                core_events::Event::new(names::ROUNDS_ADVANCE, args.now)
                    .with_data(serde_json::json!({ "block": key.to_string() })),
            )];
            if exhausted {
                mark_complete_in(args.memory, key, CompletionReason::RoundsComplete);
            } else {
                if args.top != Some(key) {
                    // A child is still running its minute: cut it short.
                    actions.push(Action::Pop {
                        reason: CompletionReason::ForcedPop,
                    });
                }
                // Start the new round's first child once this block is top.
                actions.push(Action::Next);
            }
            actions
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
