//! Round behaviors: the counter, lap-boundary advancement, completion, and
//! milestone/summary emission.
//!
//! The `next` phase of a rounds container runs once per child completion.
//! `RoundAdvance` only advances the counter when the child index has walked
//! past the last lap group (a full lap finished); `RoundCompletion` then
//! checks exhaustion before the child runner is allowed to push again.

use crate::action::Action;
use crate::behavior::Behavior;
use crate::context::BehaviorContext;
use core_events::{Event, names};
use core_script::{Fragment, FragmentKind};
use core_state::{
    CompletionReason, MemoryTag, MemoryValue, RoundState, RoundTotal, Visibility,
};

fn read_round(ctx: &BehaviorContext<'_>) -> Option<RoundState> {
    ctx.find(&MemoryTag::Round)
        .and_then(|id| ctx.memory.get(id))
        .and_then(|v| v.as_round().copied())
}

fn child_index(ctx: &BehaviorContext<'_>) -> Option<usize> {
    ctx.find(&MemoryTag::child_index())
        .and_then(|id| ctx.memory.get(id))
        .and_then(MemoryValue::as_index)
}

fn round_label(round: &RoundState) -> String {
    match round.total {
        RoundTotal::Bounded(total) => format!("Round {}/{}", round.current.min(total), total),
        RoundTotal::Unbounded => format!("Round {}", round.current),
    }
}

/// Allocates the `round` entry.
pub struct RoundInit {
    start: u32,
    total: RoundTotal,
}

impl RoundInit {
    pub fn new(start: u32, total: RoundTotal) -> Self {
        Self { start, total }
    }
}

impl Behavior for RoundInit {
    fn name(&self) -> &'static str {
        "RoundInit"
    }

    fn on_mount(&mut self, ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
        ctx.allocate(
            MemoryTag::Round,
            MemoryValue::Round(RoundState {
                current: self.start,
                total: self.total,
            }),
            Visibility::Public,
        );
        Ok(Vec::new())
    }
}

/// Advances `round.current` when a full lap has finished (child index walked
/// past the last group) and announces `rounds:advance`.
pub struct RoundAdvance {
    groups: usize,
}

impl RoundAdvance {
    pub fn new(groups: usize) -> Self {
        Self { groups }
    }
}

impl Behavior for RoundAdvance {
    fn name(&self) -> &'static str {
        "RoundAdvance"
    }

    fn on_next(&mut self, ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
        if self.groups == 0 {
            return Ok(Vec::new());
        }
        let Some(index) = child_index(ctx) else {
            return Ok(Vec::new());
        };
        if index < self.groups {
            return Ok(Vec::new());
        }
        let mut advanced_to = 0;
        if let Some(id) = ctx.find(&MemoryTag::Round) {
            ctx.memory.update(id, |value| {
                if let Some(round) = value.as_round_mut() {
                    round.current += 1;
                    advanced_to = round.current;
                }
            })?;
        }
        let event = Event::new(names::ROUNDS_ADVANCE, ctx.now)
            .with_data(serde_json::json!({ "round": advanced_to }));
        Ok(vec![Action::Dispatch(event)])
    }
}

/// Marks `rounds-complete` once a bounded counter walks past its total.
/// Unbounded rounds never auto-complete.
#[derive(Default)]
pub struct RoundCompletion;

impl Behavior for RoundCompletion {
    fn name(&self) -> &'static str {
        "RoundCompletion"
    }

    fn on_next(&mut self, ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
        if read_round(ctx).is_some_and(|r| r.is_exhausted()) {
            ctx.mark_complete(CompletionReason::RoundsComplete);
        }
        Ok(Vec::new())
    }
}

/// Maintains the "Round 2/3" line in `display` memory.
#[derive(Default)]
pub struct RoundDisplay;

impl RoundDisplay {
    fn refresh(ctx: &mut BehaviorContext<'_>) -> anyhow::Result<()> {
        let Some(round) = read_round(ctx) else {
            return Ok(());
        };
        let label = round_label(&round);
        if let Some(id) = ctx.find(&MemoryTag::Display) {
            ctx.memory.update(id, |value| {
                if let Some(display) = value.as_display_mut() {
                    display.round_label = Some(label);
                }
            })?;
        }
        Ok(())
    }
}

impl Behavior for RoundDisplay {
    fn name(&self) -> &'static str {
        "RoundDisplay"
    }

    fn on_mount(&mut self, ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
        Self::refresh(ctx)?;
        Ok(Vec::new())
    }

    fn on_next(&mut self, ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
        Self::refresh(ctx)?;
        Ok(Vec::new())
    }
}

/// Emits a `milestone` at every round start and folds the completed-round
/// count into `fragment:tracked` on unmount so the block's completion output
/// carries it.
#[derive(Default)]
pub struct RoundOutput {
    last_seen: Option<u32>,
}

impl RoundOutput {
    fn milestone(ctx: &BehaviorContext<'_>, round: &RoundState) -> Action {
        let fragment = Fragment::runtime(FragmentKind::Text {
            value: round_label(round),
            mode: Some("round".to_string()),
        });
        Action::EmitOutput(ctx.emit_output(
            core_output::OutputType::Milestone,
            vec![fragment],
            None,
        ))
    }
}

impl Behavior for RoundOutput {
    fn name(&self) -> &'static str {
        "RoundOutput"
    }

    fn on_mount(&mut self, ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
        let Some(round) = read_round(ctx) else {
            return Ok(Vec::new());
        };
        self.last_seen = Some(round.current);
        Ok(vec![Self::milestone(ctx, &round)])
    }

    fn on_next(&mut self, ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
        if ctx.completion().is_complete {
            return Ok(Vec::new());
        }
        let Some(round) = read_round(ctx) else {
            return Ok(Vec::new());
        };
        if self.last_seen == Some(round.current) {
            return Ok(Vec::new());
        }
        self.last_seen = Some(round.current);
        Ok(vec![Self::milestone(ctx, &round)])
    }

    fn on_unmount(&mut self, ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
        let Some(round) = read_round(ctx) else {
            return Ok(Vec::new());
        };
        let completed = match round.total {
            RoundTotal::Bounded(total) if round.current > total => total,
            _ => round.current.saturating_sub(1),
        };
        ctx.track_fragment(Fragment::runtime(FragmentKind::Rounds { count: completed }));
        Ok(Vec::new())
    }
}
