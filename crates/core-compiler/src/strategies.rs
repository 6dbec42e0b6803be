//! Built-in compile strategies, in precedence order.
//!
//! A strategy is a predicate over a statement group plus a constructor. The
//! registry tries them in registration order and the first match wins, so
//! the more specific shapes (interval, time-bound rounds) sit above the
//! generic ones and `EffortStrategy` is the unconditional fallback.

use crate::fragments::compile_display;
use crate::{CompileStrategy, CompilerEnv};
use core_blocks::behaviors::SoundSpec;
use core_blocks::{
    BlockBuilder, BlockKind, CompileContext, ContainerSpec, RepeaterSpec, RuntimeBlock,
    TimerSpec,
};
use core_clock::Millis;
use core_events::names;
use core_script::{CodeStatement, FragmentKind, TimerDirection};
use core_state::{ControlButton, RoundTotal, TimerRole};

fn any_timer(statements: &[&CodeStatement]) -> Option<(TimerDirection, Option<Millis>)> {
    statements.iter().find_map(|s| s.timer())
}

fn any_rounds(statements: &[&CodeStatement]) -> Option<u32> {
    statements.iter().find_map(|s| s.rounds())
}

fn any_children(statements: &[&CodeStatement]) -> bool {
    statements.iter().any(|s| s.has_children())
}

fn has_action(statements: &[&CodeStatement], label: &str) -> bool {
    statements.iter().any(|s| s.has_action(label))
}

fn rep_scheme(statements: &[&CodeStatement]) -> Vec<u32> {
    statements
        .iter()
        .map(|s| s.rep_scheme())
        .find(|scheme| !scheme.is_empty())
        .unwrap_or_default()
}

fn sound_cues(statements: &[&CodeStatement]) -> Vec<SoundSpec> {
    statements
        .iter()
        .flat_map(|s| s.fragments.iter())
        .filter_map(|f| match &f.kind {
            FragmentKind::Sound { trigger, seconds } => Some(SoundSpec {
                trigger: *trigger,
                seconds: *seconds,
            }),
            _ => None,
        })
        .collect()
}

fn child_groups(statements: &[&CodeStatement]) -> Vec<Vec<core_script::StatementId>> {
    statements
        .iter()
        .flat_map(|s| s.children.iter())
        .filter(|group| !group.is_empty())
        .cloned()
        .collect()
}

/// Indexes of lap groups that are rest phases (every statement in the group
/// carries a `Rest` action). The rest guard skips these instead of pushing.
fn rest_group_indexes(
    groups: &[Vec<core_script::StatementId>],
    table: &core_script::StatementTable,
) -> Vec<usize> {
    groups
        .iter()
        .enumerate()
        .filter(|(_, group)| {
            !group.is_empty()
                && group
                    .iter()
                    .all(|id| table.get(*id).is_some_and(|s| s.has_action("Rest")))
        })
        .map(|(i, _)| i)
        .collect()
}

fn group_label(statements: &[&CodeStatement], fallback: &str) -> String {
    let labels: Vec<String> = statements
        .iter()
        .map(|s| s.label())
        .filter(|l| !l.is_empty())
        .collect();
    if labels.is_empty() {
        fallback.to_string()
    } else {
        labels.join(" + ")
    }
}

fn timer_controls() -> Vec<ControlButton> {
    vec![
        ControlButton::new("Pause", "button:pause", names::TIMER_PAUSE),
        ControlButton::new("Resume", "button:resume", names::TIMER_RESUME),
    ]
}

fn format_duration(ms: Millis) -> String {
    let total_secs = ms / 1_000;
    format!("{}:{:02}", total_secs / 60, total_secs % 60)
}

/// Plain timer: a `Timer` fragment without rounds, grouping, or an interval
/// action.
pub struct TimerStrategy;

impl CompileStrategy for TimerStrategy {
    fn name(&self) -> &'static str {
        "timer"
    }

    fn matches(&self, statements: &[&CodeStatement], _ctx: &CompileContext) -> bool {
        any_timer(statements).is_some()
            && any_rounds(statements).is_none()
            && !any_children(statements)
            && !has_action(statements, "EMOM")
            && !has_action(statements, "AMRAP")
    }

    fn compile(
        &self,
        statements: &[&CodeStatement],
        env: &mut CompilerEnv<'_>,
        ctx: &CompileContext,
    ) -> anyhow::Result<RuntimeBlock> {
        let (direction, duration_ms) = any_timer(statements).expect("matched timer");
        let label = group_label(
            statements,
            &duration_ms.map(format_duration).unwrap_or_default(),
        );
        let mut builder = BlockBuilder::new(env.keys.fresh(), BlockKind::Timer, label)
            .source_ids(statements.iter().map(|s| s.id).collect())
            .display_fragments(compile_display(statements, ctx))
            .as_timer(TimerSpec {
                direction,
                duration_ms,
                role: TimerRole::Primary,
            })
            .display(None)
            .controls(timer_controls())
            .sounds(sound_cues(statements));
        if duration_ms.is_none() {
            // An unbounded timer has no expiry; the user's advance is its
            // only completion path.
            builder = builder.pop_on_next();
        }
        Ok(builder.finish()?)
    }
}

/// Rounds container: a `Rounds` fragment (or a multi-entry rep scheme, which
/// implies one round per entry) and no timer.
pub struct RoundsStrategy;

impl CompileStrategy for RoundsStrategy {
    fn name(&self) -> &'static str {
        "rounds"
    }

    fn matches(&self, statements: &[&CodeStatement], _ctx: &CompileContext) -> bool {
        any_timer(statements).is_none()
            && (any_rounds(statements).is_some() || rep_scheme(statements).len() > 1)
    }

    fn compile(
        &self,
        statements: &[&CodeStatement],
        env: &mut CompilerEnv<'_>,
        ctx: &CompileContext,
    ) -> anyhow::Result<RuntimeBlock> {
        let scheme = rep_scheme(statements);
        let total = any_rounds(statements).unwrap_or(scheme.len() as u32);
        let label = group_label(statements, &format!("{total} Rounds"));
        let groups = child_groups(statements);
        let rest_groups = rest_group_indexes(&groups, env.table);
        let block = BlockBuilder::new(env.keys.fresh(), BlockKind::Rounds, label)
            .source_ids(statements.iter().map(|s| s.id).collect())
            .display_fragments(compile_display(statements, ctx))
            .as_repeater(RepeaterSpec {
                start: 1,
                total: RoundTotal::Bounded(total),
                rep_scheme: scheme,
                advance_on_lap: true,
            })
            .as_container(ContainerSpec {
                groups,
                rest_groups,
                inherited: ctx.clone(),
            })
            .display(None)
            .finish()?;
        Ok(block)
    }
}

/// EMOM: a timer plus the `EMOM` action. The timer spans the whole block;
/// the rollover behavior cuts each round at its interval boundary.
pub struct IntervalStrategy;

impl CompileStrategy for IntervalStrategy {
    fn name(&self) -> &'static str {
        "interval"
    }

    fn matches(&self, statements: &[&CodeStatement], _ctx: &CompileContext) -> bool {
        any_timer(statements).is_some() && has_action(statements, "EMOM")
    }

    fn compile(
        &self,
        statements: &[&CodeStatement],
        env: &mut CompilerEnv<'_>,
        ctx: &CompileContext,
    ) -> anyhow::Result<RuntimeBlock> {
        let (direction, interval_ms) = any_timer(statements).expect("matched timer");
        let interval_ms = interval_ms.unwrap_or(60_000);
        let rounds = any_rounds(statements).unwrap_or(1);
        let label = group_label(statements, &format!("EMOM {rounds}"));
        let inherited = CompileContext {
            interval_duration_ms: Some(interval_ms),
            ..ctx.clone()
        };
        let groups = child_groups(statements);
        let rest_groups = rest_group_indexes(&groups, env.table);
        let block = BlockBuilder::new(env.keys.fresh(), BlockKind::Interval, label)
            .source_ids(statements.iter().map(|s| s.id).collect())
            .display_fragments(compile_display(statements, ctx))
            .as_timer(TimerSpec {
                direction,
                duration_ms: Some(interval_ms * u64::from(rounds)),
                role: TimerRole::Primary,
            })
            .as_repeater(RepeaterSpec {
                start: 1,
                total: RoundTotal::Bounded(rounds),
                rep_scheme: rep_scheme(statements),
                advance_on_lap: false,
            })
            .as_container(ContainerSpec {
                groups,
                rest_groups,
                inherited,
            })
            .interval(interval_ms)
            .display(None)
            .controls(timer_controls())
            .sounds(sound_cues(statements))
            .finish()?;
        Ok(block)
    }
}

/// AMRAP and friends: a timer bounding a rounds container. Rounds are
/// unbounded unless the statement pins a count; the timer's expiry is the
/// usual completion path.
pub struct TimeBoundRoundsStrategy;

impl CompileStrategy for TimeBoundRoundsStrategy {
    fn name(&self) -> &'static str {
        "time-bound-rounds"
    }

    fn matches(&self, statements: &[&CodeStatement], _ctx: &CompileContext) -> bool {
        any_timer(statements).is_some()
            && (any_rounds(statements).is_some() || has_action(statements, "AMRAP"))
    }

    fn compile(
        &self,
        statements: &[&CodeStatement],
        env: &mut CompilerEnv<'_>,
        ctx: &CompileContext,
    ) -> anyhow::Result<RuntimeBlock> {
        let (direction, duration_ms) = any_timer(statements).expect("matched timer");
        let total = any_rounds(statements)
            .map(RoundTotal::Bounded)
            .unwrap_or(RoundTotal::Unbounded);
        let label = group_label(
            statements,
            &format!(
                "AMRAP {}",
                duration_ms.map(format_duration).unwrap_or_default()
            ),
        );
        let groups = child_groups(statements);
        let rest_groups = rest_group_indexes(&groups, env.table);
        let block = BlockBuilder::new(env.keys.fresh(), BlockKind::TimeBoundRounds, label)
            .source_ids(statements.iter().map(|s| s.id).collect())
            .display_fragments(compile_display(statements, ctx))
            .as_timer(TimerSpec {
                direction,
                duration_ms,
                role: TimerRole::Primary,
            })
            .as_repeater(RepeaterSpec {
                start: 1,
                total,
                rep_scheme: rep_scheme(statements),
                advance_on_lap: true,
            })
            .as_container(ContainerSpec {
                groups,
                rest_groups,
                inherited: ctx.clone(),
            })
            .display(None)
            .controls(timer_controls())
            .sounds(sound_cues(statements))
            .finish()?;
        Ok(block)
    }
}

/// Generic container: children but no timing or rounds fragments.
pub struct GroupStrategy;

impl CompileStrategy for GroupStrategy {
    fn name(&self) -> &'static str {
        "group"
    }

    fn matches(&self, statements: &[&CodeStatement], _ctx: &CompileContext) -> bool {
        any_children(statements)
            && any_timer(statements).is_none()
            && any_rounds(statements).is_none()
    }

    fn compile(
        &self,
        statements: &[&CodeStatement],
        env: &mut CompilerEnv<'_>,
        ctx: &CompileContext,
    ) -> anyhow::Result<RuntimeBlock> {
        let label = group_label(statements, "Group");
        let groups = child_groups(statements);
        let rest_groups = rest_group_indexes(&groups, env.table);
        let block = BlockBuilder::new(env.keys.fresh(), BlockKind::Group, label)
            .source_ids(statements.iter().map(|s| s.id).collect())
            .display_fragments(compile_display(statements, ctx))
            .as_container(ContainerSpec {
                groups,
                rest_groups,
                inherited: ctx.clone(),
            })
            .pop_on_next()
            .finish()?;
        Ok(block)
    }
}

/// Fallback: a terminal effort line. Always matches.
pub struct EffortStrategy;

impl CompileStrategy for EffortStrategy {
    fn name(&self) -> &'static str {
        "effort"
    }

    fn matches(&self, _statements: &[&CodeStatement], _ctx: &CompileContext) -> bool {
        true
    }

    fn compile(
        &self,
        statements: &[&CodeStatement],
        env: &mut CompilerEnv<'_>,
        ctx: &CompileContext,
    ) -> anyhow::Result<RuntimeBlock> {
        let label = group_label(statements, "Effort");
        let block = BlockBuilder::new(env.keys.fresh(), BlockKind::Effort, label)
            .source_ids(statements.iter().map(|s| s.id).collect())
            .display_fragments(compile_display(statements, ctx))
            .display(None)
            .pop_on_next()
            .history()
            // The parent container's segment already covers this block;
            // efforts only report their completion.
            .segment(false, true)
            .finish()?;
        Ok(block)
    }
}
