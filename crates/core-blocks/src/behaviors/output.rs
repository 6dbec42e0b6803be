//! Segment/completion emission and history recording.

use crate::action::Action;
use crate::behavior::Behavior;
use crate::context::BehaviorContext;
use core_events::{Event, names};
use core_output::OutputType;
use core_script::Fragment;

/// Emits the block's `segment` output on mount and its `completion` output
/// on unmount. Both sides are configurable per strategy: container children
/// skip the mount segment (the container's segment already covers them), and
/// every block type keeps exactly one completion emitter.
///
/// The completion output prefers `fragment:tracked` (the canonical elapsed /
/// round measurements written by the output behaviors that ran earlier in
/// the unmount phase), de-duplicated by fragment type, first occurrence
/// wins. With nothing tracked, the attribution path falls back to
/// `fragment:display`.
pub struct SegmentOutput {
    mount_segment: bool,
    completion_on_unmount: bool,
}

impl SegmentOutput {
    pub fn new(mount_segment: bool, completion_on_unmount: bool) -> Self {
        Self {
            mount_segment,
            completion_on_unmount,
        }
    }

    fn dedupe_by_kind(fragments: Vec<Fragment>) -> Vec<Fragment> {
        let mut seen = Vec::new();
        let mut out = Vec::new();
        for fragment in fragments {
            let name = fragment.kind.name();
            if seen.contains(&name) {
                continue;
            }
            seen.push(name);
            out.push(fragment);
        }
        out
    }
}

impl Behavior for SegmentOutput {
    fn name(&self) -> &'static str {
        "SegmentOutput"
    }

    fn on_mount(&mut self, ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
        if !self.mount_segment {
            return Ok(Vec::new());
        }
        Ok(vec![Action::EmitOutput(ctx.emit_output(
            OutputType::Segment,
            Vec::new(),
            None,
        ))])
    }

    fn on_unmount(&mut self, ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
        if !self.completion_on_unmount {
            return Ok(Vec::new());
        }
        let fragments = Self::dedupe_by_kind(ctx.tracked_fragments());
        let reason = ctx.completion().reason;
        Ok(vec![Action::EmitOutput(ctx.emit_output(
            OutputType::Completion,
            fragments,
            reason,
        ))])
    }
}

/// Dispatches a `history:record` event with a summary of the finished block
/// so a history collaborator can persist it.
#[derive(Default)]
pub struct HistoryRecord;

impl Behavior for HistoryRecord {
    fn name(&self) -> &'static str {
        "HistoryRecord"
    }

    fn on_unmount(&mut self, ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
        let completion = ctx.completion();
        let event = Event::new(names::HISTORY_RECORD, ctx.now).with_data(serde_json::json!({
            "block": ctx.key.to_string(),
            "label": ctx.label,
            "reason": completion.reason.map(|r| r.to_string()),
        }));
        Ok(vec![Action::Dispatch(event)])
    }
}
