//! Sound cues.
//!
//! Cues come from `Sound` fragments on the block's statement. Start and
//! complete cues fire as `milestone` outputs at mount/unmount; countdown
//! cues watch ticks and fire once per remaining whole second at or below
//! their threshold (the handler de-duplicates per second internally).

use crate::action::Action;
use crate::behavior::Behavior;
use crate::context::{BehaviorContext, completion_of};
use core_events::{HandlerId, HandlerScope, names};
use core_output::{OutputStatement, OutputType};
use core_script::{Fragment, FragmentKind, SoundTrigger, TimeSpan};
use core_state::MemoryTag;

/// One configured cue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundSpec {
    pub trigger: SoundTrigger,
    pub seconds: Option<u32>,
}

pub struct SoundCue {
    cues: Vec<SoundSpec>,
    handler: Option<HandlerId>,
}

impl SoundCue {
    pub fn new(cues: Vec<SoundSpec>) -> Self {
        Self {
            cues,
            handler: None,
        }
    }

    fn cue_output(ctx: &BehaviorContext<'_>, trigger: SoundTrigger, seconds: Option<u32>) -> Action {
        let fragment = Fragment::runtime(FragmentKind::Sound { trigger, seconds });
        Action::EmitOutput(ctx.emit_output(OutputType::Milestone, vec![fragment], None))
    }
}

impl Behavior for SoundCue {
    fn name(&self) -> &'static str {
        "SoundCue"
    }

    fn on_mount(&mut self, ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
        let actions: Vec<Action> = self
            .cues
            .iter()
            .filter(|c| c.trigger == SoundTrigger::Start)
            .map(|c| Self::cue_output(ctx, SoundTrigger::Start, c.seconds))
            .collect();

        let thresholds: Vec<u32> = self
            .cues
            .iter()
            .filter(|c| c.trigger == SoundTrigger::Countdown)
            .filter_map(|c| c.seconds)
            .collect();
        if !thresholds.is_empty() {
            let key = ctx.key;
            let mut last_emitted: Option<u64> = None;
            let id = ctx.register_handler(names::TICK, HandlerScope::Global, move |_, args| {
                if completion_of(args.memory, key).is_complete {
                    return Vec::new();
                }
                let remaining = args
                    .memory
                    .find_one(key, &MemoryTag::Timer)
                    .and_then(|id| args.memory.get(id))
                    .and_then(|v| v.as_timer().and_then(|t| t.remaining(args.now)));
                let Some(remaining) = remaining else {
                    return Vec::new();
                };
                let seconds = remaining.div_ceil(1_000);
                let in_window = thresholds.iter().any(|&t| seconds <= u64::from(t));
                if seconds == 0 || !in_window || last_emitted == Some(seconds) {
                    return Vec::new();
                }
                last_emitted = Some(seconds);
                let fragment = Fragment::runtime(FragmentKind::Sound {
                    trigger: SoundTrigger::Countdown,
                    seconds: Some(seconds as u32),
                })
                .attributed(&key.to_string(), args.now);
                vec![Action::EmitOutput(OutputStatement {
                    id: 0,
                    output_type: OutputType::Milestone,
                    time_span: TimeSpan::instant(args.now),
                    spans: Vec::new(),
                    source_block_key: key.to_string(),
                    source_statement_id: None,
                    stack_level: args.depth,
                    fragments: vec![fragment],
                    completion_reason: None,
                })]
            });
            self.handler = Some(id);
        }
        Ok(actions)
    }

    fn on_unmount(&mut self, ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
        if let Some(id) = self.handler.take() {
            ctx.bus.unregister(id);
        }
        Ok(self
            .cues
            .iter()
            .filter(|c| c.trigger == SoundTrigger::Complete)
            .map(|c| Self::cue_output(ctx, SoundTrigger::Complete, c.seconds))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behaviors::timer::TimerInit;
    use crate::behaviors::timer::fixtures::Fixture;
    use core_events::Event;
    use core_script::TimerDirection;
    use core_state::TimerRole;

    #[test]
    fn countdown_cues_fire_once_per_second() {
        let mut fx = Fixture::new();
        let mut timer = TimerInit::new(TimerDirection::Down, Some(10_000), TimerRole::Primary);
        timer.on_mount(&mut fx.ctx(0)).unwrap();
        let mut cue = SoundCue::new(vec![SoundSpec {
            trigger: SoundTrigger::Countdown,
            seconds: Some(3),
        }]);
        cue.on_mount(&mut fx.ctx(0)).unwrap();

        // 6.5s in: 3.5s remaining, above threshold once rounded up to 4.
        assert!(fx.dispatch(&Event::new(names::TICK, 6_500), 6_500).is_empty());
        // 7.2s in: 2.8s remaining → "3".
        let three = fx.dispatch(&Event::new(names::TICK, 7_200), 7_200);
        assert_eq!(three.len(), 1);
        // Same second again: deduplicated.
        assert!(fx.dispatch(&Event::new(names::TICK, 7_400), 7_400).is_empty());
        // 8.5s in: 1.5s remaining → "2".
        let two = fx.dispatch(&Event::new(names::TICK, 8_500), 8_500);
        assert_eq!(two.len(), 1);
    }

    #[test]
    fn start_and_complete_cues_bracket_the_block() {
        let mut fx = Fixture::new();
        let mut cue = SoundCue::new(vec![
            SoundSpec {
                trigger: SoundTrigger::Start,
                seconds: None,
            },
            SoundSpec {
                trigger: SoundTrigger::Complete,
                seconds: None,
            },
        ]);
        assert_eq!(cue.on_mount(&mut fx.ctx(0)).unwrap().len(), 1);
        assert_eq!(cue.on_unmount(&mut fx.ctx(5)).unwrap().len(), 1);
    }
}
