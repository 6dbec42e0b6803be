//! Block construction.
//!
//! Strategies describe a block through aspect composers (`as_timer`,
//! `as_repeater`, `as_container`, ...); `finish` assembles the behavior list
//! in the one canonical order. Ordering is data here, not a runtime
//! discovery, and callers cannot reorder:
//!
//! 1. init behaviors (timer, round, display, controls) before anything that
//!    reads the initialized tags,
//! 2. completion checks before child advancement on `next`,
//! 3. lap reset and rest gating before the child runner,
//! 4. output behaviors last in every phase, so they observe final state.

use crate::behavior::Behavior;
use crate::behaviors::{
    ButtonEvent, ChildLoop, ChildRunner, ControlsInit, DisplayInit, IntervalRollover,
    PopOnEvent, PopOnNext, RestBlockGuard, RoundAdvance, RoundCompletion, RoundDisplay,
    RoundInit, RoundOutput, SegmentOutput, SoundCue, SoundSpec, TimerCompletion, TimerInit,
    TimerOutput, TimerPause, TimerTick,
};
use crate::block::{BlockKind, RuntimeBlock};
use crate::compile_ctx::CompileContext;
use core_clock::Millis;
use core_script::{Fragment, StatementId, TimerDirection};
use core_state::{BlockKey, ControlButton, RoundTotal, TimerRole};

/// Timer aspect.
#[derive(Debug, Clone)]
pub struct TimerSpec {
    pub direction: TimerDirection,
    pub duration_ms: Option<Millis>,
    pub role: TimerRole,
}

/// Rounds aspect. `advance_on_lap` is false for interval blocks, where the
/// rollover owns round advancement.
#[derive(Debug, Clone)]
pub struct RepeaterSpec {
    pub start: u32,
    pub total: RoundTotal,
    pub rep_scheme: Vec<u32>,
    pub advance_on_lap: bool,
}

/// Children aspect: lap groups of statement ids plus the context inherited
/// by each child compile.
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    pub groups: Vec<Vec<StatementId>>,
    pub rest_groups: Vec<usize>,
    pub inherited: CompileContext,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("block {key} ({label}) has no behaviors")]
    NoBehaviors { key: BlockKey, label: String },
}

pub struct BlockBuilder {
    key: BlockKey,
    kind: BlockKind,
    label: String,
    source_ids: Vec<StatementId>,
    display_fragments: Vec<Fragment>,
    timer: Option<TimerSpec>,
    repeater: Option<RepeaterSpec>,
    container: Option<ContainerSpec>,
    display_mode: Option<Option<String>>,
    controls: Vec<ControlButton>,
    pop_on_next: bool,
    pop_events: Vec<String>,
    sounds: Vec<SoundSpec>,
    interval_ms: Option<Millis>,
    history: bool,
    mount_segment: bool,
    completion_output: bool,
}

impl BlockBuilder {
    pub fn new(key: BlockKey, kind: BlockKind, label: impl Into<String>) -> Self {
        Self {
            key,
            kind,
            label: label.into(),
            source_ids: Vec::new(),
            display_fragments: Vec::new(),
            timer: None,
            repeater: None,
            container: None,
            display_mode: None,
            controls: Vec::new(),
            pop_on_next: false,
            pop_events: Vec::new(),
            sounds: Vec::new(),
            interval_ms: None,
            history: false,
            mount_segment: true,
            completion_output: true,
        }
    }

    pub fn source_ids(mut self, ids: Vec<StatementId>) -> Self {
        self.source_ids = ids;
        self
    }

    pub fn display_fragments(mut self, fragments: Vec<Fragment>) -> Self {
        self.display_fragments = fragments;
        self
    }

    pub fn as_timer(mut self, spec: TimerSpec) -> Self {
        self.timer = Some(spec);
        self
    }

    pub fn as_repeater(mut self, spec: RepeaterSpec) -> Self {
        self.repeater = Some(spec);
        self
    }

    pub fn as_container(mut self, spec: ContainerSpec) -> Self {
        self.container = Some(spec);
        self
    }

    pub fn display(mut self, mode: Option<String>) -> Self {
        self.display_mode = Some(mode);
        self
    }

    pub fn controls(mut self, buttons: Vec<ControlButton>) -> Self {
        self.controls = buttons;
        self
    }

    pub fn pop_on_next(mut self) -> Self {
        self.pop_on_next = true;
        self
    }

    pub fn pop_on_events(mut self, events: Vec<String>) -> Self {
        self.pop_events = events;
        self
    }

    pub fn sounds(mut self, cues: Vec<SoundSpec>) -> Self {
        self.sounds = cues;
        self
    }

    /// Attach an EMOM rollover with the given interval length.
    pub fn interval(mut self, interval_ms: Millis) -> Self {
        self.interval_ms = Some(interval_ms);
        self
    }

    pub fn history(mut self) -> Self {
        self.history = true;
        self
    }

    /// Tune the segment emitter: whether a `segment` fires on mount and
    /// whether this block emits its own `completion` on unmount.
    pub fn segment(mut self, mount: bool, completion: bool) -> Self {
        self.mount_segment = mount;
        self.completion_output = completion;
        self
    }

    pub fn finish(self) -> Result<RuntimeBlock, BuildError> {
        let mut behaviors: Vec<Box<dyn Behavior>> = Vec::new();
        let groups = self.container.as_ref().map_or(0, |c| c.groups.len());

        // Init behaviors first.
        if let Some(timer) = &self.timer {
            behaviors.push(Box::new(TimerInit::new(
                timer.direction,
                timer.duration_ms,
                timer.role,
            )));
        }
        if let Some(repeater) = &self.repeater {
            behaviors.push(Box::new(RoundInit::new(repeater.start, repeater.total)));
        }
        if let Some(mode) = &self.display_mode {
            behaviors.push(Box::new(DisplayInit::new(mode.clone())));
        }
        if !self.controls.is_empty() {
            behaviors.push(Box::new(ControlsInit::new(self.controls.clone())));
            behaviors.push(Box::new(ButtonEvent::new(self.controls.clone())));
        }

        // Timer machinery after its init.
        if let Some(timer) = &self.timer {
            behaviors.push(Box::new(TimerTick::default()));
            behaviors.push(Box::new(TimerPause::default()));
            if timer.duration_ms.is_some() {
                behaviors.push(Box::new(TimerCompletion::default()));
            }
            behaviors.push(Box::new(TimerOutput));
        }
        if !self.sounds.is_empty() {
            behaviors.push(Box::new(SoundCue::new(self.sounds.clone())));
        }
        if let Some(interval_ms) = self.interval_ms {
            behaviors.push(Box::new(IntervalRollover::new(interval_ms)));
        }

        // Completion checks before child advancement. The rest guard walks
        // the cursor past trailing rest phases first, so a lap ending in
        // rest still reads as finished to the round machinery.
        if self.pop_on_next {
            behaviors.push(Box::new(PopOnNext));
        }
        if !self.pop_events.is_empty() {
            behaviors.push(Box::new(PopOnEvent::new(self.pop_events.clone())));
        }
        if let Some(container) = &self.container
            && !container.rest_groups.is_empty()
        {
            behaviors.push(Box::new(RestBlockGuard::new(
                container.rest_groups.clone(),
                groups,
            )));
        }
        if let Some(repeater) = &self.repeater {
            if repeater.advance_on_lap {
                behaviors.push(Box::new(RoundAdvance::new(groups)));
            }
            behaviors.push(Box::new(RoundCompletion));
            if self.display_mode.is_some() {
                behaviors.push(Box::new(RoundDisplay));
            }
        }

        // Children: lap reset, then the runner. The lap resets itself only
        // when laps drive the rounds; an interval rollover resets the
        // cursor at its own boundary instead.
        if let Some(container) = &self.container {
            let repeating = self.repeater.is_some() || self.interval_ms.is_some();
            let lap_driven = self
                .repeater
                .as_ref()
                .is_some_and(|r| r.advance_on_lap);
            if lap_driven {
                behaviors.push(Box::new(ChildLoop::new(groups)));
            }
            let rep_scheme = self
                .repeater
                .as_ref()
                .map(|r| r.rep_scheme.clone())
                .unwrap_or_default();
            behaviors.push(Box::new(ChildRunner::new(
                container.groups.clone(),
                repeating,
                container.rest_groups.clone(),
                rep_scheme,
                container.inherited.clone(),
            )));
        }

        // Output behaviors last, so they see final state for the phase.
        if self.repeater.is_some() {
            behaviors.push(Box::new(RoundOutput::default()));
        }
        if self.history {
            behaviors.push(Box::new(crate::behaviors::HistoryRecord));
        }
        if self.mount_segment || self.completion_output {
            behaviors.push(Box::new(SegmentOutput::new(
                self.mount_segment,
                self.completion_output,
            )));
        }

        if behaviors.is_empty() {
            return Err(BuildError::NoBehaviors {
                key: self.key,
                label: self.label,
            });
        }
        tracing::debug!(
            target: "runtime.blocks",
            block = %self.key,
            kind = %self.kind,
            behaviors = behaviors.len(),
            "assemble"
        );
        Ok(RuntimeBlock::assemble(
            self.key,
            self.kind,
            self.label,
            self.source_ids,
            self.display_fragments,
            behaviors,
        ))
    }
}
