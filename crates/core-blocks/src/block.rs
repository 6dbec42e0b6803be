//! Runtime blocks.
//!
//! A block is the executable unit on the stack: an identity, a label, its
//! source statement ids, and an ordered behavior list. All of its mutable
//! state lives in the memory arena under its key.
//!
//! Lifecycle: `constructor → [on stack] → mount → (next | event)* →
//! unmount → [off stack] → dispose`. Phases delegate to behaviors in
//! declaration order; dispose is idempotent and tolerated twice.

use crate::action::Action;
use crate::behavior::{Behavior, BehaviorFailure, Phase};
use crate::context::{BehaviorContext, completion_of};
use core_clock::Millis;
use core_events::EventBus;
use core_script::{Fragment, StatementId};
use core_state::{
    BlockKey, CompletionState, MemoryArena, MemoryTag, MemoryValue, Visibility,
};
use std::fmt;

/// What kind of block a strategy produced. `Display` is the stable external
/// string used in logs and system outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Timer,
    Rounds,
    Interval,
    TimeBoundRounds,
    Group,
    Effort,
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BlockKind::Timer => "Timer",
            BlockKind::Rounds => "Rounds",
            BlockKind::Interval => "Interval",
            BlockKind::TimeBoundRounds => "TimeBoundRounds",
            BlockKind::Group => "Group",
            BlockKind::Effort => "Effort",
        };
        f.write_str(s)
    }
}

/// Per-phase environment handed in by the execution context.
pub struct BlockEnv<'a> {
    pub memory: &'a mut MemoryArena,
    pub bus: &'a mut EventBus<Action>,
    pub now: Millis,
    pub stack_level: usize,
}

pub struct RuntimeBlock {
    key: BlockKey,
    kind: BlockKind,
    label: String,
    source_ids: Vec<StatementId>,
    behaviors: Vec<Box<dyn Behavior>>,
    /// Compiled display fragments, seeded into `fragment:display` on mount.
    display_fragments: Vec<Fragment>,
    primed: bool,
    disposed: bool,
}

impl fmt::Debug for RuntimeBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeBlock")
            .field("key", &self.key.to_string())
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field(
                "behaviors",
                &self
                    .behaviors
                    .iter()
                    .map(|b| b.name())
                    .collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl RuntimeBlock {
    /// Constructed only by the builder, which guarantees a non-empty,
    /// correctly ordered behavior list.
    pub(crate) fn assemble(
        key: BlockKey,
        kind: BlockKind,
        label: String,
        source_ids: Vec<StatementId>,
        display_fragments: Vec<Fragment>,
        behaviors: Vec<Box<dyn Behavior>>,
    ) -> Self {
        Self {
            key,
            kind,
            label,
            source_ids,
            behaviors,
            display_fragments,
            primed: false,
            disposed: false,
        }
    }

    pub fn key(&self) -> BlockKey {
        self.key
    }

    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn source_ids(&self) -> &[StatementId] {
        &self.source_ids
    }

    pub fn behavior_names(&self) -> Vec<&'static str> {
        self.behaviors.iter().map(|b| b.name()).collect()
    }

    pub fn completion(&self, memory: &MemoryArena) -> CompletionState {
        completion_of(memory, self.key)
    }

    /// Run one lifecycle phase: delegate to every behavior in declaration
    /// order, concatenating actions. A failing behavior is recorded and the
    /// remaining behaviors still run.
    pub fn run_phase(
        &mut self,
        phase: Phase,
        env: BlockEnv<'_>,
        failures: &mut Vec<BehaviorFailure>,
    ) -> Vec<Action> {
        if phase == Phase::Mount && !self.primed {
            self.primed = true;
            env.memory.allocate(
                self.key,
                MemoryTag::Completion,
                MemoryValue::Completion(CompletionState::default()),
                Visibility::Public,
            );
            env.memory.allocate(
                self.key,
                MemoryTag::FragmentDisplay,
                MemoryValue::Fragments(self.display_fragments.clone()),
                Visibility::Public,
            );
            env.memory.allocate(
                self.key,
                MemoryTag::FragmentTracked,
                MemoryValue::Fragments(Vec::new()),
                Visibility::Private,
            );
        }

        let mut ctx = BehaviorContext {
            key: self.key,
            label: &self.label,
            source_ids: &self.source_ids,
            memory: env.memory,
            bus: env.bus,
            now: env.now,
            stack_level: env.stack_level,
        };

        let mut actions = Vec::new();
        for behavior in &mut self.behaviors {
            let result = match phase {
                Phase::Mount => behavior.on_mount(&mut ctx),
                Phase::Next => behavior.on_next(&mut ctx),
                Phase::Unmount => behavior.on_unmount(&mut ctx),
            };
            match result {
                Ok(mut produced) => actions.append(&mut produced),
                Err(error) => {
                    tracing::error!(
                        target: "runtime.blocks",
                        block = %self.key,
                        behavior = behavior.name(),
                        %phase,
                        error = %format!("{error:#}"),
                        "behavior failed; phase continues"
                    );
                    failures.push(BehaviorFailure {
                        block: self.key,
                        behavior: behavior.name(),
                        phase,
                        error,
                    });
                }
            }
        }
        actions
    }

    /// Release memory, unregister handlers, drop behaviors. Idempotent:
    /// the second call is a no-op returning false.
    pub fn dispose(&mut self, memory: &mut MemoryArena, bus: &mut EventBus<Action>) -> bool {
        if self.disposed {
            return false;
        }
        self.disposed = true;
        let released = memory.release_by_owner(self.key);
        let handlers = bus.unregister_owner(self.key);
        self.behaviors.clear();
        tracing::debug!(
            target: "runtime.blocks",
            block = %self.key,
            released,
            handlers,
            "dispose"
        );
        true
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::Behavior;
    use anyhow::anyhow;
    use core_state::KeySource;
    use std::sync::{Arc, Mutex};

    struct Exploding;

    impl Behavior for Exploding {
        fn name(&self) -> &'static str {
            "Exploding"
        }

        fn on_mount(&mut self, _ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
            Err(anyhow!("boom"))
        }
    }

    struct Witness(Arc<Mutex<bool>>);

    impl Behavior for Witness {
        fn name(&self) -> &'static str {
            "Witness"
        }

        fn on_mount(&mut self, _ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
            *self.0.lock().unwrap() = true;
            Ok(Vec::new())
        }
    }

    #[test]
    fn a_failing_behavior_does_not_abort_the_phase() {
        let mut keys = KeySource::default();
        let ran = Arc::new(Mutex::new(false));
        let mut block = RuntimeBlock::assemble(
            keys.fresh(),
            BlockKind::Effort,
            "fragile".to_string(),
            Vec::new(),
            Vec::new(),
            vec![Box::new(Exploding), Box::new(Witness(ran.clone()))],
        );

        let mut memory = MemoryArena::default();
        let mut bus = EventBus::default();
        let mut failures = Vec::new();
        block.run_phase(
            Phase::Mount,
            BlockEnv {
                memory: &mut memory,
                bus: &mut bus,
                now: 0,
                stack_level: 1,
            },
            &mut failures,
        );

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].behavior, "Exploding");
        assert_eq!(failures[0].phase, Phase::Mount);
        assert!(*ran.lock().unwrap(), "later behaviors still ran");
        // Completion was never assumed for the failing block.
        assert!(!block.completion(&memory).is_complete);
    }
}
