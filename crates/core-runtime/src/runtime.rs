//! The script runtime: turn loop, stack transitions, and the public façade.
//!
//! One `handle(event)` (or the initial `start`) is one turn. A turn:
//!
//! 1. snapshots the clock once — every nested operation, including the
//!    cascaded completion chain after the drain, observes that instant;
//! 2. drains a FIFO of events and actions — events dispatch through the bus
//!    and their actions append, actions apply against the runtime and may
//!    append more items to the *same* turn;
//! 3. settles completions — while the stack holds a completed block, blocks
//!    above it are force-popped, the completed block pops with its own
//!    reason, and the new top runs its `next` phase under the same snapshot.
//!
//! The iteration guard bounds the number of actions per turn; exceeding it
//! aborts the turn with a recoverable error and an intact stack. Stack
//! overflow is the one fatal error: recorded, then the runtime halts.

use crate::error::RuntimeError;
use crate::stack::BlockStack;
use core_blocks::{
    Action, BlockEnv, Phase, RuntimeBlock, completion_of, mark_complete_in,
};
use core_clock::{Clock, Millis};
use core_compiler::JitCompiler;
use core_events::{Event, EventBus, HandlerArgs, HandlerScope, names};
use core_output::{
    OutputStream, OutputSubscriberId, OutputStatement, SystemTransition, system_output,
};
use core_script::{CodeStatement, ScriptError, StatementTable};
use core_state::{
    BlockKey, CompletionReason, EntryId, KeySource, MemoryArena, MemoryCriteria, MemoryValue,
    SubscriberId,
};
use std::collections::VecDeque;

/// Bounds enforced by the execution context.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeLimits {
    pub max_stack_depth: usize,
    pub max_turn_iterations: usize,
}

impl Default for RuntimeLimits {
    fn default() -> Self {
        Self {
            max_stack_depth: 10,
            max_turn_iterations: 20,
        }
    }
}

enum TurnItem {
    Event(Event),
    Action(Action),
}

pub struct ScriptRuntime {
    statements: StatementTable,
    compiler: JitCompiler,
    clock: Box<dyn Clock>,
    limits: RuntimeLimits,
    stack: BlockStack,
    memory: MemoryArena,
    bus: EventBus<Action>,
    outputs: OutputStream,
    errors: Vec<RuntimeError>,
    keys: KeySource,
    turn: u64,
    started: bool,
    halted: bool,
}

impl ScriptRuntime {
    pub fn new(
        statements: Vec<CodeStatement>,
        compiler: JitCompiler,
        clock: impl Clock + 'static,
        limits: RuntimeLimits,
    ) -> Result<Self, ScriptError> {
        let statements = StatementTable::from_statements(statements)?;
        let mut runtime = Self {
            statements,
            compiler,
            clock: Box::new(clock),
            limits,
            stack: BlockStack::new(limits.max_stack_depth),
            memory: MemoryArena::default(),
            bus: EventBus::default(),
            outputs: OutputStream::default(),
            errors: Vec::new(),
            keys: KeySource::default(),
            turn: 0,
            started: false,
            halted: false,
        };
        runtime.register_builtin_handlers();
        Ok(runtime)
    }

    /// The runtime's own wiring: `next`/`stop` map to stack actions, the
    /// generic pause/resume aliases re-dispatch their timer-scoped forms.
    fn register_builtin_handlers(&mut self) {
        self.bus
            .register(names::NEXT, BlockKey::RUNTIME, HandlerScope::Global, |_, _| {
                vec![Action::Next]
            });
        self.bus
            .register(names::STOP, BlockKey::RUNTIME, HandlerScope::Global, |_, _| {
                vec![Action::Stop]
            });
        self.bus
            .register(names::PAUSE, BlockKey::RUNTIME, HandlerScope::Global, |_, args| {
                vec![Action::Dispatch(Event::new(names::TIMER_PAUSE, args.now))]
            });
        self.bus
            .register(names::RESUME, BlockKey::RUNTIME, HandlerScope::Global, |_, args| {
                vec![Action::Dispatch(Event::new(names::TIMER_RESUME, args.now))]
            });
    }

    // ---------------------------------------------------------------------
    // Façade
    // ---------------------------------------------------------------------

    /// Compile the root and run the mount turn. The only idle → running
    /// transition; repeated calls are no-ops.
    pub fn start(&mut self) {
        if self.started || self.halted {
            return;
        }
        self.started = true;
        match self.compiler.compile_root(&self.statements, &mut self.keys) {
            Ok(root) => {
                tracing::info!(
                    target: "runtime",
                    root = %root.key(),
                    kind = %root.kind(),
                    "workout start"
                );
                self.run_turn(TurnItem::Action(Action::Push(Box::new(root))));
            }
            Err(error) => self.record(RuntimeError::Compile(error)),
        }
    }

    /// Dispatch a `stop` event: the stack unwinds top-down in one turn.
    pub fn stop(&mut self) {
        let now = self.clock.now();
        self.handle(Event::new(names::STOP, now));
    }

    /// Run one turn seeded with an external event.
    pub fn handle(&mut self, event: Event) {
        if self.halted {
            return;
        }
        self.run_turn(TurnItem::Event(event));
    }

    pub fn on_output(
        &mut self,
        callback: impl FnMut(&OutputStatement) + Send + 'static,
    ) -> OutputSubscriberId {
        self.outputs.subscribe(callback)
    }

    /// Register a host-owned event handler (UI bindings, integrations).
    /// Owned by the runtime key, so it lives for the whole run.
    pub fn register_handler(
        &mut self,
        event: &str,
        scope: HandlerScope,
        callback: impl FnMut(&Event, &mut HandlerArgs<'_>) -> Vec<Action> + Send + 'static,
    ) -> core_events::HandlerId {
        self.bus.register(event, BlockKey::RUNTIME, scope, callback)
    }

    pub fn off_output(&mut self, id: OutputSubscriberId) -> bool {
        self.outputs.unsubscribe(id)
    }

    pub fn search_memory(&self, criteria: &MemoryCriteria) -> Vec<EntryId> {
        self.memory.search(criteria)
    }

    pub fn peek_memory(&self, id: EntryId) -> Option<MemoryValue> {
        self.memory.get(id).cloned()
    }

    pub fn subscribe_memory(
        &mut self,
        id: EntryId,
        callback: impl FnMut(&MemoryValue) + Send + 'static,
    ) -> Result<SubscriberId, RuntimeError> {
        Ok(self.memory.subscribe(id, callback)?)
    }

    pub fn errors(&self) -> &[RuntimeError] {
        &self.errors
    }

    pub fn outputs(&self) -> &OutputStream {
        &self.outputs
    }

    pub fn depth(&self) -> usize {
        self.stack.depth()
    }

    pub fn current_key(&self) -> Option<BlockKey> {
        self.stack.current().map(RuntimeBlock::key)
    }

    pub fn turn(&self) -> u64 {
        self.turn
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Started and the stack still holds blocks.
    pub fn is_running(&self) -> bool {
        self.started && !self.halted && !self.stack.is_empty()
    }

    // ---------------------------------------------------------------------
    // Turn loop
    // ---------------------------------------------------------------------

    fn run_turn(&mut self, seed: TurnItem) {
        let now = self.clock.now();
        self.turn += 1;
        tracing::debug!(target: "runtime.turn", turn = self.turn, now, "turn begin");

        let mut queue = VecDeque::new();
        queue.push_back(seed);
        let mut iterations = 0usize;
        if self.drain(&mut queue, now, &mut iterations) {
            self.settle(now, &mut iterations);
        }
        tracing::trace!(
            target: "runtime.turn",
            turn = self.turn,
            iterations,
            depth = self.stack.depth(),
            "turn end"
        );
    }

    /// FIFO drain. Returns false when the turn aborted (guard or halt).
    fn drain(
        &mut self,
        queue: &mut VecDeque<TurnItem>,
        now: Millis,
        iterations: &mut usize,
    ) -> bool {
        while let Some(item) = queue.pop_front() {
            if self.halted {
                return false;
            }
            match item {
                TurnItem::Event(event) => {
                    let top = self.stack.current().map(RuntimeBlock::key);
                    let depth = self.stack.depth();
                    let mut args = HandlerArgs {
                        memory: &mut self.memory,
                        now,
                        top,
                        depth,
                    };
                    let actions = self.bus.dispatch(&event, &mut args);
                    queue.extend(actions.into_iter().map(TurnItem::Action));
                }
                TurnItem::Action(action) => {
                    if *iterations >= self.limits.max_turn_iterations {
                        let error = RuntimeError::MaxIterations {
                            turn: self.turn,
                            limit: self.limits.max_turn_iterations,
                        };
                        tracing::warn!(target: "runtime.turn", %error, "turn aborted");
                        self.errors.push(error);
                        queue.clear();
                        return false;
                    }
                    *iterations += 1;
                    tracing::trace!(
                        target: "runtime.turn",
                        turn = self.turn,
                        action = action.name(),
                        iteration = *iterations,
                        "apply"
                    );
                    self.apply(action, now, queue);
                }
            }
        }
        true
    }

    fn apply(&mut self, action: Action, now: Millis, queue: &mut VecDeque<TurnItem>) {
        match action {
            Action::Push(block) => self.push_and_mount(*block, now, queue),
            Action::PushStatements { ids, context } => {
                match self
                    .compiler
                    .compile(&self.statements, &mut self.keys, &ids, &context)
                {
                    Ok(block) => self.push_and_mount(block, now, queue),
                    Err(error) => self.record(RuntimeError::Compile(error)),
                }
            }
            Action::Pop { reason } => self.pop_top(Some(reason), now, queue),
            Action::Next => self.run_next(now, queue),
            Action::Stop => {
                // Completing the root makes the settle pass unwind the whole
                // stack top-down with forced pops.
                if let Some(bottom) = self.stack.bottom_key() {
                    mark_complete_in(&mut self.memory, bottom, CompletionReason::External);
                }
            }
            Action::EmitOutput(output) => {
                self.outputs.publish(output);
            }
            Action::SetMemory { owner, tag, value } => {
                match self.memory.find_one(owner, &tag) {
                    Some(id) => {
                        if let Err(error) = self.memory.set(id, value) {
                            self.record(RuntimeError::Memory(error));
                        }
                    }
                    None => {
                        self.memory.allocate(
                            owner,
                            tag,
                            value,
                            core_state::Visibility::Private,
                        );
                    }
                }
            }
            Action::Dispatch(event) => queue.push_back(TurnItem::Event(event)),
            Action::MarkComplete { key, reason } => {
                mark_complete_in(&mut self.memory, key, reason);
            }
        }
    }

    fn push_and_mount(
        &mut self,
        block: RuntimeBlock,
        now: Millis,
        queue: &mut VecDeque<TurnItem>,
    ) {
        let key = block.key();
        let label = block.label().to_string();
        if let Err(refused) = self.stack.push(block) {
            let error = RuntimeError::StackOverflow {
                block: refused.key().to_string(),
                depth: self.stack.depth(),
            };
            tracing::error!(target: "runtime.stack", %error, "halting");
            self.errors.push(error);
            self.halted = true;
            return;
        }
        let level = self.stack.depth();
        tracing::debug!(target: "runtime.stack", block = %key, %label, level, "push");
        self.outputs.publish(system_output(
            SystemTransition::Push,
            key,
            &label,
            level,
            now,
            Vec::new(),
        ));
        self.run_phase_on_top(Phase::Mount, now, queue);
    }

    fn run_next(&mut self, now: Millis, queue: &mut VecDeque<TurnItem>) {
        let Some(top) = self.stack.current() else {
            return;
        };
        let (key, label) = (top.key(), top.label().to_string());
        let level = self.stack.depth();
        self.outputs.publish(system_output(
            SystemTransition::Next,
            key,
            &label,
            level,
            now,
            Vec::new(),
        ));
        self.run_phase_on_top(Phase::Next, now, queue);
    }

    /// Unmount (still on stack), record the pop reason if none is set yet,
    /// emit the system output, pop, dispose.
    fn pop_top(
        &mut self,
        forced_reason: Option<CompletionReason>,
        now: Millis,
        queue: &mut VecDeque<TurnItem>,
    ) {
        let Some(top) = self.stack.current() else {
            return;
        };
        let (key, label) = (top.key(), top.label().to_string());
        // Record the reason before unmount so the unmount-phase emitters see
        // why the block is going away.
        if let Some(reason) = forced_reason {
            mark_complete_in(&mut self.memory, key, reason);
        }
        self.run_phase_on_top(Phase::Unmount, now, queue);

        let level = self.stack.depth();
        self.outputs.publish(system_output(
            SystemTransition::Pop,
            key,
            &label,
            level,
            now,
            Vec::new(),
        ));
        let mut block = self.stack.pop().expect("non-empty stack");
        tracing::debug!(target: "runtime.stack", block = %key, %label, "pop");
        block.dispose(&mut self.memory, &mut self.bus);
    }

    fn run_phase_on_top(&mut self, phase: Phase, now: Millis, queue: &mut VecDeque<TurnItem>) {
        let level = self.stack.depth();
        let Some(block) = self.stack.current_mut() else {
            return;
        };
        let mut failures = Vec::new();
        let actions = block.run_phase(
            phase,
            BlockEnv {
                memory: &mut self.memory,
                bus: &mut self.bus,
                now,
                stack_level: level,
            },
            &mut failures,
        );
        self.errors
            .extend(failures.into_iter().map(RuntimeError::Behavior));
        queue.extend(actions.into_iter().map(TurnItem::Action));
    }

    /// Post-drain completion pass. While some block on the stack is
    /// complete: force-pop everything above it, pop it with its recorded
    /// reason, and give the new top a cascaded `next` under the same frozen
    /// clock.
    fn settle(&mut self, now: Millis, iterations: &mut usize) {
        loop {
            if self.halted {
                return;
            }
            let keys = self.stack.keys();
            let Some(level) = keys
                .iter()
                .position(|k| completion_of(&self.memory, *k).is_complete)
            else {
                return;
            };

            let mut queue = VecDeque::new();
            while self.stack.depth() > level + 1 {
                self.pop_top(Some(CompletionReason::ForcedPop), now, &mut queue);
                if !self.drain(&mut queue, now, iterations) {
                    return;
                }
            }
            self.pop_top(None, now, &mut queue);
            if !self.drain(&mut queue, now, iterations) {
                return;
            }
            if !self.stack.is_empty() {
                self.run_next(now, &mut queue);
                if !self.drain(&mut queue, now, iterations) {
                    return;
                }
            } else {
                tracing::info!(target: "runtime", turn = self.turn, "workout complete");
                return;
            }
        }
    }

    fn record(&mut self, error: RuntimeError) {
        tracing::error!(target: "runtime", %error, "recorded");
        if error.is_fatal() {
            self.halted = true;
        }
        self.errors.push(error);
    }
}
