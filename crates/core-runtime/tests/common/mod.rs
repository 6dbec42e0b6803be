//! Shared harness for the runtime scenario tests: statement builders, a
//! manually clocked runtime, and an output recorder.
#![allow(dead_code)]

use core_clock::{Clock, ManualClock, Millis};
use core_compiler::JitCompiler;
use core_events::{Event, names};
use core_output::{OutputStatement, OutputType};
use core_runtime::{RuntimeLimits, ScriptRuntime};
use core_script::{CodeStatement, Fragment, FragmentKind, StatementId, TimerDirection};
use std::sync::{Arc, Mutex};

pub fn timer_statement(id: u32, direction: TimerDirection, duration_ms: Option<u64>) -> CodeStatement {
    let mut s = CodeStatement::new(id);
    s.fragments.push(Fragment::parser(FragmentKind::Timer {
        direction,
        duration_ms,
    }));
    s
}

pub fn effort_statement(id: u32, label: &str, reps: Option<u32>, parent: Option<u32>) -> CodeStatement {
    let mut s = CodeStatement::new(id);
    s.parent = parent.map(StatementId);
    s.fragments.push(Fragment::parser(FragmentKind::Effort {
        label: label.to_string(),
    }));
    if let Some(count) = reps {
        s.fragments
            .push(Fragment::parser(FragmentKind::Rep { count }));
    }
    s
}

pub fn rounds_statement(id: u32, count: u32, children: Vec<Vec<u32>>) -> CodeStatement {
    let mut s = CodeStatement::new(id);
    s.fragments
        .push(Fragment::parser(FragmentKind::Rounds { count }));
    s.children = children
        .into_iter()
        .map(|group| group.into_iter().map(StatementId).collect())
        .collect();
    s
}

pub fn action_fragment(label: &str) -> Fragment {
    Fragment::parser(FragmentKind::Action {
        label: label.to_string(),
        pinned: false,
    })
}

/// Records every published output for later filtering.
#[derive(Clone, Default)]
pub struct Recorder {
    outputs: Arc<Mutex<Vec<OutputStatement>>>,
}

impl Recorder {
    pub fn attach(&self, runtime: &mut ScriptRuntime) {
        let outputs = self.outputs.clone();
        runtime.on_output(move |o| outputs.lock().unwrap().push(o.clone()));
    }

    pub fn all(&self) -> Vec<OutputStatement> {
        self.outputs.lock().unwrap().clone()
    }

    pub fn of_type(&self, output_type: OutputType) -> Vec<OutputStatement> {
        self.all()
            .into_iter()
            .filter(|o| o.output_type == output_type)
            .collect()
    }

    pub fn semantic(&self) -> Vec<OutputStatement> {
        self.all()
            .into_iter()
            .filter(|o| o.output_type != OutputType::System)
            .collect()
    }
}

pub struct Harness {
    pub runtime: ScriptRuntime,
    pub clock: ManualClock,
    pub recorder: Recorder,
}

impl Harness {
    pub fn new(statements: Vec<CodeStatement>) -> Self {
        Self::with_limits(statements, RuntimeLimits::default())
    }

    pub fn with_limits(statements: Vec<CodeStatement>, limits: RuntimeLimits) -> Self {
        let clock = ManualClock::new(0);
        let mut runtime = ScriptRuntime::new(
            statements,
            JitCompiler::default(),
            clock.clone(),
            limits,
        )
        .expect("valid statements");
        let recorder = Recorder::default();
        recorder.attach(&mut runtime);
        Self {
            runtime,
            clock,
            recorder,
        }
    }

    /// Advance the clock and fire a tick carrying that timestamp.
    pub fn tick(&mut self, at: Millis) {
        self.clock.set(at);
        self.runtime.handle(Event::new(names::TICK, at));
    }

    /// Advance the clock and fire a user `next`.
    pub fn next(&mut self, at: Millis) {
        self.clock.set(at);
        self.runtime.handle(Event::new(names::NEXT, at));
    }

    pub fn event(&mut self, name: &str, at: Millis) {
        self.clock.set(at);
        self.runtime.handle(Event::new(name, at));
    }

    pub fn now(&self) -> Millis {
        self.clock.now()
    }
}
