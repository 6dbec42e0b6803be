//! Cross-component invariants: turn clock freezing, FIFO/handler ordering,
//! iteration and depth guards, dispose semantics.

mod common;

use common::{Harness, effort_statement};
use core_blocks::{Action, BlockEnv, Phase};
use core_events::{Event, HandlerScope, names};
use core_output::{OutputStatement, OutputType};
use core_runtime::{BlockStack, RuntimeError, RuntimeLimits};
use core_script::{CodeStatement, StatementId};
use core_state::{CompletionReason, DisplayState, MemoryCriteria, MemoryValue};
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};

#[test]
fn next_advances_a_single_effort_block() {
    let mut h = Harness::new(vec![effort_statement(1, "Deadlift", Some(5), None)]);
    h.runtime.start();
    assert_eq!(h.runtime.depth(), 1);

    h.next(30_000);
    assert_eq!(h.runtime.depth(), 0);
    assert!(!h.runtime.is_running());
    let completions = h.recorder.of_type(OutputType::Completion);
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0].completion_reason, Some(CompletionReason::UserAdvance));
}

#[test]
fn a_self_queuing_handler_trips_the_iteration_guard() {
    let mut h = Harness::new(vec![effort_statement(1, "Deadlift", None, None)]);
    h.runtime.start();
    let depth_before = h.runtime.depth();

    h.runtime
        .register_handler(names::TICK, HandlerScope::Global, |_, args| {
            vec![Action::Dispatch(Event::new(names::TICK, args.now))]
        });
    h.tick(1_000);

    let max_iterations = h
        .runtime
        .errors()
        .iter()
        .filter(|e| matches!(e, RuntimeError::MaxIterations { limit: 20, .. }))
        .count();
    assert_eq!(max_iterations, 1, "turn aborted exactly once");
    assert_eq!(h.runtime.depth(), depth_before, "stack preserved");
    assert!(!h.runtime.is_halted(), "recoverable, not fatal");

    // The next turn runs normally.
    h.next(2_000);
    assert!(!h.runtime.is_running());
}

#[test]
fn handlers_fire_in_registration_order_and_so_do_their_actions() {
    let mut h = Harness::new(vec![effort_statement(1, "Deadlift", None, None)]);
    h.runtime.start();

    let log = Arc::new(Mutex::new(Vec::new()));
    let metric = |key: &str| OutputStatement {
        id: 0,
        output_type: OutputType::Metric,
        time_span: core_script::TimeSpan::instant(0),
        spans: Vec::new(),
        source_block_key: key.to_string(),
        source_statement_id: None,
        stack_level: 0,
        fragments: Vec::new(),
        completion_reason: None,
    };
    {
        let log = log.clone();
        let statement = metric("h1");
        h.runtime
            .register_handler("probe", HandlerScope::Global, move |_, _| {
                log.lock().unwrap().push("h1");
                vec![Action::EmitOutput(statement.clone())]
            });
    }
    {
        let log = log.clone();
        let statement = metric("h2");
        h.runtime
            .register_handler("probe", HandlerScope::Global, move |_, _| {
                log.lock().unwrap().push("h2");
                vec![Action::EmitOutput(statement.clone())]
            });
    }

    h.event("probe", 1_000);
    assert_eq!(*log.lock().unwrap(), vec!["h1", "h2"]);

    let metrics = h.recorder.of_type(OutputType::Metric);
    assert_eq!(metrics.len(), 2);
    assert_eq!(metrics[0].source_block_key, "h1");
    assert_eq!(metrics[1].source_block_key, "h2");
    assert!(metrics[0].id < metrics[1].id, "h1's action executed first");
}

#[test]
fn output_ids_increase_strictly_in_emission_order() {
    let mut h = Harness::new(vec![effort_statement(1, "Row", None, None)]);
    h.runtime.start();
    h.next(1_000);

    let ids: Vec<u64> = h.recorder.all().iter().map(|o| o.id).collect();
    assert!(!ids.is_empty());
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(ids[0], core_output::FIRST_OUTPUT_ID);
}

#[test]
fn every_output_of_a_turn_shares_the_frozen_clock() {
    let mut h = Harness::new(vec![effort_statement(1, "Row", None, None)]);
    h.runtime.start();
    let before = h.recorder.all().len();

    h.next(123_456);
    let turn_outputs: Vec<OutputStatement> =
        h.recorder.all().into_iter().skip(before).collect();
    assert!(turn_outputs.len() >= 3, "system next, completion, system pop");
    for output in &turn_outputs {
        assert_eq!(output.time_span.ended, Some(123_456));
        for fragment in &output.fragments {
            assert_eq!(fragment.timestamp, Some(123_456));
        }
    }
}

#[test]
fn overflowing_the_stack_is_fatal_and_leaves_the_stack_intact() {
    // Four nested groups under a depth bound of three.
    let mut statements: Vec<CodeStatement> = Vec::new();
    for id in 1..=3u32 {
        let mut s = CodeStatement::new(id);
        if id > 1 {
            s.parent = Some(StatementId(id - 1));
        }
        s.children = vec![vec![StatementId(id + 1)]];
        statements.push(s);
    }
    statements.push(effort_statement(4, "Row", None, Some(3)));

    let mut h = Harness::with_limits(
        statements,
        RuntimeLimits {
            max_stack_depth: 3,
            max_turn_iterations: 100,
        },
    );
    h.runtime.start();

    assert!(h.runtime.is_halted());
    assert_eq!(h.runtime.depth(), 3, "refused push left the stack as-is");
    assert!(h
        .runtime
        .errors()
        .iter()
        .any(|e| matches!(e, RuntimeError::StackOverflow { .. }) && e.is_fatal()));

    // A halted runtime ignores further input.
    let outputs_before = h.recorder.all().len();
    h.next(9_000);
    assert_eq!(h.recorder.all().len(), outputs_before);
}

#[test]
fn raw_stack_honors_the_default_bound_of_ten() {
    let mut keys = core_state::KeySource::default();
    let mut stack = BlockStack::default();
    for n in 0..10 {
        let block = core_blocks::BlockBuilder::new(
            keys.fresh(),
            core_blocks::BlockKind::Effort,
            format!("b{n}"),
        )
        .pop_on_next()
        .finish()
        .unwrap();
        stack.push(block).unwrap();
    }
    let eleventh = core_blocks::BlockBuilder::new(
        keys.fresh(),
        core_blocks::BlockKind::Effort,
        "overflow",
    )
    .pop_on_next()
    .finish()
    .unwrap();
    assert!(stack.push(eleventh).is_err());
    assert_eq!(stack.depth(), 10);
}

#[test]
fn dispose_releases_memory_and_quiets_subscribers() {
    let mut h = Harness::new(vec![effort_statement(1, "Row", None, None)]);
    h.runtime.start();
    let key = h.runtime.current_key().unwrap();

    let display_entries = h.runtime.search_memory(
        &MemoryCriteria::owned_by(key).and_tag(core_state::MemoryTag::Display),
    );
    assert_eq!(display_entries.len(), 1);
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = seen.clone();
        h.runtime
            .subscribe_memory(display_entries[0], move |value| {
                seen.lock().unwrap().push(value.clone());
            })
            .unwrap();
    }

    h.next(1_000);

    // Release notified exactly once, with the tag's empty value.
    let calls = seen.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0], MemoryValue::Display(DisplayState::default()));
    // No orphan entries survive the owner.
    assert!(h.runtime.search_memory(&MemoryCriteria::owned_by(key)).is_empty());

    // Nothing can wake the subscription again.
    h.tick(2_000);
    h.next(3_000);
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn block_dispose_is_idempotent() {
    let mut keys = core_state::KeySource::default();
    let mut memory = core_state::MemoryArena::default();
    let mut bus = core_events::EventBus::default();
    let mut block = core_blocks::BlockBuilder::new(
        keys.fresh(),
        core_blocks::BlockKind::Effort,
        "Row",
    )
    .display(None)
    .pop_on_next()
    .finish()
    .unwrap();

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
    assert!(failures.is_empty());
    assert!(memory.len() > 0);

    assert!(block.dispose(&mut memory, &mut bus));
    assert_eq!(memory.len(), 0);
    // Second dispose is a no-op.
    assert!(!block.dispose(&mut memory, &mut bus));
}
