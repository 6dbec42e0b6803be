//! Time-bound containers: AMRAP (unbounded rounds under a timer) and EMOM
//! (interval rollover).

mod common;

use common::{Harness, action_fragment, effort_statement, timer_statement};
use core_output::OutputType;
use core_script::{CodeStatement, StatementId, TimerDirection};
use core_state::{CompletionReason, MemoryCriteria, MemoryTag, MemoryValue, RoundTotal};
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};

fn amrap_script(duration_ms: u64) -> Vec<CodeStatement> {
    let mut container = timer_statement(1, TimerDirection::Down, Some(duration_ms));
    container.fragments.push(action_fragment("AMRAP"));
    container.children = vec![vec![StatementId(2)]];
    vec![container, effort_statement(2, "Burpees", None, Some(1))]
}

fn emom_script(interval_ms: u64, rounds: u32) -> Vec<CodeStatement> {
    let mut container = timer_statement(1, TimerDirection::Up, Some(interval_ms));
    container.fragments.push(action_fragment("EMOM"));
    container
        .fragments
        .push(core_script::Fragment::parser(core_script::FragmentKind::Rounds { count: rounds }));
    container.children = vec![vec![StatementId(2)]];
    vec![container, effort_statement(2, "Burpees", None, Some(1))]
}

#[test]
fn amrap_counts_rounds_until_the_timer_expires() {
    let mut h = Harness::new(amrap_script(600_000));
    h.runtime.start();

    // Track the container's round counter as work finishes.
    let round_entries = h
        .runtime
        .search_memory(&MemoryCriteria::tagged(MemoryTag::Round));
    let last = Arc::new(Mutex::new(None));
    {
        let last = last.clone();
        h.runtime
            .subscribe_memory(round_entries[0], move |value| {
                // Real advances only; the dispose-time reset value is a
                // fresh counter at 1.
                if let MemoryValue::Round(round) = value
                    && round.current > 1
                {
                    *last.lock().unwrap() = Some(*round);
                }
            })
            .unwrap();
    }

    // Two full rounds of burpees before time runs out.
    h.next(200_000);
    h.next(400_000);
    assert!(h.runtime.is_running());

    h.tick(600_000);
    assert!(!h.runtime.is_running());

    // The child on top was forced off; the container expired.
    let completions = h.recorder.of_type(OutputType::Completion);
    let child = &completions[completions.len() - 2];
    let container = completions.last().unwrap();
    assert_eq!(child.completion_reason, Some(CompletionReason::ForcedPop));
    assert_eq!(container.completion_reason, Some(CompletionReason::TimerExpired));

    // Two finished rounds put the counter at 3; total never materialized.
    let observed = last.lock().unwrap().expect("round updates observed");
    assert_eq!(observed.current, 3);
    assert_eq!(observed.total, RoundTotal::Unbounded);
}

#[test]
fn emom_rolls_rounds_at_interval_boundaries() {
    let mut h = Harness::new(emom_script(60_000, 3));
    h.runtime.start();

    // Round 1 work finishes early; the runner waits for the minute.
    h.next(10_000);
    assert!(h.runtime.is_running());
    assert_eq!(h.recorder.of_type(OutputType::Milestone).len(), 1);

    // Minute 1 boundary starts round 2.
    h.tick(60_000);
    assert!(h.runtime.is_running());
    assert_eq!(h.recorder.of_type(OutputType::Milestone).len(), 2);

    // Round 2 work runs long; the boundary cuts it short.
    h.tick(120_000);
    assert_eq!(h.recorder.of_type(OutputType::Milestone).len(), 3);
    let forced: Vec<_> = h
        .recorder
        .of_type(OutputType::Completion)
        .into_iter()
        .filter(|o| o.completion_reason == Some(CompletionReason::ForcedPop))
        .collect();
    assert_eq!(forced.len(), 1, "round 2 child was cut at the boundary");

    // Final boundary ends the block; the overall timer owns the reason.
    h.next(130_000);
    h.tick(180_000);
    assert!(!h.runtime.is_running());
    let container = h
        .recorder
        .of_type(OutputType::Completion)
        .pop()
        .unwrap();
    assert_eq!(container.completion_reason, Some(CompletionReason::TimerExpired));
    // No fourth milestone: completion precedes the would-be round 4.
    assert_eq!(h.recorder.of_type(OutputType::Milestone).len(), 3);
    assert!(h.runtime.errors().is_empty());
}

#[test]
fn stop_unwinds_the_whole_stack_top_down() {
    let mut h = Harness::new(amrap_script(600_000));
    h.runtime.start();
    assert_eq!(h.runtime.depth(), 2, "container plus child");

    h.event(core_events::names::STOP, 90_000);
    assert!(!h.runtime.is_running());
    assert_eq!(h.runtime.depth(), 0);

    let completions = h.recorder.of_type(OutputType::Completion);
    assert_eq!(completions.len(), 2);
    // Child first (forced), container second (external).
    assert_eq!(completions[0].completion_reason, Some(CompletionReason::ForcedPop));
    assert_eq!(completions[1].completion_reason, Some(CompletionReason::External));
}
