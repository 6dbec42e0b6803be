//! Timer block scenarios: expiry, pause arithmetic, zero-duration bounds.

mod common;

use common::{Harness, timer_statement};
use core_events::{HandlerScope, names};
use core_output::OutputType;
use core_script::{FragmentKind, TimerDirection};
use core_state::{CompletionReason, MemoryCriteria, MemoryTag, MemoryValue};
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};

#[test]
fn ten_second_count_up_runs_to_completion() {
    let mut h = Harness::new(vec![timer_statement(1, TimerDirection::Up, Some(10_000))]);

    let completions = Arc::new(Mutex::new(0u32));
    {
        let completions = completions.clone();
        h.runtime
            .register_handler(names::TIMER_COMPLETE, HandlerScope::Global, move |_, _| {
                *completions.lock().unwrap() += 1;
                Vec::new()
            });
    }

    h.runtime.start();
    let segments = h.recorder.of_type(OutputType::Segment);
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].stack_level, 1);
    let root_key = segments[0].source_block_key.clone();

    // Under-threshold ticks change nothing.
    h.tick(4_000);
    h.tick(9_999);
    assert!(h.runtime.is_running());

    h.tick(10_000);
    assert!(!h.runtime.is_running());
    assert_eq!(*completions.lock().unwrap(), 1, "exactly one timer:complete");

    let completed = h.recorder.of_type(OutputType::Completion);
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].source_block_key, root_key);
    assert_eq!(completed[0].completion_reason, Some(CompletionReason::TimerExpired));
    let elapsed: Vec<_> = completed[0]
        .fragments
        .iter()
        .filter_map(|f| match f.kind {
            FragmentKind::Elapsed { ms } => Some(ms),
            _ => None,
        })
        .collect();
    assert_eq!(elapsed, vec![10_000], "one elapsed fragment with the bound");
    assert!(h.runtime.errors().is_empty());
}

#[test]
fn pause_arithmetic_matches_the_canonical_timeline() {
    let mut h = Harness::new(vec![timer_statement(1, TimerDirection::Down, Some(60_000))]);
    h.runtime.start();

    // start 0, pause 10s, resume 15s, observe 20s.
    h.event(names::PAUSE, 10_000);
    h.event(names::RESUME, 15_000);
    h.clock.set(20_000);
    h.tick(20_000);

    let timer_entries = h
        .runtime
        .search_memory(&MemoryCriteria::tagged(MemoryTag::Timer));
    assert_eq!(timer_entries.len(), 1);
    let Some(MemoryValue::Timer(timer)) = h.runtime.peek_memory(timer_entries[0]) else {
        panic!("timer value expected");
    };
    assert_eq!(timer.elapsed(20_000), 15_000);
    assert_eq!(timer.total(20_000), 20_000);
    assert_eq!(timer.remaining(20_000), Some(45_000));
    assert!(h.runtime.is_running(), "45s remain; not complete");
}

#[test]
fn double_pause_keeps_one_closed_span() {
    let mut h = Harness::new(vec![timer_statement(1, TimerDirection::Up, Some(60_000))]);
    h.runtime.start();
    h.event(names::PAUSE, 5_000);
    h.event(names::PAUSE, 8_000);

    let entries = h
        .runtime
        .search_memory(&MemoryCriteria::tagged(MemoryTag::Timer));
    let Some(MemoryValue::Timer(timer)) = h.runtime.peek_memory(entries[0]) else {
        panic!("timer value expected");
    };
    assert_eq!(timer.spans.len(), 1);
    assert_eq!(timer.spans[0].ended, Some(5_000), "first pause wins");
}

#[test]
fn zero_duration_timer_completes_in_its_mount_turn() {
    let mut h = Harness::new(vec![timer_statement(1, TimerDirection::Down, Some(0))]);
    h.runtime.start();
    assert!(!h.runtime.is_running());
    let completed = h.recorder.of_type(OutputType::Completion);
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].completion_reason, Some(CompletionReason::TimerExpired));
}

#[test]
fn unbounded_timer_advances_on_next() {
    let mut h = Harness::new(vec![timer_statement(1, TimerDirection::Up, None)]);
    h.runtime.start();
    h.tick(120_000);
    assert!(h.runtime.is_running(), "no bound, no expiry");
    h.next(150_000);
    assert!(!h.runtime.is_running());
    let completed = h.recorder.of_type(OutputType::Completion);
    assert_eq!(completed[0].completion_reason, Some(CompletionReason::UserAdvance));
}
