//! Rounds container scenarios: the 3×[pushups, squats] walkthrough, rep
//! scheme inheritance, and boundary shapes.

mod common;

use common::{Harness, effort_statement, rounds_statement};
use core_output::OutputType;
use core_script::{CodeStatement, Fragment, FragmentKind, StatementId};
use core_state::{CompletionReason, MemoryCriteria, MemoryTag, MemoryValue, RoundState};
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};

fn three_rounds_two_efforts() -> Vec<CodeStatement> {
    vec![
        rounds_statement(1, 3, vec![vec![2], vec![3]]),
        effort_statement(2, "Pushups", Some(10), Some(1)),
        effort_statement(3, "Squats", Some(20), Some(1)),
    ]
}

#[test]
fn three_rounds_of_two_efforts_emit_the_expected_stream() {
    let mut h = Harness::new(three_rounds_two_efforts());
    h.runtime.start();

    // Watch the container's round counter, remembering the last non-reset
    // value the subscription observes before dispose.
    let round_entries = h
        .runtime
        .search_memory(&MemoryCriteria::tagged(MemoryTag::Round));
    assert_eq!(round_entries.len(), 1);
    let last_round = Arc::new(Mutex::new(RoundState::default()));
    {
        let last_round = last_round.clone();
        h.runtime
            .subscribe_memory(round_entries[0], move |value| {
                if let MemoryValue::Round(round) = value
                    && round.current > 0
                    && round.total != core_state::RoundTotal::Unbounded
                {
                    *last_round.lock().unwrap() = *round;
                }
            })
            .unwrap();
    }

    // Six user advances: two efforts per round, three rounds.
    let mut t = 10_000;
    for _ in 0..6 {
        assert!(h.runtime.is_running());
        h.next(t);
        t += 10_000;
    }
    assert!(!h.runtime.is_running());

    let semantic = h.recorder.semantic();
    let segments: Vec<_> = semantic
        .iter()
        .filter(|o| o.output_type == OutputType::Segment)
        .collect();
    let milestones: Vec<_> = semantic
        .iter()
        .filter(|o| o.output_type == OutputType::Milestone)
        .collect();
    let completions: Vec<_> = semantic
        .iter()
        .filter(|o| o.output_type == OutputType::Completion)
        .collect();

    assert_eq!(segments.len(), 1, "one container segment");
    assert_eq!(milestones.len(), 3, "one milestone per round start");
    assert_eq!(completions.len(), 7, "six child completions plus the container");

    // The container's completion is the last one and carries the round count.
    let container = completions.last().unwrap();
    assert_eq!(container.completion_reason, Some(CompletionReason::RoundsComplete));
    assert!(container.fragments.iter().any(|f| matches!(
        f.kind,
        FragmentKind::Rounds { count: 3 }
    )));

    // The counter advanced past the total before unmount.
    assert_eq!(last_round.lock().unwrap().current, 4);
    assert!(h.runtime.errors().is_empty());
}

#[test]
fn child_completions_carry_their_effort_fragments() {
    let mut h = Harness::new(three_rounds_two_efforts());
    h.runtime.start();
    h.next(5_000);

    let completions = h.recorder.of_type(OutputType::Completion);
    assert_eq!(completions.len(), 1);
    let fragments = &completions[0].fragments;
    assert!(fragments.iter().any(|f| matches!(
        &f.kind,
        FragmentKind::Effort { label } if label == "Pushups"
    )));
    assert!(fragments
        .iter()
        .any(|f| matches!(f.kind, FragmentKind::Rep { count: 10 })));
    assert_eq!(completions[0].completion_reason, Some(CompletionReason::UserAdvance));
}

#[test]
fn rep_scheme_compiles_on_the_parent_and_reaches_children() {
    // (21-15-9) Pullups — scheme on the rounds line, no local rep fragment.
    let mut parent = CodeStatement::new(1);
    for count in [21u32, 15, 9] {
        parent
            .fragments
            .push(Fragment::parser(FragmentKind::Rep { count }));
    }
    parent.children = vec![vec![StatementId(2)]];
    let child = effort_statement(2, "Pullups", None, Some(1));

    let mut h = Harness::new(vec![parent, child]);
    h.runtime.start();

    // Round 1 child shows 21 inherited reps.
    let completions_after = |h: &Harness| h.recorder.of_type(OutputType::Completion);
    h.next(1_000);
    let first = completions_after(&h);
    assert!(first[0]
        .fragments
        .iter()
        .any(|f| matches!(f.kind, FragmentKind::Rep { count: 21 })));

    // Round 2 child shows 15.
    h.next(2_000);
    let second = completions_after(&h);
    assert!(second[1]
        .fragments
        .iter()
        .any(|f| matches!(f.kind, FragmentKind::Rep { count: 15 })));

    // Round 3 child shows 9, then the scheme is exhausted.
    h.next(3_000);
    assert!(!h.runtime.is_running());
    let third = completions_after(&h);
    assert!(third[2]
        .fragments
        .iter()
        .any(|f| matches!(f.kind, FragmentKind::Rep { count: 9 })));
}

#[test]
fn rest_groups_never_mount_but_still_close_the_lap() {
    // 2 rounds of [work, rest]: the rest line is skipped, not pushed, and
    // the lap still rolls over.
    let mut rest = CodeStatement::new(3);
    rest.parent = Some(StatementId(1));
    rest.fragments.push(Fragment::parser(FragmentKind::Action {
        label: "Rest".into(),
        pinned: false,
    }));
    let mut h = Harness::new(vec![
        rounds_statement(1, 2, vec![vec![2], vec![3]]),
        effort_statement(2, "Pushups", None, Some(1)),
        rest,
    ]);
    h.runtime.start();

    h.next(10_000);
    assert!(h.runtime.is_running(), "round 2 pending");
    h.next(20_000);
    assert!(!h.runtime.is_running());

    let completions = h.recorder.of_type(OutputType::Completion);
    assert_eq!(completions.len(), 3, "two work children plus the container");
    assert_eq!(h.recorder.of_type(OutputType::Milestone).len(), 2);
}

#[test]
fn empty_container_completes_immediately_with_rounds_complete() {
    let mut h = Harness::new(vec![rounds_statement(1, 3, Vec::new())]);
    h.runtime.start();
    assert!(!h.runtime.is_running());
    let completions = h.recorder.of_type(OutputType::Completion);
    assert_eq!(completions.len(), 1);
    assert_eq!(
        completions[0].completion_reason,
        Some(CompletionReason::RoundsComplete)
    );
}

#[test]
fn multi_root_scripts_run_each_root_in_order() {
    let mut h = Harness::new(vec![
        effort_statement(1, "Row", None, None),
        effort_statement(2, "Run", None, None),
    ]);
    h.runtime.start();
    h.next(1_000);
    assert!(h.runtime.is_running(), "second root still pending");
    h.next(2_000);
    assert!(!h.runtime.is_running());

    let completions = h.recorder.of_type(OutputType::Completion);
    let labels: Vec<String> = completions
        .iter()
        .flat_map(|o| o.fragments.iter())
        .filter_map(|f| match &f.kind {
            FragmentKind::Effort { label } => Some(label.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(labels, vec!["Row".to_string(), "Run".to_string()]);
}
