//! Fragment compilers.
//!
//! Each fragment kind has a small compiler deciding what (if anything) the
//! kind contributes to a block's `fragment:display` set. Metric kinds pass
//! through; structural kinds (laps, sounds, runtime measurements) compile to
//! nothing — they drive behavior composition instead of display.
//!
//! Inheritance happens here too: a child compiled under a rep scheme gets a
//! compiler-origin `Rep` fragment when its own statement carries none.

use core_blocks::CompileContext;
use core_script::{CodeStatement, Fragment, FragmentKind, FragmentOrigin};

/// One fragment kind's contribution to the display set.
fn compile_fragment(fragment: &Fragment) -> Option<Fragment> {
    match &fragment.kind {
        // Metric kinds: displayed as-is.
        FragmentKind::Duration { .. }
        | FragmentKind::Rep { .. }
        | FragmentKind::Rounds { .. }
        | FragmentKind::Effort { .. }
        | FragmentKind::Resistance { .. }
        | FragmentKind::Distance { .. }
        | FragmentKind::Action { .. }
        | FragmentKind::Increment { .. }
        | FragmentKind::Text { .. }
        | FragmentKind::Timer { .. } => Some(fragment.clone()),
        // Structural kinds: no display metric.
        FragmentKind::Lap { .. }
        | FragmentKind::Sound { .. }
        | FragmentKind::Spans { .. }
        | FragmentKind::Elapsed { .. }
        | FragmentKind::Total { .. }
        | FragmentKind::SystemTime { .. }
        | FragmentKind::System { .. } => None,
    }
}

/// Compile the display set for a group of statements under an inherited
/// context.
pub fn compile_display(statements: &[&CodeStatement], ctx: &CompileContext) -> Vec<Fragment> {
    let mut display: Vec<Fragment> = statements
        .iter()
        .flat_map(|s| s.fragments.iter())
        .filter_map(compile_fragment)
        .collect();

    let has_local_reps = display
        .iter()
        .any(|f| matches!(f.kind, FragmentKind::Rep { .. }));
    if !has_local_reps && let Some(count) = ctx.reps {
        display.push(Fragment::new(
            FragmentKind::Rep { count },
            FragmentOrigin::Compiler,
        ));
    }
    display
}
