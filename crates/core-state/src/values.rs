//! Typed memory values.
//!
//! The value schema of an entry is determined by its tag: `timer` holds a
//! `TimerState`, `round` a `RoundState`, and so on. `MemoryValue` is the
//! closed sum over all schemas; `custom:` tags carry JSON so host extensions
//! do not need a crate change.

use crate::tag::MemoryTag;
use core_clock::Millis;
use core_script::{Fragment, TimeSpan, TimerDirection};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which timer a multi-timer display should feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerRole {
    #[default]
    Primary,
    Secondary,
}

/// State of one timer: direction, optional bound, and its pause-aware spans.
///
/// Invariant: at most one span is open at any time. `open_span` and
/// `close_open_span` are no-ops (returning `false`) when the invariant
/// already holds the requested way, which makes double-pause and
/// double-resume idempotent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerState {
    pub direction: TimerDirection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<Millis>,
    #[serde(default)]
    pub spans: Vec<TimeSpan>,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub role: TimerRole,
}

impl Default for TimerState {
    fn default() -> Self {
        Self {
            direction: TimerDirection::Up,
            duration_ms: None,
            spans: Vec::new(),
            label: String::new(),
            role: TimerRole::Primary,
        }
    }
}

impl TimerState {
    pub fn new(direction: TimerDirection, duration_ms: Option<Millis>, label: &str) -> Self {
        Self {
            direction,
            duration_ms,
            label: label.to_string(),
            ..Self::default()
        }
    }

    pub fn has_open_span(&self) -> bool {
        self.spans.iter().any(TimeSpan::is_open)
    }

    /// Open a new span at `now`. Returns false if one is already open.
    pub fn open_span(&mut self, now: Millis) -> bool {
        if self.has_open_span() {
            return false;
        }
        self.spans.push(TimeSpan::open(now));
        true
    }

    /// Close the open span at `now`. Returns false if none is open.
    pub fn close_open_span(&mut self, now: Millis) -> bool {
        match self.spans.iter_mut().find(|s| s.is_open()) {
            Some(span) => {
                span.ended = Some(now);
                true
            }
            None => false,
        }
    }

    /// Pause-aware elapsed time: `Σ (min(end, now) − start)` over all spans.
    pub fn elapsed(&self, now: Millis) -> Millis {
        self.spans.iter().map(|s| s.duration_until(now)).sum()
    }

    /// Wall-clock extent including paused gaps: last end (or `now` for the
    /// open span) minus first start.
    pub fn total(&self, now: Millis) -> Millis {
        let first = match self.spans.first() {
            Some(span) => span.started,
            None => return 0,
        };
        let last = self
            .spans
            .iter()
            .map(|s| s.ended.unwrap_or(now).min(now))
            .max()
            .unwrap_or(first);
        last.saturating_sub(first)
    }

    /// Remaining time for a bounded timer; `None` when unbounded.
    pub fn remaining(&self, now: Millis) -> Option<Millis> {
        self.duration_ms
            .map(|d| d.saturating_sub(self.elapsed(now)))
    }

    pub fn is_expired(&self, now: Millis) -> bool {
        match self.duration_ms {
            Some(d) => self.elapsed(now) >= d,
            None => false,
        }
    }
}

/// Bound of a rounds block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundTotal {
    Bounded(u32),
    Unbounded,
}

impl fmt::Display for RoundTotal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundTotal::Bounded(n) => write!(f, "{n}"),
            RoundTotal::Unbounded => write!(f, "∞"),
        }
    }
}

/// Current/total round counter. `current` starts at 1 and advances past
/// `total` when the final round finishes (a 3-round block ends at 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundState {
    pub current: u32,
    pub total: RoundTotal,
}

impl Default for RoundState {
    fn default() -> Self {
        Self {
            current: 1,
            total: RoundTotal::Unbounded,
        }
    }
}

impl RoundState {
    pub fn bounded(total: u32) -> Self {
        Self {
            current: 1,
            total: RoundTotal::Bounded(total),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        match self.total {
            RoundTotal::Bounded(total) => self.current > total,
            RoundTotal::Unbounded => false,
        }
    }
}

/// Why a block completed. Stable external strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompletionReason {
    UserAdvance,
    ForcedPop,
    TimerExpired,
    RoundsComplete,
    External,
}

impl fmt::Display for CompletionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompletionReason::UserAdvance => "user-advance",
            CompletionReason::ForcedPop => "forced-pop",
            CompletionReason::TimerExpired => "timer-expired",
            CompletionReason::RoundsComplete => "rounds-complete",
            CompletionReason::External => "external",
        };
        f.write_str(s)
    }
}

/// Completion flag plus the first reason recorded. Later reasons never
/// overwrite the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompletionState {
    pub is_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<CompletionReason>,
}

impl CompletionState {
    pub fn complete(reason: CompletionReason) -> Self {
        Self {
            is_complete: true,
            reason: Some(reason),
        }
    }
}

/// What a UI should show for a block.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DisplayState {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// "Round 2/3" style line, maintained by the round display behavior.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round_label: Option<String>,
}

/// A control surfaced to the UI. Clicking dispatches `event`; the bound
/// handler re-dispatches `emits` into the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlButton {
    pub label: String,
    pub event: String,
    pub emits: String,
}

impl ControlButton {
    pub fn new(label: &str, event: &str, emits: &str) -> Self {
        Self {
            label: label.to_string(),
            event: event.to_string(),
            emits: emits.to_string(),
        }
    }
}

/// Closed sum over all tag schemas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryValue {
    Timer(TimerState),
    Round(RoundState),
    Completion(CompletionState),
    Display(DisplayState),
    Controls(Vec<ControlButton>),
    Fragments(Vec<Fragment>),
    /// Raw id of an event-bus handler, mirrored into memory so handler
    /// lifetime is coupled to its owner's dispose.
    Handler(u64),
    /// Cursor values (`custom:child-index`).
    Index(usize),
    /// Flags and extension payloads for `custom:`/`anchor:` tags.
    Json(serde_json::Value),
}

impl MemoryValue {
    /// The "empty" value a disposing owner sends to subscribers: the reset
    /// struct for struct tags, the empty list for list tags, JSON null
    /// otherwise.
    pub fn empty_for(tag: &MemoryTag) -> MemoryValue {
        match tag {
            MemoryTag::Timer => MemoryValue::Timer(TimerState::default()),
            MemoryTag::Round => MemoryValue::Round(RoundState::default()),
            MemoryTag::Completion => MemoryValue::Completion(CompletionState::default()),
            MemoryTag::Display => MemoryValue::Display(DisplayState::default()),
            MemoryTag::Controls => MemoryValue::Controls(Vec::new()),
            MemoryTag::FragmentDisplay | MemoryTag::FragmentTracked => {
                MemoryValue::Fragments(Vec::new())
            }
            MemoryTag::Handler => MemoryValue::Handler(0),
            MemoryTag::Anchor(_) | MemoryTag::Custom(_) => {
                MemoryValue::Json(serde_json::Value::Null)
            }
        }
    }

    pub fn as_timer(&self) -> Option<&TimerState> {
        match self {
            MemoryValue::Timer(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_timer_mut(&mut self) -> Option<&mut TimerState> {
        match self {
            MemoryValue::Timer(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_round(&self) -> Option<&RoundState> {
        match self {
            MemoryValue::Round(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_round_mut(&mut self) -> Option<&mut RoundState> {
        match self {
            MemoryValue::Round(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_completion(&self) -> Option<&CompletionState> {
        match self {
            MemoryValue::Completion(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_display_mut(&mut self) -> Option<&mut DisplayState> {
        match self {
            MemoryValue::Display(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_fragments(&self) -> Option<&[Fragment]> {
        match self {
            MemoryValue::Fragments(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_fragments_mut(&mut self) -> Option<&mut Vec<Fragment>> {
        match self {
            MemoryValue::Fragments(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_index(&self) -> Option<usize> {
        match self {
            MemoryValue::Index(i) => Some(*i),
            _ => None,
        }
    }
}
