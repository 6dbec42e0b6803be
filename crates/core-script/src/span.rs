//! Time spans and source spans.
//!
//! A `TimeSpan` is a half-open `[started, ended)` interval of wall time. A
//! running timer has exactly one open span (`ended == None`); pausing closes
//! it, resuming opens a new one. Elapsed time is always computed against an
//! explicit `now` so a frozen turn clock yields consistent arithmetic.

use core_clock::Millis;
use serde::{Deserialize, Serialize};

/// Half-open interval of wall time. `ended == None` means still open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSpan {
    pub started: Millis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended: Option<Millis>,
}

impl TimeSpan {
    pub fn open(started: Millis) -> Self {
        Self {
            started,
            ended: None,
        }
    }

    pub fn closed(started: Millis, ended: Millis) -> Self {
        Self {
            started,
            ended: Some(ended),
        }
    }

    /// Zero-duration span used by system outputs.
    pub fn instant(at: Millis) -> Self {
        Self::closed(at, at)
    }

    pub fn is_open(&self) -> bool {
        self.ended.is_none()
    }

    /// Duration of this span clamped at `now`. Open spans count up to `now`;
    /// closed spans that end after `now` (possible only with a skewed input
    /// stream) are clamped the same way.
    pub fn duration_until(&self, now: Millis) -> Millis {
        let end = self.ended.unwrap_or(now).min(now);
        end.saturating_sub(self.started)
    }
}

/// Source location carried by every statement: the line it came from and the
/// byte offsets of its text. Purely diagnostic; the runtime never interprets
/// offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceSpan {
    pub line: u32,
    #[serde(default)]
    pub start: u32,
    #[serde(default)]
    pub end: u32,
}
