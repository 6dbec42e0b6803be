//! Tagged fragments.
//!
//! Fragments are the typed values a statement carries ("30s", "3 Rounds",
//! "Pushups", "50lb") and the attributed values the runtime emits on the
//! output stream ("Elapsed 10000"). The kind set is a stable external
//! contract shared with the parser and analytics consumers; the serialized
//! form is internally tagged (`"kind": "timer"`, ...).
//!
//! Every fragment records its `origin` so consumers can distinguish parsed
//! source values from compiler-synthesized ones (inherited rep schemes) and
//! runtime measurements. Output attribution (`source_block_key`, `timestamp`)
//! is stamped when a fragment passes through a block's emission path.

use crate::span::TimeSpan;
use core_clock::Millis;
use serde::{Deserialize, Serialize};

/// Who produced a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FragmentOrigin {
    Parser,
    Compiler,
    Runtime,
    User,
}

/// Count direction of a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerDirection {
    Up,
    Down,
}

/// When a sound cue fires relative to its block's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoundTrigger {
    /// On block mount.
    Start,
    /// Once per remaining whole second at or below `seconds`.
    Countdown,
    /// On block unmount.
    Complete,
}

/// The typed payload of a fragment. Variant set is a stable contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FragmentKind {
    Duration {
        ms: Millis,
    },
    Rep {
        count: u32,
    },
    Rounds {
        count: u32,
    },
    Effort {
        label: String,
    },
    Resistance {
        value: f64,
        unit: String,
    },
    Distance {
        value: f64,
        unit: String,
    },
    Action {
        label: String,
        #[serde(default)]
        pinned: bool,
    },
    Increment {
        sign: i8,
    },
    Text {
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mode: Option<String>,
    },
    Lap {
        separator: String,
    },
    Sound {
        trigger: SoundTrigger,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seconds: Option<u32>,
    },
    Timer {
        direction: TimerDirection,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<Millis>,
    },
    Spans {
        spans: Vec<TimeSpan>,
    },
    Elapsed {
        ms: Millis,
    },
    Total {
        ms: Millis,
    },
    SystemTime {
        ms: Millis,
    },
    System {
        #[serde(rename = "system_kind")]
        kind: String,
        payload: serde_json::Value,
    },
}

impl FragmentKind {
    /// Stable name of the variant, used for fragment-type de-duplication in
    /// completion outputs and for analytics grouping.
    pub fn name(&self) -> &'static str {
        match self {
            FragmentKind::Duration { .. } => "duration",
            FragmentKind::Rep { .. } => "rep",
            FragmentKind::Rounds { .. } => "rounds",
            FragmentKind::Effort { .. } => "effort",
            FragmentKind::Resistance { .. } => "resistance",
            FragmentKind::Distance { .. } => "distance",
            FragmentKind::Action { .. } => "action",
            FragmentKind::Increment { .. } => "increment",
            FragmentKind::Text { .. } => "text",
            FragmentKind::Lap { .. } => "lap",
            FragmentKind::Sound { .. } => "sound",
            FragmentKind::Timer { .. } => "timer",
            FragmentKind::Spans { .. } => "spans",
            FragmentKind::Elapsed { .. } => "elapsed",
            FragmentKind::Total { .. } => "total",
            FragmentKind::SystemTime { .. } => "system-time",
            FragmentKind::System { .. } => "system",
        }
    }
}

/// A tagged value with provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    #[serde(flatten)]
    pub kind: FragmentKind,
    pub origin: FragmentOrigin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_block_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Millis>,
}

impl Fragment {
    pub fn new(kind: FragmentKind, origin: FragmentOrigin) -> Self {
        Self {
            kind,
            origin,
            source_block_key: None,
            timestamp: None,
        }
    }

    pub fn parser(kind: FragmentKind) -> Self {
        Self::new(kind, FragmentOrigin::Parser)
    }

    pub fn compiler(kind: FragmentKind) -> Self {
        Self::new(kind, FragmentOrigin::Compiler)
    }

    pub fn runtime(kind: FragmentKind) -> Self {
        Self::new(kind, FragmentOrigin::Runtime)
    }

    /// Stamp output attribution. Called by the emission path; earlier
    /// attribution (a fragment re-emitted by a parent) is overwritten so the
    /// emitting block always wins.
    pub fn attributed(mut self, block_key: &str, timestamp: Millis) -> Self {
        self.source_block_key = Some(block_key.to_string());
        self.timestamp = Some(timestamp);
        self
    }
}
