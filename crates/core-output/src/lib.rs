//! The append-only output stream.
//!
//! Every observable result of a workout — segments, milestones, completions,
//! system transitions — is an `OutputStatement` published through exactly one
//! sink, `OutputStream::publish`. The sink stamps the monotonic id (starting
//! at 1_000_000), appends, and notifies subscribers synchronously in
//! subscription order. Statements are immutable after emission.
//!
//! `system` outputs coexist with semantic outputs; there is no producer-side
//! filter. Consumers that only want semantic outputs filter on
//! `output_type` (the bin's printer does, unless asked otherwise).

use core_clock::Millis;
use core_script::{Fragment, FragmentKind, StatementId, TimeSpan};
use core_state::{BlockKey, CompletionReason};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// First id handed out by a stream. Ids below this are free for host use.
pub const FIRST_OUTPUT_ID: u64 = 1_000_000;

/// Category of an output statement. Stable external strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputType {
    Segment,
    Completion,
    Milestone,
    Label,
    Metric,
    System,
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutputType::Segment => "segment",
            OutputType::Completion => "completion",
            OutputType::Milestone => "milestone",
            OutputType::Label => "label",
            OutputType::Metric => "metric",
            OutputType::System => "system",
        };
        f.write_str(s)
    }
}

/// One immutable record on the stream. The schema is the stable contract
/// analytics and UI consume; see the fragment vocabulary in `core-script`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputStatement {
    /// Monotonic, stamped by the sink. Zero until published.
    pub id: u64,
    pub output_type: OutputType,
    pub time_span: TimeSpan,
    /// Pause-aware spans copied from the emitting block's timer memory;
    /// empty when the block has no timer (and for system outputs).
    #[serde(default)]
    pub spans: Vec<TimeSpan>,
    pub source_block_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_statement_id: Option<StatementId>,
    pub stack_level: usize,
    #[serde(default)]
    pub fragments: Vec<Fragment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_reason: Option<CompletionReason>,
}

/// Stack transition kinds that produce `system` outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemTransition {
    Push,
    Pop,
    Next,
}

impl SystemTransition {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemTransition::Push => "push",
            SystemTransition::Pop => "pop",
            SystemTransition::Next => "next",
        }
    }
}

/// The one factory for push/pop/next system outputs. All three runtime call
/// sites go through here so the external shape cannot drift.
pub fn system_output(
    transition: SystemTransition,
    block_key: BlockKey,
    block_label: &str,
    stack_level: usize,
    now: Millis,
    extra: Vec<Fragment>,
) -> OutputStatement {
    let mut fragments = vec![
        Fragment::runtime(FragmentKind::System {
            kind: transition.as_str().to_string(),
            payload: serde_json::json!({ "label": block_label }),
        })
        .attributed(&block_key.to_string(), now),
    ];
    fragments.extend(extra);
    OutputStatement {
        id: 0,
        output_type: OutputType::System,
        time_span: TimeSpan::instant(now),
        spans: Vec::new(),
        source_block_key: block_key.to_string(),
        source_statement_id: None,
        stack_level,
        fragments,
        completion_reason: None,
    }
}

/// Handle returned by `subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSubscriberId(u64);

type OutputSubscriberFn = Box<dyn FnMut(&OutputStatement) + Send>;

struct OutputSubscriber {
    id: OutputSubscriberId,
    callback: OutputSubscriberFn,
}

/// Append-only sink plus its subscriber list.
#[derive(Default)]
pub struct OutputStream {
    entries: Vec<OutputStatement>,
    subscribers: Vec<OutputSubscriber>,
    emitted: u64,
}

impl fmt::Debug for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputStream")
            .field("entries", &self.entries.len())
            .field("subscribers", &self.subscribers.len())
            .finish_non_exhaustive()
    }
}

impl OutputStream {
    /// Stamp, append, notify. Returns the assigned id.
    pub fn publish(&mut self, mut statement: OutputStatement) -> u64 {
        let id = FIRST_OUTPUT_ID + self.emitted;
        self.emitted += 1;
        statement.id = id;
        tracing::debug!(
            target: "output",
            id,
            output_type = %statement.output_type,
            source = %statement.source_block_key,
            level = statement.stack_level,
            "publish"
        );
        self.entries.push(statement);
        let statement = self.entries.last().expect("just pushed");
        for sub in &mut self.subscribers {
            let result = catch_unwind(AssertUnwindSafe(|| (sub.callback)(statement)));
            if result.is_err() {
                tracing::error!(target: "output", id, "output subscriber panicked");
            }
        }
        id
    }

    pub fn subscribe(
        &mut self,
        callback: impl FnMut(&OutputStatement) + Send + 'static,
    ) -> OutputSubscriberId {
        let id = OutputSubscriberId(self.subscribers.len() as u64 + 1);
        self.subscribers.push(OutputSubscriber {
            id,
            callback: Box::new(callback),
        });
        id
    }

    pub fn unsubscribe(&mut self, id: OutputSubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        self.subscribers.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutputStatement> {
        self.entries.iter()
    }

    /// Semantic view: everything except `system` outputs.
    pub fn semantic(&self) -> impl Iterator<Item = &OutputStatement> {
        self.entries
            .iter()
            .filter(|o| o.output_type != OutputType::System)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_state::KeySource;
    use std::sync::{Arc, Mutex};

    fn statement(key: &str) -> OutputStatement {
        OutputStatement {
            id: 0,
            output_type: OutputType::Segment,
            time_span: TimeSpan::instant(0),
            spans: Vec::new(),
            source_block_key: key.to_string(),
            source_statement_id: None,
            stack_level: 1,
            fragments: Vec::new(),
            completion_reason: None,
        }
    }

    #[test]
    fn ids_are_monotonic_from_the_base() {
        let mut stream = OutputStream::default();
        let a = stream.publish(statement("blk-1"));
        let b = stream.publish(statement("blk-1"));
        assert_eq!(a, FIRST_OUTPUT_ID);
        assert_eq!(b, FIRST_OUTPUT_ID + 1);
    }

    #[test]
    fn subscribers_see_emission_order() {
        let mut stream = OutputStream::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = seen.clone();
            stream.subscribe(move |o| seen.lock().unwrap().push(o.id));
        }
        stream.publish(statement("blk-1"));
        stream.publish(statement("blk-2"));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![FIRST_OUTPUT_ID, FIRST_OUTPUT_ID + 1]
        );
    }

    #[test]
    fn unsubscribed_callbacks_stop_firing() {
        let mut stream = OutputStream::default();
        let count = Arc::new(Mutex::new(0));
        let sub = {
            let count = count.clone();
            stream.subscribe(move |_| *count.lock().unwrap() += 1)
        };
        stream.publish(statement("blk-1"));
        assert!(stream.unsubscribe(sub));
        stream.publish(statement("blk-1"));
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn system_factory_shapes_are_uniform() {
        let mut keys = KeySource::default();
        let key = keys.fresh();
        let out = system_output(SystemTransition::Pop, key, "Warmup", 2, 42, Vec::new());
        assert_eq!(out.output_type, OutputType::System);
        assert_eq!(out.time_span, TimeSpan::instant(42));
        assert_eq!(out.stack_level, 2);
        assert_eq!(out.source_block_key, key.to_string());
        match &out.fragments[0].kind {
            FragmentKind::System { kind, payload } => {
                assert_eq!(kind, "pop");
                assert_eq!(payload["label"], "Warmup");
            }
            other => panic!("expected system fragment, got {other:?}"),
        }
    }

    #[test]
    fn semantic_view_hides_system_outputs() {
        let mut keys = KeySource::default();
        let key = keys.fresh();
        let mut stream = OutputStream::default();
        stream.publish(statement("blk-1"));
        stream.publish(system_output(
            SystemTransition::Push,
            key,
            "x",
            1,
            0,
            Vec::new(),
        ));
        assert_eq!(stream.len(), 2);
        assert_eq!(stream.semantic().count(), 1);
    }
}
