//! Parsed workout statements: the input contract of the execution engine.
//!
//! The parser (an external collaborator) produces a flat list of
//! `CodeStatement`s, one per source line, linked into a tree by `parent` and
//! lap-grouped `children`. This crate defines that contract plus the fragment
//! and span vocabulary shared with the output stream; it never interprets
//! statements itself — the compiler does.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

mod fragment;
mod span;

pub use fragment::{Fragment, FragmentKind, FragmentOrigin, SoundTrigger, TimerDirection};
pub use span::{SourceSpan, TimeSpan};

/// Statement identifier: the source line number the parser assigned.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct StatementId(pub u32);

impl fmt::Display for StatementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One parsed statement. Immutable once produced by the parser.
///
/// `children` is a list of lap groups: siblings joined by a compose separator
/// share one group and compile into a single child block; each other child
/// line is its own group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeStatement {
    pub id: StatementId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<StatementId>,
    #[serde(default)]
    pub children: Vec<Vec<StatementId>>,
    #[serde(default)]
    pub fragments: Vec<Fragment>,
    #[serde(default)]
    pub meta: SourceSpan,
}

impl CodeStatement {
    pub fn new(id: u32) -> Self {
        Self {
            id: StatementId(id),
            parent: None,
            children: Vec::new(),
            fragments: Vec::new(),
            meta: SourceSpan {
                line: id,
                start: 0,
                end: 0,
            },
        }
    }

    pub fn has_children(&self) -> bool {
        self.children.iter().any(|group| !group.is_empty())
    }

    /// First fragment matching `pick`, in fragment order.
    pub fn find_fragment<'a, T>(
        &'a self,
        pick: impl Fn(&'a FragmentKind) -> Option<T>,
    ) -> Option<T> {
        self.fragments.iter().find_map(|f| pick(&f.kind))
    }

    pub fn timer(&self) -> Option<(TimerDirection, Option<u64>)> {
        self.find_fragment(|k| match k {
            FragmentKind::Timer {
                direction,
                duration_ms,
            } => Some((*direction, *duration_ms)),
            _ => None,
        })
    }

    pub fn rounds(&self) -> Option<u32> {
        self.find_fragment(|k| match k {
            FragmentKind::Rounds { count } => Some(*count),
            _ => None,
        })
    }

    /// All rep counts in order. More than one forms a rep scheme (21-15-9)
    /// interpreted per round by the compiler.
    pub fn rep_scheme(&self) -> Vec<u32> {
        self.fragments
            .iter()
            .filter_map(|f| match &f.kind {
                FragmentKind::Rep { count } => Some(*count),
                _ => None,
            })
            .collect()
    }

    pub fn effort_label(&self) -> Option<&str> {
        self.find_fragment(|k| match k {
            FragmentKind::Effort { label } => Some(label.as_str()),
            _ => None,
        })
    }

    /// Action label match, case-insensitive ("EMOM", "AMRAP").
    pub fn has_action(&self, label: &str) -> bool {
        self.fragments.iter().any(|f| match &f.kind {
            FragmentKind::Action { label: l, .. } => l.eq_ignore_ascii_case(label),
            _ => false,
        })
    }

    /// Display label: effort text, then free text, then empty.
    pub fn label(&self) -> String {
        if let Some(effort) = self.effort_label() {
            return effort.to_string();
        }
        self.find_fragment(|k| match k {
            FragmentKind::Text { value, .. } => Some(value.clone()),
            _ => None,
        })
        .unwrap_or_default()
    }
}

/// Statement lookup table preserving parser order.
///
/// The compiler resolves child ids through this table at block-construction
/// time; unresolvable ids are reported, not panicked on.
#[derive(Debug, Clone, Default)]
pub struct StatementTable {
    order: Vec<StatementId>,
    by_id: HashMap<StatementId, CodeStatement>,
}

/// Problems building a statement table from parser output.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ScriptError {
    #[error("duplicate statement id {0}")]
    DuplicateId(StatementId),
}

impl StatementTable {
    pub fn from_statements(
        statements: impl IntoIterator<Item = CodeStatement>,
    ) -> Result<Self, ScriptError> {
        let mut table = Self::default();
        for statement in statements {
            if table.by_id.contains_key(&statement.id) {
                return Err(ScriptError::DuplicateId(statement.id));
            }
            table.order.push(statement.id);
            table.by_id.insert(statement.id, statement);
        }
        Ok(table)
    }

    pub fn get(&self, id: StatementId) -> Option<&CodeStatement> {
        self.by_id.get(&id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Top-level statements (no parent) in source order.
    pub fn roots(&self) -> Vec<&CodeStatement> {
        self.order
            .iter()
            .filter_map(|id| self.by_id.get(id))
            .filter(|s| s.parent.is_none())
            .collect()
    }

    /// Resolve a group of ids, dropping (and reporting) unknown ones.
    pub fn resolve<'a>(
        &'a self,
        ids: &[StatementId],
    ) -> (Vec<&'a CodeStatement>, Vec<StatementId>) {
        let mut found = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();
        for id in ids {
            match self.by_id.get(id) {
                Some(s) => found.push(s),
                None => missing.push(*id),
            }
        }
        (found, missing)
    }
}
