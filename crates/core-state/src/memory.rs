//! Tagged, block-owned memory with subscriptions.
//!
//! The arena is the only mutable state store in the engine. Entries are
//! owned by a block key and live until the owner's dispose; subscribers are
//! notified synchronously, in registration order, on every write — writes are
//! equality-insensitive, so callers that want change detection layer it on
//! top.
//!
//! Dispose semantics: `release_by_owner` notifies each subscriber exactly
//! once with the tag's empty value, clears the subscriber list, and removes
//! the entry. Nothing can re-trigger a callback for a released entry.
//!
//! A panicking subscriber is isolated: the panic is caught, logged under the
//! `memory` target, and the remaining subscribers are still notified.

use crate::key::BlockKey;
use crate::tag::MemoryTag;
use crate::values::MemoryValue;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Handle to a memory entry. Stable for the entry's lifetime; operations on
/// a released entry return `MemoryError::Missing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mem-{}", self.0)
    }
}

/// Handle returned by `subscribe`, used for O(1)-ish unsubscription without
/// back-pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberId(u64);

/// Advisory access label. The runtime does not enforce isolation across
/// blocks; ownership-based lifecycle is the only hard rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Private,
    Public,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MemoryError {
    #[error("memory entry {0} does not exist")]
    Missing(EntryId),
}

type SubscriberFn = Box<dyn FnMut(&MemoryValue) + Send>;

struct Subscriber {
    id: SubscriberId,
    callback: SubscriberFn,
}

/// One tagged, owned, subscribable value.
pub struct MemoryEntry {
    id: EntryId,
    owner: BlockKey,
    tag: MemoryTag,
    visibility: Visibility,
    value: MemoryValue,
    subscribers: Vec<Subscriber>,
}

impl MemoryEntry {
    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn owner(&self) -> BlockKey {
        self.owner
    }

    pub fn tag(&self) -> &MemoryTag {
        &self.tag
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn value(&self) -> &MemoryValue {
        &self.value
    }
}

impl fmt::Debug for MemoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryEntry")
            .field("id", &self.id)
            .field("owner", &self.owner.to_string())
            .field("tag", &self.tag.to_string())
            .field("subscribers", &self.subscribers.len())
            .finish_non_exhaustive()
    }
}

/// Search filter. Unset fields match everything; results come back in
/// insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemoryCriteria {
    pub owner: Option<BlockKey>,
    pub tag: Option<MemoryTag>,
    pub visibility: Option<Visibility>,
}

impl MemoryCriteria {
    pub fn owned_by(owner: BlockKey) -> Self {
        Self {
            owner: Some(owner),
            ..Self::default()
        }
    }

    pub fn tagged(tag: MemoryTag) -> Self {
        Self {
            tag: Some(tag),
            ..Self::default()
        }
    }

    pub fn and_tag(mut self, tag: MemoryTag) -> Self {
        self.tag = Some(tag);
        self
    }

    fn matches(&self, entry: &MemoryEntry) -> bool {
        self.owner.is_none_or(|o| o == entry.owner)
            && self.tag.as_ref().is_none_or(|t| *t == entry.tag)
            && self.visibility.is_none_or(|v| v == entry.visibility)
    }
}

/// The arena. Entries are kept in insertion order; lookups are linear, which
/// is fine at workout scale (tens of entries) and keeps removal trivial.
#[derive(Default)]
pub struct MemoryArena {
    entries: Vec<MemoryEntry>,
    next_entry: u64,
    next_subscriber: u64,
}

impl fmt::Debug for MemoryArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryArena")
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl MemoryArena {
    pub fn allocate(
        &mut self,
        owner: BlockKey,
        tag: MemoryTag,
        value: MemoryValue,
        visibility: Visibility,
    ) -> EntryId {
        self.next_entry += 1;
        let id = EntryId(self.next_entry);
        tracing::trace!(target: "memory", entry = %id, owner = %owner, tag = %tag, "allocate");
        self.entries.push(MemoryEntry {
            id,
            owner,
            tag,
            visibility,
            value,
            subscribers: Vec::new(),
        });
        id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn index_of(&self, id: EntryId) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    pub fn entry(&self, id: EntryId) -> Option<&MemoryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Read without notification.
    pub fn get(&self, id: EntryId) -> Option<&MemoryValue> {
        self.entry(id).map(MemoryEntry::value)
    }

    /// Replace the value, then notify. Notification happens on every write
    /// regardless of value equality.
    pub fn set(&mut self, id: EntryId, value: MemoryValue) -> Result<(), MemoryError> {
        let idx = self.index_of(id).ok_or(MemoryError::Missing(id))?;
        self.entries[idx].value = value;
        self.notify(idx);
        Ok(())
    }

    /// Mutate in place, then notify. Same write semantics as `set`; used by
    /// behaviors that adjust one field of a struct value (push a span,
    /// advance a round).
    pub fn update(
        &mut self,
        id: EntryId,
        mutate: impl FnOnce(&mut MemoryValue),
    ) -> Result<(), MemoryError> {
        let idx = self.index_of(id).ok_or(MemoryError::Missing(id))?;
        mutate(&mut self.entries[idx].value);
        self.notify(idx);
        Ok(())
    }

    pub fn subscribe(
        &mut self,
        id: EntryId,
        callback: impl FnMut(&MemoryValue) + Send + 'static,
    ) -> Result<SubscriberId, MemoryError> {
        let idx = self.index_of(id).ok_or(MemoryError::Missing(id))?;
        self.next_subscriber += 1;
        let sub = SubscriberId(self.next_subscriber);
        self.entries[idx].subscribers.push(Subscriber {
            id: sub,
            callback: Box::new(callback),
        });
        Ok(sub)
    }

    pub fn unsubscribe(&mut self, id: EntryId, subscriber: SubscriberId) -> bool {
        match self.index_of(id) {
            Some(idx) => {
                let subs = &mut self.entries[idx].subscribers;
                let before = subs.len();
                subs.retain(|s| s.id != subscriber);
                subs.len() != before
            }
            None => false,
        }
    }

    pub fn search(&self, criteria: &MemoryCriteria) -> Vec<EntryId> {
        self.entries
            .iter()
            .filter(|e| criteria.matches(e))
            .map(|e| e.id)
            .collect()
    }

    /// First entry for `(owner, tag)`. The common behavior-side lookup.
    pub fn find_one(&self, owner: BlockKey, tag: &MemoryTag) -> Option<EntryId> {
        self.entries
            .iter()
            .find(|e| e.owner == owner && e.tag == *tag)
            .map(|e| e.id)
    }

    /// Release every entry owned by `owner`: notify subscribers once with
    /// the tag's empty value, drop the subscribers, drop the entry.
    pub fn release_by_owner(&mut self, owner: BlockKey) -> usize {
        let mut released = 0;
        let mut idx = 0;
        while idx < self.entries.len() {
            if self.entries[idx].owner != owner {
                idx += 1;
                continue;
            }
            let mut entry = self.entries.remove(idx);
            let empty = MemoryValue::empty_for(&entry.tag);
            tracing::trace!(
                target: "memory",
                entry = %entry.id,
                owner = %owner,
                tag = %entry.tag,
                "release"
            );
            for sub in &mut entry.subscribers {
                invoke_subscriber(sub, &empty, &entry.tag);
            }
            // Subscribers dropped with the entry: nothing can fire again.
            released += 1;
        }
        released
    }

    fn notify(&mut self, idx: usize) {
        // Move the subscriber list out so a callback observing the value
        // cannot alias the entry being iterated.
        let mut subscribers = std::mem::take(&mut self.entries[idx].subscribers);
        let value = self.entries[idx].value.clone();
        let tag = self.entries[idx].tag.clone();
        for sub in &mut subscribers {
            invoke_subscriber(sub, &value, &tag);
        }
        // Re-attach, preserving any subscriptions added during notification.
        let mut added = std::mem::take(&mut self.entries[idx].subscribers);
        subscribers.append(&mut added);
        self.entries[idx].subscribers = subscribers;
    }
}

fn invoke_subscriber(sub: &mut Subscriber, value: &MemoryValue, tag: &MemoryTag) {
    let result = catch_unwind(AssertUnwindSafe(|| (sub.callback)(value)));
    if result.is_err() {
        tracing::error!(target: "memory", tag = %tag, "subscriber panicked during notification");
    }
}
