//! Traversal memo shared by one fork or reset walk.

use std::collections::HashMap;

use graft_core::RecordId;

use crate::session::{Record, Session};

/// Identity of a visited record. Saved rows key on model and primary
/// key so that two handles over the same row collapse; pending records
/// key on the handle itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum MemoKey {
    Saved(String, RecordId),
    Unsaved(Record),
}

impl MemoKey {
    pub fn of(session: &Session, record: Record) -> Self {
        match session.pk(record) {
            Some(pk) => MemoKey::Saved(session.model(record).to_owned(), pk),
            None => MemoKey::Unsaved(record),
        }
    }
}

#[derive(Default)]
pub(crate) struct Memo {
    seen: HashMap<MemoKey, Record>,
}

impl Memo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &MemoKey) -> Option<Record> {
        self.seen.get(key).copied()
    }

    /// Records the mapping before any recursion into the reference's
    /// relationships, so cycles resolve to the in-flight copy.
    pub fn insert(&mut self, key: MemoKey, record: Record) {
        self.seen.insert(key, record);
    }
}
