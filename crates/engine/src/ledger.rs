//! Deferred-commit bookkeeping attached to a pending record.

use std::collections::BTreeMap;

use crate::accessor::RelValue;
use crate::session::Record;

/// A relationship value staged for commit.
///
/// `Assign` is written onto the owner when its turn comes; `Defer`
/// only commits the structure underneath and leaves any assignment to
/// rows that already carry it.
#[derive(Debug, Clone)]
pub(crate) enum Staged {
    Assign(RelValue),
    Defer(RelValue),
}

impl Staged {
    pub fn value(&self) -> &RelValue {
        match self {
            Staged::Assign(value) | Staged::Defer(value) => value,
        }
    }
}

/// Per-record ledger of staged relationship writes.
///
/// Entries are drained exactly once: `take_direct` and `take_related`
/// hand the maps over and leave them empty, which is what lets commit
/// walk cyclic graphs without revisiting an edge.
pub(crate) struct Ledger {
    pub reference: Record,
    pub deep: bool,
    direct: BTreeMap<String, Staged>,
    related: BTreeMap<String, Staged>,
}

impl Ledger {
    pub fn new(reference: Record, deep: bool) -> Self {
        Self {
            reference,
            deep,
            direct: BTreeMap::new(),
            related: BTreeMap::new(),
        }
    }

    pub fn stage(&mut self, accessor: &str, staged: Staged, direct: bool) {
        let map = if direct { &mut self.direct } else { &mut self.related };
        map.insert(accessor.to_owned(), staged);
    }

    /// Staged entry for an accessor, if any. Many-to-many entries
    /// always live on the related side regardless of declaring side.
    pub fn get(&self, accessor: &str, direct: bool) -> Option<&Staged> {
        let map = if direct { &self.direct } else { &self.related };
        map.get(accessor)
    }

    pub fn is_empty(&self) -> bool {
        self.direct.is_empty() && self.related.is_empty()
    }

    pub fn take_direct(&mut self) -> BTreeMap<String, Staged> {
        std::mem::take(&mut self.direct)
    }

    pub fn take_related(&mut self) -> BTreeMap<String, Staged> {
        std::mem::take(&mut self.related)
    }
}
