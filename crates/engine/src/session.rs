//! In-memory working set of records.
//!
//! Records are arena-allocated [`Node`]s addressed by the copyable
//! [`Record`] handle. A node may be persisted (it carries a primary
//! key) or pending (no key yet). Loads are memoized per primary key,
//! so two loads of the same row yield the same handle and handle
//! equality doubles as row identity.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use graft_core::schema::{Catalog, RelationKind, RelationRef};
use graft_core::{FieldValue, RecordId};
use graft_storage::{SqliteStorage, Storage};

use crate::error::EngineError;
use crate::ledger::Ledger;

/// Handle to a record in a [`Session`] arena.
///
/// Handles are only meaningful for the session that produced them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Record(pub(crate) usize);

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Record({})", self.0)
    }
}

struct Node {
    model: String,
    pk: Option<RecordId>,
    fields: BTreeMap<String, FieldValue>,
    /// In-memory direct relationship assignments. A present key
    /// overrides whatever the stored row says, including `None`.
    refs: BTreeMap<String, Option<Record>>,
}

pub(crate) struct Session {
    pub catalog: Arc<Catalog>,
    pub storage: SqliteStorage,
    nodes: Vec<Node>,
    loaded: HashMap<RecordId, Record>,
    pub ledgers: HashMap<Record, Ledger>,
}

impl Session {
    pub fn new(storage: SqliteStorage) -> Self {
        Self {
            catalog: storage.catalog().clone(),
            storage,
            nodes: Vec::new(),
            loaded: HashMap::new(),
            ledgers: HashMap::new(),
        }
    }

    pub fn create(&mut self, model: &str) -> Result<Record, EngineError> {
        self.catalog.model(model)?;
        let handle = Record(self.nodes.len());
        self.nodes.push(Node {
            model: model.to_owned(),
            pk: None,
            fields: BTreeMap::new(),
            refs: BTreeMap::new(),
        });
        Ok(handle)
    }

    /// Materializes a stored row, memoized by primary key.
    pub fn load(&mut self, id: RecordId) -> Result<Record, EngineError> {
        if let Some(handle) = self.loaded.get(&id) {
            return Ok(*handle);
        }
        let Some(row) = self.storage.get_record(id)? else {
            return Err(EngineError::RecordNotFound(id));
        };
        let fields = self.storage.get_fields(id)?.into_iter().collect();
        let handle = Record(self.nodes.len());
        self.nodes.push(Node {
            model: row.model,
            pk: Some(id),
            fields,
            refs: BTreeMap::new(),
        });
        self.loaded.insert(id, handle);
        Ok(handle)
    }

    pub fn model(&self, record: Record) -> &str {
        &self.nodes[record.0].model
    }

    pub fn pk(&self, record: Record) -> Option<RecordId> {
        self.nodes[record.0].pk
    }

    pub fn field(&self, record: Record, name: &str) -> Option<&FieldValue> {
        self.nodes[record.0].fields.get(name)
    }

    pub fn set_field(&mut self, record: Record, name: &str, value: FieldValue) {
        self.nodes[record.0].fields.insert(name.to_owned(), value);
    }

    pub fn set_direct(&mut self, record: Record, name: &str, target: Option<Record>) {
        self.nodes[record.0].refs.insert(name.to_owned(), target);
    }

    /// Current value of a direct to-one relationship, in-memory
    /// assignments taking precedence over the stored row.
    pub fn direct_value(
        &mut self,
        record: Record,
        rel: &RelationRef,
    ) -> Result<Option<Record>, EngineError> {
        if let Some(assigned) = self.nodes[record.0].refs.get(&rel.name) {
            return Ok(*assigned);
        }
        let Some(pk) = self.nodes[record.0].pk else {
            return Ok(None);
        };
        match self.storage.get_ref(pk, &rel.name)? {
            Some(target) => Ok(Some(self.load(target)?)),
            None => Ok(None),
        }
    }

    /// Counterpart of a one-to-one declared on the other model.
    pub fn reverse_one(
        &mut self,
        owner: Record,
        rel: &RelationRef,
    ) -> Result<Option<Record>, EngineError> {
        let Some(pk) = self.nodes[owner.0].pk else {
            return Ok(None);
        };
        let mut ids = self.storage.referencing(&rel.model, &rel.name, pk)?;
        match ids.pop() {
            Some(id) => Ok(Some(self.load(id)?)),
            None => Ok(None),
        }
    }

    /// Members of a reverse foreign-key collection.
    pub fn reverse_members(
        &mut self,
        owner: Record,
        rel: &RelationRef,
    ) -> Result<Vec<Record>, EngineError> {
        let Some(pk) = self.nodes[owner.0].pk else {
            return Ok(Vec::new());
        };
        let ids = self.storage.referencing(&rel.model, &rel.name, pk)?;
        ids.into_iter().map(|id| self.load(id)).collect()
    }

    /// Members of a many-to-many collection, from either side.
    pub fn many_members(
        &mut self,
        owner: Record,
        rel: &RelationRef,
    ) -> Result<Vec<Record>, EngineError> {
        let Some(pk) = self.nodes[owner.0].pk else {
            return Ok(Vec::new());
        };
        let ids = if rel.direct {
            self.storage.links_from(&rel.model, &rel.name, pk)?
        } else {
            self.storage.links_to(&rel.model, &rel.name, pk)?
        };
        ids.into_iter().map(|id| self.load(id)).collect()
    }

    /// Writes the node out. Inserts when it has no primary key yet,
    /// updates otherwise. Direct references resolve to the target's
    /// current primary key, `None` when the target is still unsaved.
    pub fn save(&mut self, record: Record) -> Result<(), EngineError> {
        let (fields, refs) = {
            let node = &self.nodes[record.0];
            let fields: Vec<(String, FieldValue)> = node
                .fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let refs: Vec<(String, Option<RecordId>)> = node
                .refs
                .iter()
                .map(|(k, v)| (k.clone(), v.and_then(|t| self.nodes[t.0].pk)))
                .collect();
            (fields, refs)
        };
        match self.nodes[record.0].pk {
            Some(id) => {
                self.storage.update_record(id, &fields, &refs)?;
            }
            None => {
                let model = self.nodes[record.0].model.clone();
                let id = self.storage.insert_record(&model, &fields, &refs)?;
                self.nodes[record.0].pk = Some(id);
                self.loaded.insert(id, record);
            }
        }
        Ok(())
    }

    /// Persists a collection assignment: points each member at the
    /// owner. Both sides must already be saved.
    pub fn assign_related(
        &mut self,
        owner: Record,
        rel: &RelationRef,
        members: &[Record],
    ) -> Result<(), EngineError> {
        let Some(owner_pk) = self.nodes[owner.0].pk else {
            return Err(EngineError::UnsavedRelated(
                self.nodes[owner.0].model.clone(),
            ));
        };
        let mut member_pks = Vec::with_capacity(members.len());
        for member in members {
            match self.nodes[member.0].pk {
                Some(pk) => member_pks.push(pk),
                None => {
                    return Err(EngineError::UnsavedRelated(
                        self.nodes[member.0].model.clone(),
                    ));
                }
            }
        }
        match rel.kind {
            RelationKind::ManyToMany => {
                if rel.direct {
                    self.storage
                        .set_links_direct(&rel.model, &rel.name, owner_pk, &member_pks)?;
                } else {
                    self.storage
                        .set_links_reverse(&rel.model, &rel.name, owner_pk, &member_pks)?;
                }
            }
            _ => {
                // Reverse to-one or to-many: each member carries the
                // foreign key, so flip it and persist the member.
                for (member, pk) in members.iter().zip(&member_pks) {
                    self.set_direct(*member, &rel.name, Some(owner));
                    self.storage
                        .set_ref(*pk, &rel.name, Some(owner_pk))?;
                }
            }
        }
        Ok(())
    }
}
