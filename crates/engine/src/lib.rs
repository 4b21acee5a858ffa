//! Structural copy, reset, diff, and commit over graphs of stored
//! records.
//!
//! The [`Engine`] owns a storage handle and an in-memory session of
//! [`Record`] handles. [`Engine::fork`] copies a record (and, deep,
//! the graph behind it) into pending records whose relationship writes
//! sit in per-record ledgers; [`Engine::commit`] persists a staged
//! graph dependency-first in one transaction; [`Engine::reset`]
//! overwrites a record to match a reference; [`Engine::diff`] reports
//! what differs between two records of the same model.

pub mod accessor;
pub mod diff;
pub mod error;
pub mod observe;
pub mod options;

mod commit;
mod fork;
mod ledger;
mod memo;
mod reset;
mod session;

pub use accessor::RelValue;
pub use diff::{Diff, DiffEntry};
pub use error::EngineError;
pub use observe::Observer;
pub use options::{DiffOptions, ForkOptions};
pub use session::Record;

use std::sync::Arc;

use graft_core::schema::Catalog;
use graft_core::{FieldValue, RecordId};
use graft_storage::SqliteStorage;
use tracing::debug;

use crate::accessor::FieldState;
use crate::memo::Memo;
use crate::session::Session;

pub struct Engine {
    session: Session,
    observers: Vec<Box<dyn Observer>>,
}

impl Engine {
    pub fn new(storage: SqliteStorage) -> Self {
        Self {
            session: Session::new(storage),
            observers: Vec::new(),
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.session.catalog
    }

    pub fn storage(&self) -> &SqliteStorage {
        &self.session.storage
    }

    /// Registers an observer. Observers are notified in registration
    /// order for the rest of the engine's life.
    pub fn observe(&mut self, observer: Box<dyn Observer>) {
        self.observers.push(observer);
    }

    /// A new pending record of `model`, empty until saved or forked
    /// into.
    pub fn create(&mut self, model: &str) -> Result<Record, EngineError> {
        self.session.create(model)
    }

    /// The record stored under `id`. Loading the same id twice yields
    /// the same handle.
    pub fn load(&mut self, id: RecordId) -> Result<Record, EngineError> {
        self.session.load(id)
    }

    pub fn model(&self, record: Record) -> &str {
        self.session.model(record)
    }

    pub fn pk(&self, record: Record) -> Option<RecordId> {
        self.session.pk(record)
    }

    pub fn field(&self, record: Record, name: &str) -> Option<FieldValue> {
        self.session.field(record, name).cloned()
    }

    pub fn set_field(&mut self, record: Record, name: &str, value: impl Into<FieldValue>) {
        self.session.set_field(record, name, value.into());
    }

    /// Current value of any relationship accessor, staged writes
    /// taking precedence over stored state.
    pub fn relation(&mut self, record: Record, name: &str) -> Result<RelValue, EngineError> {
        match accessor::resolve(&mut self.session, record, name)? {
            FieldState::Relation { value, .. } => Ok(value),
            FieldState::Scalar(_) => {
                let model = self.session.model(record).to_owned();
                Err(EngineError::NotRelationship {
                    model,
                    name: name.to_owned(),
                })
            }
        }
    }

    /// Points a direct to-one relationship at `target`, in memory.
    /// Persisted by the next [`save`](Engine::save) or commit.
    pub fn set_relation(
        &mut self,
        record: Record,
        name: &str,
        target: Option<Record>,
    ) -> Result<(), EngineError> {
        let model = self.session.model(record).to_owned();
        let rel = self.session.catalog.describe_relationship(&model, name)?;
        if !rel.direct || rel.many_to_many {
            return Err(EngineError::NotDirect {
                model,
                name: name.to_owned(),
            });
        }
        self.session.set_direct(record, name, target);
        Ok(())
    }

    /// Persists collection membership. Many-to-many accessors are
    /// replaced outright; for reverse foreign keys each given member
    /// is pointed at the record, rows pointing there already are left
    /// alone. Owner and members must already be saved.
    pub fn attach(
        &mut self,
        record: Record,
        name: &str,
        members: &[Record],
    ) -> Result<(), EngineError> {
        let model = self.session.model(record).to_owned();
        let rel = self.session.catalog.describe_relationship(&model, name)?;
        self.session.assign_related(record, &rel, members)
    }

    /// Writes the record's scalar fields and direct relationships out,
    /// assigning a primary key on first save.
    pub fn save(&mut self, record: Record) -> Result<(), EngineError> {
        self.session.save(record)
    }

    /// Whether the record has staged relationship writes awaiting
    /// commit.
    pub fn has_pending(&self, record: Record) -> bool {
        self.session
            .ledgers
            .get(&record)
            .is_some_and(|ledger| !ledger.is_empty())
    }

    /// Copies `reference` into a new pending record, per `options`.
    pub fn fork(&mut self, reference: Record, options: ForkOptions) -> Result<Record, EngineError> {
        debug!(model = self.session.model(reference), deep = options.deep, "fork");
        let Engine { session, observers } = self;
        let mut memo = Memo::new();
        fork::fork_record(session, observers, reference, &options, &mut memo, true)
    }

    /// Overwrites `instance`'s scalars and direct relationships to
    /// match `reference`. Both must be of the same model.
    pub fn reset(
        &mut self,
        reference: Record,
        instance: Record,
        options: ForkOptions,
    ) -> Result<(), EngineError> {
        debug!(model = self.session.model(reference), deep = options.deep, "reset");
        let Engine { session, observers } = self;
        let mut memo = Memo::new();
        reset::reset_record(session, observers, reference, instance, &options, &mut memo, true)
    }

    /// Persists `instance` and everything staged beneath it in one
    /// transaction. Nothing staged is a no-op.
    pub fn commit(&mut self, instance: Record) -> Result<(), EngineError> {
        let Engine { session, observers } = self;
        commit::commit_record(session, observers, instance)
    }

    /// Differences between two records of the same model, keyed by
    /// accessor and valued from `instance`'s side.
    pub fn diff(
        &mut self,
        reference: Record,
        instance: Record,
        options: DiffOptions,
    ) -> Result<Diff, EngineError> {
        let Engine { session, observers } = self;
        diff::diff_records(session, observers, reference, instance, &options)
    }
}
