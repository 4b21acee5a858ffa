//! Uniform field access over scalars and relationships.
//!
//! Resolution consults the record's ledger first, so a staged but not
//! yet committed relationship reads back as its staged value, and only
//! falls through to live (in-memory, then stored) state on a miss.

use graft_core::FieldValue;
use graft_core::schema::{FieldLookup, RelationKind, RelationRef};

use crate::error::EngineError;
use crate::session::{Record, Session};

/// Resolved value of a relationship accessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelValue {
    None,
    One(Record),
    Many(Vec<Record>),
}

impl RelValue {
    pub fn is_empty(&self) -> bool {
        match self {
            RelValue::None => true,
            RelValue::One(_) => false,
            RelValue::Many(members) => members.is_empty(),
        }
    }

    /// Collection view: a to-one value becomes a single-member list.
    pub fn members(&self) -> Vec<Record> {
        match self {
            RelValue::None => Vec::new(),
            RelValue::One(record) => vec![*record],
            RelValue::Many(members) => members.clone(),
        }
    }
}

pub(crate) enum FieldState {
    Scalar(Option<FieldValue>),
    Relation { value: RelValue, rel: RelationRef },
}

pub(crate) fn resolve(
    session: &mut Session,
    record: Record,
    name: &str,
) -> Result<FieldState, EngineError> {
    let model = session.model(record).to_owned();
    match session.catalog.resolve_field(&model, name)? {
        FieldLookup::Scalar(scalar) => {
            // A stored null reads the same as a field never written.
            Ok(FieldState::Scalar(
                session
                    .field(record, &scalar.name)
                    .filter(|value| !value.is_null())
                    .cloned(),
            ))
        }
        FieldLookup::Relation(rel) => {
            if let Some(staged) = staged_value(session, record, name, &rel)
                && !staged.is_empty()
            {
                return Ok(FieldState::Relation { value: staged, rel });
            }
            let value = live_value(session, record, &rel)?;
            Ok(FieldState::Relation { value, rel })
        }
    }
}

/// Ledger lookup. Empty staged collections do not shadow live state.
fn staged_value(
    session: &Session,
    record: Record,
    name: &str,
    rel: &RelationRef,
) -> Option<RelValue> {
    let ledger = session.ledgers.get(&record)?;
    if ledger.is_empty() {
        return None;
    }
    let direct = !rel.many_to_many && rel.direct;
    ledger.get(name, direct).map(|staged| staged.value().clone())
}

fn live_value(
    session: &mut Session,
    record: Record,
    rel: &RelationRef,
) -> Result<RelValue, EngineError> {
    let value = match rel.kind {
        RelationKind::OneToOne => {
            let target = if rel.direct {
                session.direct_value(record, rel)?
            } else {
                session.reverse_one(record, rel)?
            };
            match target {
                Some(target) => RelValue::One(target),
                None => RelValue::None,
            }
        }
        RelationKind::ManyToOne => match session.direct_value(record, rel)? {
            Some(target) => RelValue::One(target),
            None => RelValue::None,
        },
        RelationKind::OneToManyReverse => RelValue::Many(session.reverse_members(record, rel)?),
        RelationKind::ManyToMany => RelValue::Many(session.many_members(record, rel)?),
    };
    Ok(value)
}
