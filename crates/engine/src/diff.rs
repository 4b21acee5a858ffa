//! Field-by-field comparison of two same-typed records.

use std::collections::{BTreeMap, HashSet};

use graft_core::FieldValue;
use graft_core::schema::RelationKind;
use tracing::debug;

use crate::accessor::{self, FieldState, RelValue};
use crate::error::EngineError;
use crate::memo::MemoKey;
use crate::observe::Observer;
use crate::options::DiffOptions;
use crate::session::{Record, Session};

/// Accessors that differ between the two records, mapped to the
/// second record's value. Empty means no differences.
pub type Diff = BTreeMap<String, DiffEntry>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffEntry {
    /// The second record's scalar value, `None` when it has no value.
    Scalar(Option<FieldValue>),
    /// The second record's relationship value.
    Relation(RelValue),
    /// Differences inside a related pair, from a deep diff.
    Nested(Diff),
}

pub(crate) fn diff_records(
    session: &mut Session,
    observers: &mut [Box<dyn Observer>],
    reference: Record,
    instance: Record,
    options: &DiffOptions,
) -> Result<Diff, EngineError> {
    let expected = session.model(reference).to_owned();
    let found = session.model(instance).to_owned();
    if expected != found {
        return Err(EngineError::TypeMismatch { expected, found });
    }

    let mut config = options.clone();
    for observer in observers.iter_mut() {
        observer.pre_diff(reference, instance, &mut config);
    }

    let diff = diff_pair(session, reference, instance, &config)?;
    debug!(model = %expected, changed = diff.len(), "diff");

    for observer in observers.iter_mut() {
        observer.post_diff(reference, instance, &diff);
    }
    Ok(diff)
}

fn diff_pair(
    session: &mut Session,
    reference: Record,
    instance: Record,
    options: &DiffOptions,
) -> Result<Diff, EngineError> {
    let model = session.model(reference).to_owned();
    let fields = match &options.fields {
        Some(fields) => fields.clone(),
        None => session
            .catalog
            .default_fields(&model, &options.exclude, options.deep)?,
    };
    let mut diff = Diff::new();
    for name in &fields {
        diff_field(session, reference, instance, name, options.deep, &mut diff)?;
    }
    Ok(diff)
}

fn diff_field(
    session: &mut Session,
    reference: Record,
    instance: Record,
    name: &str,
    deep: bool,
    diff: &mut Diff,
) -> Result<(), EngineError> {
    let ours = accessor::resolve(session, reference, name)?;
    let theirs = accessor::resolve(session, instance, name)?;
    match (ours, theirs) {
        (FieldState::Scalar(a), FieldState::Scalar(b)) => {
            if a != b {
                diff.insert(name.to_owned(), DiffEntry::Scalar(b));
            }
        }
        (FieldState::Relation { value: a, rel }, FieldState::Relation { value: b, .. }) => {
            // One-to-one pairs compare by identity even on the reverse
            // side; every other collection compares as a member set.
            if rel.many_to_many || (!rel.direct && rel.kind != RelationKind::OneToOne) {
                if collections_differ(session, &a, &b) {
                    diff.insert(name.to_owned(), DiffEntry::Relation(b));
                }
            } else if deep
                && let (RelValue::One(x), RelValue::One(y)) = (&a, &b)
            {
                // Nested diffs use default options: depth does not
                // propagate past the first hop.
                let nested = diff_pair(session, *x, *y, &DiffOptions::default())?;
                if !nested.is_empty() {
                    diff.insert(name.to_owned(), DiffEntry::Nested(nested));
                }
            } else if a != b {
                diff.insert(name.to_owned(), DiffEntry::Relation(b));
            }
        }
        // Same model on both sides, so the shapes always agree.
        _ => {}
    }
    Ok(())
}

/// Set comparison by row identity. When exactly one side is empty the
/// collections differ by definition, regardless of how the non-empty
/// side came to be.
fn collections_differ(session: &Session, a: &RelValue, b: &RelValue) -> bool {
    let ours = a.members();
    let theirs = b.members();
    if !ours.is_empty() && !theirs.is_empty() {
        let ours: HashSet<MemoKey> = ours.iter().map(|r| MemoKey::of(session, *r)).collect();
        let theirs: HashSet<MemoKey> = theirs.iter().map(|r| MemoKey::of(session, *r)).collect();
        ours != theirs
    } else {
        !ours.is_empty() || !theirs.is_empty()
    }
}
