//! Overwrites a record's local state to match a reference record.
//!
//! Reset touches scalars and direct to-one relationships only. It
//! never discards a value the target already has: an existing related
//! row is kept (and recursively reset on deep runs) rather than
//! swapped for the reference's row.

use graft_core::FieldValue;
use graft_core::schema::RelationKind;
use tracing::trace;

use crate::accessor::{self, FieldState, RelValue};
use crate::commit;
use crate::error::EngineError;
use crate::ledger::{Ledger, Staged};
use crate::memo::{Memo, MemoKey};
use crate::observe::Observer;
use crate::options::ForkOptions;
use crate::session::{Record, Session};

pub(crate) fn reset_record(
    session: &mut Session,
    observers: &mut [Box<dyn Observer>],
    reference: Record,
    instance: Record,
    options: &ForkOptions,
    memo: &mut Memo,
    top: bool,
) -> Result<(), EngineError> {
    let expected = session.model(reference).to_owned();
    let found = session.model(instance).to_owned();
    if expected != found {
        return Err(EngineError::TypeMismatch { expected, found });
    }

    let key = MemoKey::of(session, reference);
    if memo.get(&key).is_some() {
        return Ok(());
    }

    // A fresh ledger: staged leftovers of an earlier walk would
    // otherwise leak into this one.
    session
        .ledgers
        .insert(instance, Ledger::new(reference, options.deep));
    memo.insert(key, instance);

    let mut config = options.clone();
    for observer in observers.iter_mut() {
        observer.pre_reset(reference, instance, &mut config);
    }

    let fields = match &config.fields {
        Some(fields) => fields.clone(),
        None => session
            .catalog
            .default_fields(&expected, &config.exclude, config.deep)?,
    };
    for name in &fields {
        reset_field(session, observers, reference, instance, name, &config, memo)?;
    }

    for observer in observers.iter_mut() {
        observer.post_reset(reference, instance);
    }

    if top && config.commit {
        commit::commit_record(session, observers, instance)?;
    }
    Ok(())
}

fn reset_field(
    session: &mut Session,
    observers: &mut [Box<dyn Observer>],
    reference: Record,
    instance: Record,
    name: &str,
    options: &ForkOptions,
    memo: &mut Memo,
) -> Result<(), EngineError> {
    match accessor::resolve(session, reference, name)? {
        FieldState::Scalar(value) => {
            // Scalars copy unconditionally: a value the reference
            // lacks nulls out whatever the target holds.
            match value {
                Some(value) => session.set_field(instance, name, value),
                None => session.set_field(instance, name, FieldValue::Null),
            }
            Ok(())
        }
        FieldState::Relation { value: ref_value, rel } => {
            // Collections and reverse accessors stay untouched.
            if !rel.direct || rel.many_to_many {
                return Ok(());
            }
            trace!(accessor = name, kind = rel.kind.as_str(), "reset relationship");
            let FieldState::Relation { value: own_value, .. } =
                accessor::resolve(session, instance, name)?
            else {
                return Ok(());
            };
            match rel.kind {
                RelationKind::OneToOne => {
                    if let (RelValue::One(source), RelValue::One(target)) =
                        (&ref_value, &own_value)
                        && options.deep
                    {
                        reset_record(
                            session,
                            observers,
                            *source,
                            *target,
                            &options.nested(),
                            memo,
                            false,
                        )?;
                        stage(session, instance, name, own_value, true);
                    }
                }
                RelationKind::ManyToOne => {
                    if let (RelValue::One(source), RelValue::One(target)) =
                        (&ref_value, &own_value)
                        && options.deep
                    {
                        reset_record(
                            session,
                            observers,
                            *source,
                            *target,
                            &options.nested(),
                            memo,
                            false,
                        )?;
                        stage(session, instance, name, own_value, true);
                    } else if own_value.is_empty() {
                        // Nothing local to preserve, adopt the
                        // reference's pointer (possibly none).
                        stage(session, instance, name, ref_value, true);
                    } else {
                        stage(session, instance, name, own_value, true);
                    }
                }
                _ => {}
            }
            Ok(())
        }
    }
}

fn stage(session: &mut Session, instance: Record, name: &str, value: RelValue, direct: bool) {
    if let Some(ledger) = session.ledgers.get_mut(&instance) {
        ledger.stage(name, Staged::Assign(value), direct);
    }
}
