//! Structural copying of a record and, when deep, the graph behind it.

use graft_core::schema::{RelationKind, RelationRef};
use tracing::trace;

use crate::accessor::{self, FieldState, RelValue};
use crate::commit;
use crate::error::EngineError;
use crate::ledger::{Ledger, Staged};
use crate::memo::{Memo, MemoKey};
use crate::observe::Observer;
use crate::options::ForkOptions;
use crate::session::{Record, Session};

/// Copies `reference` into a fresh pending record.
///
/// Scalars are copied onto the copy immediately; relationships are
/// staged in the copy's ledger and resolved at commit time. The memo
/// guarantees one copy per distinct source row, which is also what
/// keeps cyclic graphs from recursing forever.
pub(crate) fn fork_record(
    session: &mut Session,
    observers: &mut [Box<dyn Observer>],
    reference: Record,
    options: &ForkOptions,
    memo: &mut Memo,
    top: bool,
) -> Result<Record, EngineError> {
    let key = MemoKey::of(session, reference);
    if let Some(existing) = memo.get(&key) {
        return Ok(existing);
    }

    let model = session.model(reference).to_owned();
    let instance = session.create(&model)?;
    session
        .ledgers
        .insert(instance, Ledger::new(reference, options.deep));
    memo.insert(key, instance);

    let mut config = options.clone();
    for observer in observers.iter_mut() {
        observer.pre_fork(reference, instance, &mut config);
    }

    let fields = match &config.fields {
        Some(fields) => fields.clone(),
        None => session
            .catalog
            .default_fields(&model, &config.exclude, config.deep)?,
    };
    for name in &fields {
        fork_field(session, observers, reference, instance, name, &config, memo)?;
    }

    for observer in observers.iter_mut() {
        observer.post_fork(reference, instance);
    }

    if top && config.commit {
        commit::commit_record(session, observers, instance)?;
    }
    Ok(instance)
}

fn fork_field(
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
            if let Some(value) = value {
                session.set_field(instance, name, value);
            }
            Ok(())
        }
        FieldState::Relation { value, rel } => {
            trace!(model = %rel.target, accessor = name, kind = rel.kind.as_str(), "fork relationship");
            if rel.many_to_many {
                fork_many_to_many(session, observers, instance, name, value, &rel, options, memo)
            } else if rel.kind == RelationKind::OneToOne {
                fork_one_to_one(session, observers, instance, name, value, &rel, options, memo)
            } else {
                fork_foreign_key(session, observers, instance, name, value, &rel, options, memo)
            }
        }
    }
}

/// One-to-one pairs only propagate on deep forks. The direct side is
/// assigned; the reverse side is deferred, its copy already points
/// back at ours through the memo.
#[allow(clippy::too_many_arguments)]
fn fork_one_to_one(
    session: &mut Session,
    observers: &mut [Box<dyn Observer>],
    instance: Record,
    name: &str,
    value: RelValue,
    rel: &RelationRef,
    options: &ForkOptions,
    memo: &mut Memo,
) -> Result<(), EngineError> {
    let RelValue::One(target) = value else {
        return Ok(());
    };
    if !options.deep {
        return Ok(());
    }
    let fork = fork_record(session, observers, target, &options.nested(), memo, false)?;
    let staged = if rel.direct {
        Staged::Assign(RelValue::One(fork))
    } else {
        Staged::Defer(RelValue::One(fork))
    };
    stage(session, instance, name, staged, rel.direct);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn fork_foreign_key(
    session: &mut Session,
    observers: &mut [Box<dyn Observer>],
    instance: Record,
    name: &str,
    value: RelValue,
    rel: &RelationRef,
    options: &ForkOptions,
    memo: &mut Memo,
) -> Result<(), EngineError> {
    match value {
        // Direct side: shallow forks point at the same target row,
        // deep forks point at its copy.
        RelValue::One(target) if rel.direct => {
            let staged = if options.deep {
                fork_record(session, observers, target, &options.nested(), memo, false)?
            } else {
                target
            };
            stage(session, instance, name, Staged::Assign(RelValue::One(staged)), true);
        }
        RelValue::None if rel.direct => {
            if rel.nullable {
                session.set_direct(instance, name, None);
            }
        }
        // Reverse side: the members carry the key, so a shallow fork
        // would steal them from the reference. Deep forks copy the
        // members and defer, their copies already point back at ours.
        RelValue::Many(members) if !rel.direct => {
            if members.is_empty() {
                return Ok(());
            }
            let staged = if options.deep {
                let mut forks = Vec::with_capacity(members.len());
                for member in &members {
                    forks.push(fork_record(
                        session,
                        observers,
                        *member,
                        &options.nested(),
                        memo,
                        false,
                    )?);
                }
                Staged::Defer(RelValue::Many(forks))
            } else {
                Staged::Assign(RelValue::Many(members))
            };
            stage(session, instance, name, staged, false);
        }
        _ => {}
    }
    Ok(())
}

/// Many-to-many collections stage on the related side from either
/// declaration. Deep forks of the reverse side defer assignment, the
/// declaring copies own the links.
#[allow(clippy::too_many_arguments)]
fn fork_many_to_many(
    session: &mut Session,
    observers: &mut [Box<dyn Observer>],
    instance: Record,
    name: &str,
    value: RelValue,
    rel: &RelationRef,
    options: &ForkOptions,
    memo: &mut Memo,
) -> Result<(), EngineError> {
    let members = value.members();
    if members.is_empty() {
        return Ok(());
    }
    let staged = if options.deep {
        let mut forks = Vec::with_capacity(members.len());
        for member in &members {
            forks.push(fork_record(
                session,
                observers,
                *member,
                &options.nested(),
                memo,
                false,
            )?);
        }
        if rel.direct {
            Staged::Assign(RelValue::Many(forks))
        } else {
            Staged::Defer(RelValue::Many(forks))
        }
    } else {
        Staged::Assign(RelValue::Many(members))
    };
    stage(session, instance, name, staged, false);
    Ok(())
}

fn stage(session: &mut Session, instance: Record, name: &str, staged: Staged, direct: bool) {
    if let Some(ledger) = session.ledgers.get_mut(&instance) {
        ledger.stage(name, staged, direct);
    }
}
