//! Two-phase, dependency-ordered persistence of a staged graph.
//!
//! Phase one walks direct dependencies so every row a foreign key
//! points at is saved no later than its referencer. Phase two walks
//! collections, saving members and writing the key or link rows that
//! tie them back. Each ledger drains exactly once, so re-entering a
//! record through a cycle finds nothing left to do and bottoms out.

use graft_storage::Storage;
use tracing::debug;

use crate::accessor::RelValue;
use crate::error::EngineError;
use crate::ledger::Staged;
use crate::observe::Observer;
use crate::session::{Record, Session};

/// Persists `instance` and everything staged beneath it in a single
/// transaction. A record with no ledger is a no-op.
pub(crate) fn commit_record(
    session: &mut Session,
    observers: &mut [Box<dyn Observer>],
    instance: Record,
) -> Result<(), EngineError> {
    if !session.ledgers.contains_key(&instance) {
        return Ok(());
    }
    debug!(model = session.model(instance), "commit");

    session.storage.begin()?;
    let result = commit_tree(session, observers, instance);
    match result {
        Ok(()) => {
            session.storage.commit()?;
            Ok(())
        }
        Err(err) => {
            // Surface the original failure even if rollback fails too.
            let _ = session.storage.rollback();
            Err(err)
        }
    }
}

fn commit_tree(
    session: &mut Session,
    observers: &mut [Box<dyn Observer>],
    instance: Record,
) -> Result<(), EngineError> {
    let (reference, deep) = session
        .ledgers
        .get(&instance)
        .map_or((instance, false), |ledger| (ledger.reference, ledger.deep));
    for observer in observers.iter_mut() {
        observer.pre_commit(reference, instance);
    }
    commit_direct(session, instance, true, deep)?;
    commit_related(session, instance, deep)?;
    for observer in observers.iter_mut() {
        observer.post_commit(reference, instance);
    }
    Ok(())
}

/// Resolves staged direct dependencies, then saves the record itself.
///
/// `direct_call` is true along the chain reached from the committed
/// root's direct edges; those records always save, picking up scalar
/// and pointer changes. Off that chain a record only saves when it has
/// no primary key yet.
fn commit_direct(
    session: &mut Session,
    instance: Record,
    direct_call: bool,
    deep: bool,
) -> Result<(), EngineError> {
    let Some(ledger) = session.ledgers.get_mut(&instance) else {
        return Ok(());
    };
    let drained = ledger.take_direct();
    for (accessor, staged) in drained {
        match staged {
            Staged::Defer(value) if deep => {
                for member in value.members() {
                    commit_direct(session, member, direct_call, deep)?;
                }
            }
            Staged::Assign(value) | Staged::Defer(value) => match value {
                RelValue::One(target) => {
                    commit_direct(session, target, direct_call, deep)?;
                    session.set_direct(instance, &accessor, Some(target));
                }
                RelValue::None => session.set_direct(instance, &accessor, None),
                RelValue::Many(_) => {}
            },
        }
    }
    if direct_call || session.pk(instance).is_none() {
        session.save(instance)?;
    }
    Ok(())
}

/// Persists staged collections. Members are saved first (phase one,
/// off the direct chain), then pointed at the owner unless deferred,
/// then recursed into for their own collections.
fn commit_related(
    session: &mut Session,
    instance: Record,
    deep: bool,
) -> Result<(), EngineError> {
    let Some(ledger) = session.ledgers.get_mut(&instance) else {
        return Ok(());
    };
    let drained = ledger.take_related();
    for (accessor, staged) in drained {
        let (value, assign) = match staged {
            Staged::Assign(value) => (value, true),
            Staged::Defer(value) => (value, false),
        };
        let members = value.members();
        for member in &members {
            commit_direct(session, *member, false, deep)?;
        }
        if assign {
            let model = session.model(instance).to_owned();
            let rel = session.catalog.describe_relationship(&model, &accessor)?;
            session.assign_related(instance, &rel, &members)?;
        }
        for member in &members {
            commit_related(session, *member, deep)?;
        }
    }
    Ok(())
}
