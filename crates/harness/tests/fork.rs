use std::collections::BTreeSet;

use graft_engine::{EngineError, ForkOptions, RelValue};
use graft_harness::TestDb;
use graft_storage::{Storage, StorageError};

#[test]
fn shallow_fork_copies_scalars_and_shares_targets() {
    let mut db = TestDb::new();
    let seeded = db.seed().unwrap();
    let engine = &mut db.engine;

    let fork = engine.fork(seeded.post, ForkOptions::default()).unwrap();

    assert!(engine.pk(fork).is_some());
    assert_ne!(engine.pk(fork), engine.pk(seeded.post));
    assert_eq!(
        engine.field(fork, "title"),
        engine.field(seeded.post, "title")
    );

    // Same blog row, not a copy.
    assert_eq!(
        engine.relation(fork, "blog").unwrap(),
        RelValue::One(seeded.blog)
    );
    // The copy carries its own link rows to the same authors and tags.
    let authors = engine.relation(fork, "authors").unwrap();
    assert_eq!(authors.members(), vec![seeded.author]);
    let tags = engine.relation(fork, "tags").unwrap();
    assert_eq!(tags.members().len(), 2);

    assert_eq!(engine.storage().count_records("post").unwrap(), 2);
    assert_eq!(engine.storage().count_records("tag").unwrap(), 2);
    assert_eq!(engine.storage().count_links("post", "tags").unwrap(), 4);
}

#[test]
fn fork_without_commit_stays_pending() {
    let mut db = TestDb::new();
    let seeded = db.seed().unwrap();
    let engine = &mut db.engine;

    let options = ForkOptions {
        commit: false,
        ..ForkOptions::default()
    };
    let fork = engine.fork(seeded.post, options).unwrap();

    assert!(engine.pk(fork).is_none());
    assert!(engine.has_pending(fork));
    // Staged relationships read back before commit.
    assert_eq!(
        engine.relation(fork, "blog").unwrap(),
        RelValue::One(seeded.blog)
    );
    assert_eq!(engine.storage().count_records("post").unwrap(), 1);
}

#[test]
fn shallow_one_to_one_fork_fails_to_commit() {
    let mut db = TestDb::new();
    let seeded = db.seed().unwrap();
    let engine = &mut db.engine;

    // A shallow fork cannot take the reference's one-to-one partner,
    // and blog.author is required.
    let err = engine.fork(seeded.blog, ForkOptions::default()).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Storage(StorageError::ConstraintViolation(_))
    ));
    assert_eq!(engine.storage().count_records("blog").unwrap(), 1);
}

#[test]
fn shallow_one_to_one_fork_commits_once_supplied() {
    let mut db = TestDb::new();
    let seeded = db.seed().unwrap();
    let engine = &mut db.engine;

    let options = ForkOptions {
        commit: false,
        ..ForkOptions::default()
    };
    let fork = engine.fork(seeded.blog, options).unwrap();

    let other = engine.create("author").unwrap();
    engine.set_field(other, "first_name", "Ada");
    engine.save(other).unwrap();
    engine.set_relation(fork, "author", Some(other)).unwrap();

    engine.commit(fork).unwrap();
    assert_eq!(engine.storage().count_records("blog").unwrap(), 2);
    assert_eq!(
        engine.relation(fork, "author").unwrap(),
        RelValue::One(other)
    );
}

#[test]
fn deep_fork_copies_the_whole_graph() {
    let mut db = TestDb::new();
    let seeded = db.seed().unwrap();
    let engine = &mut db.engine;

    let options = ForkOptions {
        deep: true,
        ..ForkOptions::default()
    };
    let fork = engine.fork(seeded.post, options).unwrap();

    assert_eq!(engine.storage().count_records("post").unwrap(), 2);
    assert_eq!(engine.storage().count_records("blog").unwrap(), 2);
    assert_eq!(engine.storage().count_records("author").unwrap(), 2);
    assert_eq!(engine.storage().count_records("tag").unwrap(), 4);

    let RelValue::One(blog_fork) = engine.relation(fork, "blog").unwrap() else {
        panic!("deep fork should carry a blog copy");
    };
    assert_ne!(engine.pk(blog_fork), engine.pk(seeded.blog));
    assert_eq!(
        engine.field(blog_fork, "name"),
        engine.field(seeded.blog, "name")
    );

    let original_tags: BTreeSet<_> = seeded
        .tags
        .iter()
        .map(|t| engine.pk(*t).unwrap())
        .collect();
    for tag in engine.relation(fork, "tags").unwrap().members() {
        assert!(!original_tags.contains(&engine.pk(tag).unwrap()));
    }
}

#[test]
fn deep_fork_copies_each_row_once() {
    let mut db = TestDb::new();
    let seeded = db.seed().unwrap();
    let engine = &mut db.engine;

    // blog reaches the author twice: directly and through
    // post.authors. Both paths must land on one copy.
    let options = ForkOptions {
        deep: true,
        ..ForkOptions::default()
    };
    let fork = engine.fork(seeded.blog, options).unwrap();

    assert_eq!(engine.storage().count_records("author").unwrap(), 2);
    assert_eq!(engine.storage().count_records("post").unwrap(), 2);

    let RelValue::One(author_fork) = engine.relation(fork, "author").unwrap() else {
        panic!("deep fork should carry an author copy");
    };
    let posts = engine.relation(fork, "post_set").unwrap().members();
    assert_eq!(posts.len(), 1);
    let post_authors = engine.relation(posts[0], "authors").unwrap().members();
    assert_eq!(post_authors, vec![author_fork]);
}

#[test]
fn explicit_field_selection_limits_the_copy() {
    let mut db = TestDb::new();
    let seeded = db.seed().unwrap();
    let engine = &mut db.engine;

    let options = ForkOptions {
        fields: Some(BTreeSet::from(["title".to_owned()])),
        commit: false,
        ..ForkOptions::default()
    };
    let fork = engine.fork(seeded.post, options).unwrap();

    assert_eq!(
        engine.field(fork, "title"),
        engine.field(seeded.post, "title")
    );
    assert!(!engine.has_pending(fork));
    assert_eq!(engine.relation(fork, "blog").unwrap(), RelValue::None);
}

#[test]
fn excluded_fields_are_left_behind() {
    let mut db = TestDb::new();
    let seeded = db.seed().unwrap();
    let engine = &mut db.engine;

    let options = ForkOptions {
        exclude: vec!["pk".to_owned(), "title".to_owned()],
        commit: false,
        ..ForkOptions::default()
    };
    let fork = engine.fork(seeded.post, options).unwrap();

    assert_eq!(engine.field(fork, "title"), None);
    assert_eq!(
        engine.relation(fork, "blog").unwrap(),
        RelValue::One(seeded.blog)
    );
}

#[test]
fn an_absent_required_pointer_stays_unset() {
    let mut db = TestDb::new();
    db.seed().unwrap();
    let engine = &mut db.engine;

    // A pending reference with no blog yet: the fork copies nothing
    // for the pointer, so committing it trips the constraint.
    let draft = engine.create("post").unwrap();
    engine.set_field(draft, "title", "Draft");

    let options = ForkOptions {
        commit: false,
        ..ForkOptions::default()
    };
    let fork = engine.fork(draft, options).unwrap();
    assert_eq!(engine.relation(fork, "blog").unwrap(), RelValue::None);

    let err = engine.commit(fork).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Storage(StorageError::ConstraintViolation(_))
    ));
}

#[test]
fn an_absent_nullable_pointer_is_copied_as_empty() {
    let mut db = TestDb::cyclic();
    let engine = &mut db.engine;

    let alpha = engine.create("alpha").unwrap();
    engine.set_field(alpha, "label", "lone");
    engine.save(alpha).unwrap();

    let fork = engine.fork(alpha, ForkOptions::default()).unwrap();

    assert_eq!(engine.storage().count_records("alpha").unwrap(), 2);
    assert_eq!(engine.relation(fork, "beta").unwrap(), RelValue::None);
    let fork_pk = engine.pk(fork).unwrap();
    assert_eq!(engine.storage().get_ref(fork_pk, "beta").unwrap(), None);
}

#[test]
fn deep_fork_of_a_cycle_terminates_and_commits() {
    let mut db = TestDb::cyclic();
    let engine = &mut db.engine;

    let alpha = engine.create("alpha").unwrap();
    engine.set_field(alpha, "label", "a");
    engine.save(alpha).unwrap();
    let beta = engine.create("beta").unwrap();
    engine.set_field(beta, "label", "b");
    engine.set_relation(beta, "alpha", Some(alpha)).unwrap();
    engine.save(beta).unwrap();
    engine.set_relation(alpha, "beta", Some(beta)).unwrap();
    engine.save(alpha).unwrap();

    let options = ForkOptions {
        deep: true,
        ..ForkOptions::default()
    };
    let fork = engine.fork(alpha, options).unwrap();

    assert_eq!(engine.storage().count_records("alpha").unwrap(), 2);
    assert_eq!(engine.storage().count_records("beta").unwrap(), 2);

    // The copies point at each other, not back into the originals.
    let RelValue::One(beta_fork) = engine.relation(fork, "beta").unwrap() else {
        panic!("cycle fork should carry a beta copy");
    };
    assert_ne!(engine.pk(beta_fork), engine.pk(beta));
    assert_eq!(
        engine.relation(beta_fork, "alpha").unwrap(),
        RelValue::One(fork)
    );
}
