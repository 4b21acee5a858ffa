use std::sync::Arc;

use graft_core::schema::Catalog;
use graft_engine::{Engine, EngineError, Record};
use graft_storage::SqliteStorage;

/// An engine over a fresh in-memory database.
pub struct TestDb {
    pub engine: Engine,
}

/// Handles to the seeded publishing rows.
pub struct Seeded {
    pub author: Record,
    pub blog: Record,
    pub post: Record,
    pub tags: [Record; 2],
}

impl TestDb {
    pub fn new() -> Self {
        let catalog = crate::publishing_catalog().expect("fixture catalog is valid");
        Self::with_catalog(catalog)
    }

    pub fn cyclic() -> Self {
        let catalog = crate::cyclic_catalog().expect("fixture catalog is valid");
        Self::with_catalog(catalog)
    }

    pub fn with_catalog(catalog: Arc<Catalog>) -> Self {
        let storage = SqliteStorage::open_in_memory(catalog).expect("in-memory database opens");
        Self {
            engine: Engine::new(storage),
        }
    }

    /// One author, one blog, one post carrying both tags: the base
    /// graph the suites fork, reset, and diff against.
    pub fn seed(&mut self) -> Result<Seeded, EngineError> {
        let engine = &mut self.engine;

        let author = engine.create("author")?;
        engine.set_field(author, "first_name", "Byron");
        engine.set_field(author, "last_name", "Ruth");
        engine.save(author)?;

        let blog = engine.create("blog")?;
        engine.set_field(blog, "name", "Fruity Happiness");
        engine.set_relation(blog, "author", Some(author))?;
        engine.save(blog)?;

        let tag_fruit = engine.create("tag")?;
        engine.set_field(tag_fruit, "name", "fruit");
        engine.save(tag_fruit)?;

        let tag_happy = engine.create("tag")?;
        engine.set_field(tag_happy, "name", "happiness");
        engine.save(tag_happy)?;

        let post = engine.create("post")?;
        engine.set_field(post, "title", "Holy Crap");
        engine.set_relation(post, "blog", Some(blog))?;
        engine.save(post)?;
        engine.attach(post, "authors", &[author])?;
        engine.attach(post, "tags", &[tag_fruit, tag_happy])?;

        Ok(Seeded {
            author,
            blog,
            post,
            tags: [tag_fruit, tag_happy],
        })
    }
}

impl Default for TestDb {
    fn default() -> Self {
        Self::new()
    }
}
