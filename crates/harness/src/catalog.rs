use std::sync::Arc;

use graft_core::CoreError;
use graft_core::schema::Catalog;

/// Publishing-domain catalog exercising every relationship kind:
/// `blog.author` is a required one-to-one, `post.blog` a required
/// many-to-one, and `post` carries both a named (`authors`, reverse
/// `posts`) and a default-named (`tags`, reverse `post_set`)
/// many-to-many.
pub fn publishing_catalog() -> Result<Arc<Catalog>, CoreError> {
    let mut builder = Catalog::builder();
    builder
        .model("author")
        .scalar("first_name")
        .scalar("last_name");
    builder
        .model("blog")
        .scalar("name")
        .one_to_one("author", "author", false, None);
    builder
        .model("post")
        .scalar("title")
        .many_to_one("blog", "blog", false, None)
        .many_to_many("authors", "author", Some("posts"))
        .many_to_many("tags", "tag", None);
    builder.model("tag").scalar("name");
    Ok(Arc::new(builder.build()?))
}

/// Two models pointing at each other through nullable foreign keys,
/// for exercising traversal and commit over cyclic graphs.
pub fn cyclic_catalog() -> Result<Arc<Catalog>, CoreError> {
    let mut builder = Catalog::builder();
    builder
        .model("alpha")
        .scalar("label")
        .many_to_one("beta", "beta", true, None);
    builder
        .model("beta")
        .scalar("label")
        .many_to_one("alpha", "alpha", true, None);
    Ok(Arc::new(builder.build()?))
}
