use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use crate::error::CoreError;

/// Relationship classification as seen from the side doing the lookup.
/// Kind and direct-ness are schema facts resolved by name, never inferred
/// from a runtime value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    OneToOne,
    ManyToOne,
    OneToManyReverse,
    ManyToMany,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneToOne => "one-to-one",
            Self::ManyToOne => "many-to-one",
            Self::OneToManyReverse => "one-to-many-reverse",
            Self::ManyToMany => "many-to-many",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScalarDef {
    pub name: String,
}

/// A relationship as declared on its owning (direct) side. Only one-to-one,
/// many-to-one and many-to-many can be declared; one-to-many exists solely as
/// the reverse of a many-to-one elsewhere.
#[derive(Debug, Clone)]
pub struct RelationDef {
    pub name: String,
    pub kind: RelationKind,
    pub target: String,
    pub nullable: bool,
    pub related_name: Option<String>,
}

impl RelationDef {
    /// Accessor name this relationship is exposed under on the target model.
    /// Defaults mirror the usual ORM convention: the declaring model's name
    /// for one-to-one, `<declaring>_set` otherwise.
    pub fn reverse_accessor(&self, declaring: &str) -> String {
        match &self.related_name {
            Some(name) => name.clone(),
            None if self.kind == RelationKind::OneToOne => declaring.to_string(),
            None => format!("{declaring}_set"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelDef {
    pub name: String,
    pub primary_key: String,
    pub scalars: Vec<ScalarDef>,
    pub relations: Vec<RelationDef>,
    // Reverse relationships indexed by accessor name, built from one catalog
    // scan on first use. Schema lookups are hot in the traversal engines.
    reverse: OnceLock<BTreeMap<String, RelationRef>>,
}

impl ModelDef {
    pub fn scalar(&self, name: &str) -> Option<&ScalarDef> {
        self.scalars.iter().find(|s| s.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }
}

/// A fully resolved relationship: declared kind, which side the lookup came
/// from, and the model at the other end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationRef {
    pub kind: RelationKind,
    /// True when the foreign-key-like reference lives on the resolving side.
    pub direct: bool,
    pub many_to_many: bool,
    pub nullable: bool,
    /// Model that declared the relationship.
    pub model: String,
    /// Field name on the declaring model.
    pub name: String,
    /// Accessor name the lookup was made under.
    pub accessor: String,
    /// Model on the other end, from the resolving side's point of view.
    pub target: String,
}

#[derive(Debug, Clone)]
pub enum FieldLookup {
    Scalar(ScalarDef),
    Relation(RelationRef),
}

/// The schema/metadata catalog. Built once, shared immutably (wrap in `Arc`).
#[derive(Debug)]
pub struct Catalog {
    models: BTreeMap<String, ModelDef>,
}

impl Catalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder {
            models: BTreeMap::new(),
        }
    }

    pub fn model(&self, name: &str) -> Result<&ModelDef, CoreError> {
        self.models
            .get(name)
            .ok_or_else(|| CoreError::UnknownModel(name.to_string()))
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelDef> {
        self.models.values()
    }

    /// Look up `name` on `model`: declared scalars first, then declared
    /// relationships, then the reverse-accessor fallback.
    pub fn resolve_field(&self, model: &str, name: &str) -> Result<FieldLookup, CoreError> {
        let def = self.model(model)?;

        if let Some(scalar) = def.scalar(name) {
            return Ok(FieldLookup::Scalar(scalar.clone()));
        }

        if let Some(rel) = def.relation(name) {
            return Ok(FieldLookup::Relation(RelationRef {
                kind: rel.kind,
                direct: true,
                many_to_many: rel.kind == RelationKind::ManyToMany,
                nullable: rel.nullable,
                model: def.name.clone(),
                name: rel.name.clone(),
                accessor: name.to_string(),
                target: rel.target.clone(),
            }));
        }

        if let Some(reverse) = self.reverse_accessors(def).get(name) {
            return Ok(FieldLookup::Relation(reverse.clone()));
        }

        Err(CoreError::UnknownField {
            model: model.to_string(),
            name: name.to_string(),
        })
    }

    /// Like `resolve_field` but requires the name to be a relationship.
    pub fn describe_relationship(&self, model: &str, name: &str) -> Result<RelationRef, CoreError> {
        match self.resolve_field(model, name)? {
            FieldLookup::Relation(rel) => Ok(rel),
            FieldLookup::Scalar(_) => Err(CoreError::UnknownField {
                model: model.to_string(),
                name: name.to_string(),
            }),
        }
    }

    /// The default field set for fork/reset/diff: every scalar, every direct
    /// relationship and every reverse many-to-many accessor, minus `exclude`.
    /// `deep` adds reverse one-to-many and reverse one-to-one accessors, which
    /// shallow operations must not touch since copying them would re-point
    /// foreign keys on rows the operation does not own. The pseudo-name `pk`
    /// in `exclude` expands to the model's primary-key field.
    pub fn default_fields(
        &self,
        model: &str,
        exclude: &[String],
        deep: bool,
    ) -> Result<BTreeSet<String>, CoreError> {
        let def = self.model(model)?;

        let mut excluded: BTreeSet<String> = exclude.iter().cloned().collect();
        if excluded.remove("pk") {
            excluded.insert(def.primary_key.clone());
        }

        let mut fields = BTreeSet::new();
        for scalar in &def.scalars {
            fields.insert(scalar.name.clone());
        }
        for rel in &def.relations {
            fields.insert(rel.name.clone());
        }
        for (accessor, rel) in self.reverse_accessors(def) {
            if rel.many_to_many || deep {
                fields.insert(accessor.clone());
            }
        }

        Ok(&fields - &excluded)
    }

    fn reverse_accessors<'a>(&'a self, model: &'a ModelDef) -> &'a BTreeMap<String, RelationRef> {
        model.reverse.get_or_init(|| {
            let mut cache = BTreeMap::new();
            for declaring in self.models.values() {
                for rel in &declaring.relations {
                    if rel.target != model.name {
                        continue;
                    }
                    let accessor = rel.reverse_accessor(&declaring.name);
                    let kind = match rel.kind {
                        RelationKind::OneToOne => RelationKind::OneToOne,
                        RelationKind::ManyToOne => RelationKind::OneToManyReverse,
                        other => other,
                    };
                    cache.insert(
                        accessor.clone(),
                        RelationRef {
                            kind,
                            direct: false,
                            many_to_many: rel.kind == RelationKind::ManyToMany,
                            nullable: rel.nullable,
                            model: declaring.name.clone(),
                            name: rel.name.clone(),
                            accessor,
                            target: declaring.name.clone(),
                        },
                    );
                }
            }
            cache
        })
    }
}

pub struct CatalogBuilder {
    models: BTreeMap<String, ModelDef>,
}

pub struct ModelBuilder<'a> {
    def: &'a mut ModelDef,
}

impl CatalogBuilder {
    /// Declare a model, or reopen an already-declared one.
    pub fn model(&mut self, name: &str) -> ModelBuilder<'_> {
        let def = self
            .models
            .entry(name.to_string())
            .or_insert_with(|| ModelDef {
                name: name.to_string(),
                primary_key: "id".to_string(),
                scalars: Vec::new(),
                relations: Vec::new(),
                reverse: OnceLock::new(),
            });
        ModelBuilder { def }
    }

    pub fn build(self) -> Result<Catalog, CoreError> {
        for model in self.models.values() {
            let mut seen = BTreeSet::new();
            for scalar in &model.scalars {
                if !seen.insert(scalar.name.as_str()) {
                    return Err(CoreError::DuplicateDeclaration(format!(
                        "{}.{}",
                        model.name, scalar.name
                    )));
                }
            }
            for rel in &model.relations {
                if !seen.insert(rel.name.as_str()) {
                    return Err(CoreError::DuplicateDeclaration(format!(
                        "{}.{}",
                        model.name, rel.name
                    )));
                }
                if !self.models.contains_key(&rel.target) {
                    return Err(CoreError::InvalidSchema(format!(
                        "{}.{} targets undeclared model `{}`",
                        model.name, rel.name, rel.target
                    )));
                }
            }
        }
        Ok(Catalog {
            models: self.models,
        })
    }
}

impl ModelBuilder<'_> {
    pub fn primary_key(&mut self, name: &str) -> &mut Self {
        self.def.primary_key = name.to_string();
        self
    }

    pub fn scalar(&mut self, name: &str) -> &mut Self {
        self.def.scalars.push(ScalarDef {
            name: name.to_string(),
        });
        self
    }

    pub fn one_to_one(
        &mut self,
        name: &str,
        target: &str,
        nullable: bool,
        related_name: Option<&str>,
    ) -> &mut Self {
        self.relation(name, RelationKind::OneToOne, target, nullable, related_name)
    }

    pub fn many_to_one(
        &mut self,
        name: &str,
        target: &str,
        nullable: bool,
        related_name: Option<&str>,
    ) -> &mut Self {
        self.relation(name, RelationKind::ManyToOne, target, nullable, related_name)
    }

    pub fn many_to_many(
        &mut self,
        name: &str,
        target: &str,
        related_name: Option<&str>,
    ) -> &mut Self {
        self.relation(name, RelationKind::ManyToMany, target, false, related_name)
    }

    fn relation(
        &mut self,
        name: &str,
        kind: RelationKind,
        target: &str,
        nullable: bool,
        related_name: Option<&str>,
    ) -> &mut Self {
        self.def.relations.push(RelationDef {
            name: name.to_string(),
            kind,
            target: target.to_string(),
            nullable,
            related_name: related_name.map(|s| s.to_string()),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        let mut b = Catalog::builder();
        b.model("author").scalar("first_name").scalar("last_name");
        b.model("tag").scalar("name");
        b.model("blog")
            .scalar("name")
            .one_to_one("author", "author", false, None);
        b.model("post")
            .scalar("title")
            .many_to_one("blog", "blog", false, None)
            .many_to_many("authors", "author", Some("posts"))
            .many_to_many("tags", "tag", None);
        b.build().unwrap()
    }

    fn names(set: &BTreeSet<String>) -> Vec<&str> {
        set.iter().map(|s| s.as_str()).collect()
    }

    #[test]
    fn direct_lookup_classifies_kinds() {
        let c = catalog();

        let rel = c.describe_relationship("post", "blog").unwrap();
        assert_eq!(rel.kind, RelationKind::ManyToOne);
        assert!(rel.direct);
        assert!(!rel.many_to_many);
        assert!(!rel.nullable);
        assert_eq!(rel.target, "blog");

        let rel = c.describe_relationship("blog", "author").unwrap();
        assert_eq!(rel.kind, RelationKind::OneToOne);
        assert!(rel.direct);

        let rel = c.describe_relationship("post", "tags").unwrap();
        assert_eq!(rel.kind, RelationKind::ManyToMany);
        assert!(rel.many_to_many);
    }

    #[test]
    fn reverse_lookup_uses_accessor_names() {
        let c = catalog();

        // related_name present
        let rel = c.describe_relationship("author", "posts").unwrap();
        assert_eq!(rel.kind, RelationKind::ManyToMany);
        assert!(!rel.direct);
        assert_eq!(rel.model, "post");
        assert_eq!(rel.name, "authors");
        assert_eq!(rel.target, "post");

        // default `<model>_set` accessor for reverse foreign keys
        let rel = c.describe_relationship("blog", "post_set").unwrap();
        assert_eq!(rel.kind, RelationKind::OneToManyReverse);
        assert!(!rel.direct);
        assert!(!rel.many_to_many);

        // default reverse one-to-one accessor is the declaring model name
        let rel = c.describe_relationship("author", "blog").unwrap();
        assert_eq!(rel.kind, RelationKind::OneToOne);
        assert!(!rel.direct);

        // reverse many-to-many default accessor
        let rel = c.describe_relationship("tag", "post_set").unwrap();
        assert_eq!(rel.kind, RelationKind::ManyToMany);
        assert!(!rel.direct);
        assert!(rel.many_to_many);
    }

    #[test]
    fn unknown_names_error() {
        let c = catalog();
        assert!(matches!(
            c.resolve_field("post", "publisher"),
            Err(CoreError::UnknownField { .. })
        ));
        assert!(matches!(
            c.resolve_field("magazine", "title"),
            Err(CoreError::UnknownModel(_))
        ));
    }

    #[test]
    fn shallow_default_fields() {
        let c = catalog();
        let pk = vec!["pk".to_string()];

        let fields = c.default_fields("author", &pk, false).unwrap();
        assert_eq!(names(&fields), ["first_name", "last_name", "posts"]);

        let fields = c.default_fields("post", &pk, false).unwrap();
        assert_eq!(names(&fields), ["authors", "blog", "tags", "title"]);

        let fields = c.default_fields("blog", &pk, false).unwrap();
        assert_eq!(names(&fields), ["author", "name"]);

        let fields = c.default_fields("tag", &pk, false).unwrap();
        assert_eq!(names(&fields), ["name", "post_set"]);
    }

    #[test]
    fn deep_default_fields_add_reverse_accessors() {
        let c = catalog();
        let pk = vec!["pk".to_string()];

        let fields = c.default_fields("author", &pk, true).unwrap();
        assert_eq!(names(&fields), ["blog", "first_name", "last_name", "posts"]);

        let fields = c.default_fields("blog", &pk, true).unwrap();
        assert_eq!(names(&fields), ["author", "name", "post_set"]);

        // no reverse one-to-many points at post, so deep adds nothing
        let fields = c.default_fields("post", &pk, true).unwrap();
        assert_eq!(names(&fields), ["authors", "blog", "tags", "title"]);
    }

    #[test]
    fn pk_exclusion_expands_to_field_name() {
        let mut b = Catalog::builder();
        b.model("widget").primary_key("serial").scalar("serial").scalar("label");
        let c = b.build().unwrap();

        let fields = c
            .default_fields("widget", &["pk".to_string()], false)
            .unwrap();
        assert_eq!(names(&fields), ["label"]);
    }

    #[test]
    fn duplicate_and_dangling_declarations_rejected() {
        let mut b = Catalog::builder();
        b.model("a").scalar("x").scalar("x");
        assert!(matches!(
            b.build(),
            Err(CoreError::DuplicateDeclaration(_))
        ));

        let mut b = Catalog::builder();
        b.model("a").many_to_one("b", "missing", true, None);
        assert!(matches!(b.build(), Err(CoreError::InvalidSchema(_))));
    }
}
