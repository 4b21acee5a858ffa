pub mod error;
pub mod field_value;
pub mod ids;
pub mod schema;

pub use error::CoreError;
pub use field_value::FieldValue;
pub use ids::RecordId;
pub use schema::{
    Catalog, CatalogBuilder, FieldLookup, ModelDef, RelationDef, RelationKind, RelationRef,
    ScalarDef,
};
