use graft_core::{FieldValue, RecordId};

use crate::error::StorageError;

/// A persisted record's row: identity plus declared model. Scalar fields and
/// relationship columns are fetched separately.
#[derive(Debug, Clone)]
pub struct RecordRow {
    pub record_id: RecordId,
    pub model: String,
}

/// The persistence engine boundary. Inserts assign primary keys; direct
/// relationship columns (`refs`) and many-to-many association rows (`links`)
/// are keyed by the declaring model and field name. Referential integrity for
/// non-nullable direct relationships is enforced here, not in the traversal
/// engines.
pub trait Storage {
    /// Insert a new record, assigning and returning its primary key.
    fn insert_record(
        &mut self,
        model: &str,
        fields: &[(String, FieldValue)],
        refs: &[(String, Option<RecordId>)],
    ) -> Result<RecordId, StorageError>;

    /// Update an existing record's scalar fields and the given ref columns.
    /// Refs not mentioned are left untouched.
    fn update_record(
        &mut self,
        record_id: RecordId,
        fields: &[(String, FieldValue)],
        refs: &[(String, Option<RecordId>)],
    ) -> Result<(), StorageError>;

    fn get_record(&self, record_id: RecordId) -> Result<Option<RecordRow>, StorageError>;

    fn get_fields(&self, record_id: RecordId) -> Result<Vec<(String, FieldValue)>, StorageError>;

    fn get_field(
        &self,
        record_id: RecordId,
        field_key: &str,
    ) -> Result<Option<FieldValue>, StorageError>;

    fn get_ref(
        &self,
        record_id: RecordId,
        field_key: &str,
    ) -> Result<Option<RecordId>, StorageError>;

    fn set_ref(
        &mut self,
        record_id: RecordId,
        field_key: &str,
        target: Option<RecordId>,
    ) -> Result<(), StorageError>;

    /// Records of `model` whose direct ref `field_key` points at `target`.
    /// Backs reverse one-to-many and reverse one-to-one reads.
    fn referencing(
        &self,
        model: &str,
        field_key: &str,
        target: RecordId,
    ) -> Result<Vec<RecordId>, StorageError>;

    /// Members of a many-to-many relationship read from its declaring side.
    fn links_from(
        &self,
        model: &str,
        field_key: &str,
        source: RecordId,
    ) -> Result<Vec<RecordId>, StorageError>;

    /// Members of a many-to-many relationship read from its reverse side.
    fn links_to(
        &self,
        model: &str,
        field_key: &str,
        target: RecordId,
    ) -> Result<Vec<RecordId>, StorageError>;

    /// Replace the full membership of `source`'s many-to-many relationship.
    fn set_links_direct(
        &mut self,
        model: &str,
        field_key: &str,
        source: RecordId,
        targets: &[RecordId],
    ) -> Result<(), StorageError>;

    /// Replace the full membership seen from the reverse side: after this,
    /// exactly `sources` link to `target`.
    fn set_links_reverse(
        &mut self,
        model: &str,
        field_key: &str,
        target: RecordId,
        sources: &[RecordId],
    ) -> Result<(), StorageError>;

    fn count_records(&self, model: &str) -> Result<u64, StorageError>;

    fn count_links(&self, model: &str, field_key: &str) -> Result<u64, StorageError>;

    /// Transaction boundary for commit: acquired before the first save,
    /// released on every exit path.
    fn begin(&mut self) -> Result<(), StorageError>;

    fn commit(&mut self) -> Result<(), StorageError>;

    fn rollback(&mut self) -> Result<(), StorageError>;
}
