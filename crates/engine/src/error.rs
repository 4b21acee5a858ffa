use graft_core::{CoreError, RecordId};
use graft_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("record not found: {0}")]
    RecordNotFound(RecordId),

    #[error("type mismatch: expected `{expected}`, found `{found}`")]
    TypeMismatch { expected: String, found: String },

    #[error("cannot attach unsaved `{0}` record to a relationship collection")]
    UnsavedRelated(String),

    #[error("`{model}.{name}` is not a relationship")]
    NotRelationship { model: String, name: String },

    #[error("`{model}.{name}` is not a direct relationship")]
    NotDirect { model: String, name: String },
}
