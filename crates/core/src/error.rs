use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("unknown field or relationship `{name}` on model `{model}`")]
    UnknownField { model: String, name: String },

    #[error("duplicate declaration: {0}")]
    DuplicateDeclaration(String),

    #[error("invalid schema: {0}")]
    InvalidSchema(String),
}
