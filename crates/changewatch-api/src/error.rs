use thiserror::Error;

/// Failure reported by an entity store.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Duplicate key error: {entity}.{field} already has value {value}")]
    DuplicateKey {
        entity: String,
        field: String,
        value: String,
    },

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Backend error: {0}")]
    BackendError(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
