use thiserror::Error;

use crate::id::RecordId;

/// Errors raised by the document store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record {0} not found")]
    NotFound(RecordId),

    #[error("record {0} already exists")]
    DuplicateId(RecordId),

    #[error("unique index '{index}' already contains '{value}'")]
    UniqueViolation { index: &'static str, value: String },

    #[error("collection '{0}' is registered with a different document type")]
    CollectionType(&'static str),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("document encoding error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("database file error: {0}")]
    Io(#[from] std::io::Error),
}
