use libris_db::StoreError;
use libris_http::AppError;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use super::ISBN_INDEX;

/// One violated field constraint, named as clients spell the field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub error: String,
}

#[derive(Error, Debug)]
pub enum BookError {
    #[error("book not found")]
    NotFound,

    #[error("{0}")]
    InvalidInput(String),

    #[error("validation failed: {}", field_list(.0))]
    ValidationFailed(Vec<FieldViolation>),

    #[error("a book with ISBN '{0}' already exists")]
    DuplicateIsbn(String),

    #[error("book is not available for borrowing")]
    NotAvailable,

    #[error("book is not currently borrowed")]
    NotBorrowed,

    #[error("book has reached its renewal limit of {max}")]
    RenewalLimitExceeded { max: u32 },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

fn field_list(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| v.field.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<StoreError> for BookError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => BookError::NotFound,
            StoreError::UniqueViolation { index, value } if index == ISBN_INDEX => {
                BookError::DuplicateIsbn(value)
            }
            other => BookError::Internal(other.into()),
        }
    }
}

impl From<BookError> for AppError {
    fn from(err: BookError) -> Self {
        let message = err.to_string();
        match err {
            BookError::NotFound => AppError::not_found(message),
            BookError::InvalidInput(_) => AppError::bad_request(message).with_code("invalid_input"),
            BookError::ValidationFailed(violations) => AppError::validation(
                violations
                    .iter()
                    .map(|v| json!({"field": v.field, "error": v.error}))
                    .collect(),
                message,
            ),
            BookError::DuplicateIsbn(isbn) => AppError::conflict(
                vec![json!({"field": "isbn", "error": "duplicate", "value": isbn})],
                message,
            )
            .with_code("duplicate_isbn"),
            BookError::NotAvailable => AppError::conflict(vec![], message).with_code("not_available"),
            BookError::NotBorrowed => AppError::conflict(vec![], message).with_code("not_borrowed"),
            BookError::RenewalLimitExceeded { .. } => {
                AppError::conflict(vec![], message).with_code("renewal_limit_exceeded")
            }
            BookError::Internal(e) => AppError::Internal(e),
        }
    }
}
