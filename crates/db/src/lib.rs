//! Document store backing the catalogue.
//!
//! Typed documents are kept as JSON rows in SQLite, either in memory or in a
//! database file. Every write (insert, update, delete) runs in its own
//! transaction under the connection lock, which is what lets callers express
//! conditional updates such as "borrow only if currently available".

pub mod collection;
pub mod database;
pub mod document;
pub mod error;
pub mod id;
mod store;

pub use collection::{Collection, Condition, Filter};
pub use database::{Database, Engine};
pub use document::{Document, IndexKind, IndexSpec};
pub use error::StoreError;
pub use id::RecordId;
