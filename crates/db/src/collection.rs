use std::marker::PhantomData;
use std::sync::Arc;

use rusqlite::{params, params_from_iter, TransactionBehavior};
use tokio::sync::Mutex;

use crate::document::{Document, IndexKind};
use crate::error::StoreError;
use crate::id::RecordId;
use crate::store::{self, quote, Store};

/// A single predicate evaluated against a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Field rendered by [`Document::field`] equals the value exactly.
    Eq { field: &'static str, value: String },
    /// Case-insensitive substring match over the collection's text index fields.
    Contains(String),
}

/// Conjunction of conditions. An empty filter matches every document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &'static str, value: impl Into<String>) -> Self {
        self.conditions.push(Condition::Eq {
            field,
            value: value.into(),
        });
        self
    }

    pub fn contains(mut self, text: impl Into<String>) -> Self {
        self.conditions.push(Condition::Contains(text.into()));
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

/// A typed handle onto one collection table.
///
/// Handles share the database connection. Every write runs in its own
/// immediate transaction while holding the connection lock, so a write
/// observes and replaces the document without interleaving with any other
/// write.
pub struct Collection<T> {
    store: Arc<Mutex<Store>>,
    _doc: PhantomData<fn() -> T>,
}

impl<T: Document> Collection<T> {
    pub(crate) fn new(store: Arc<Mutex<Store>>) -> Self {
        Self {
            store,
            _doc: PhantomData,
        }
    }

    pub async fn insert(&self, doc: T) -> Result<T, StoreError> {
        let mut guard = self.store.lock().await;
        let specs = guard.specs(T::COLLECTION);
        let tx = guard
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let id = doc.id();
        if store::load::<T>(&tx, id)?.is_some() {
            return Err(StoreError::DuplicateId(id));
        }
        store::write(&tx, &specs, &doc, false)?;
        tx.commit()?;
        Ok(doc)
    }

    pub async fn get(&self, id: RecordId) -> Result<Option<T>, StoreError> {
        let guard = self.store.lock().await;
        store::load(&guard.conn, id)
    }

    /// Documents matching the filter, in identifier order.
    ///
    /// Equality conditions run in SQL against the rendered fields; `contains`
    /// conditions are matched on the decoded documents.
    pub async fn find(&self, filter: &Filter) -> Result<Vec<T>, StoreError> {
        let guard = self.store.lock().await;

        let mut clauses = Vec::new();
        let mut values = Vec::new();
        let mut needles = Vec::new();
        for condition in filter.conditions() {
            match condition {
                Condition::Eq { field, value } => {
                    values.push(value.as_str());
                    clauses.push(format!("{} = ?{}", store::field_expr(field), values.len()));
                }
                Condition::Contains(text) => needles.push(text.to_lowercase()),
            }
        }
        let mut sql = format!("SELECT body FROM {}", quote(T::COLLECTION));
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY id");

        let text_fields: Vec<&'static str> = guard
            .specs(T::COLLECTION)
            .iter()
            .filter(|s| s.kind == IndexKind::Text)
            .flat_map(|s| s.fields)
            .copied()
            .collect();

        let mut stmt = guard.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |row| row.get::<_, String>(0))?;
        let mut found = Vec::new();
        for body in rows {
            let doc: T = serde_json::from_str(&body?)?;
            let matched = needles.iter().all(|needle| {
                text_fields
                    .iter()
                    .filter_map(|f| doc.field(f))
                    .any(|value| value.to_lowercase().contains(needle))
            });
            if matched {
                found.push(doc);
            }
        }
        Ok(found)
    }

    pub async fn count(&self, filter: &Filter) -> Result<usize, StoreError> {
        Ok(self.find(filter).await?.len())
    }

    pub async fn len(&self) -> Result<usize, StoreError> {
        let guard = self.store.lock().await;
        let count: i64 = guard.conn.query_row(
            &format!("SELECT count(*) FROM {}", quote(T::COLLECTION)),
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    pub async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len().await? == 0)
    }

    /// Conditionally rewrite one document.
    ///
    /// `apply` receives a private copy of the current document. Returning
    /// `Err` rolls the transaction back and leaves the stored document
    /// untouched; returning `Ok` replaces it, provided unique indexes still
    /// hold. The closure must not change the document id.
    pub async fn update<F, E>(&self, id: RecordId, apply: F) -> Result<T, E>
    where
        F: FnOnce(&mut T) -> Result<(), E>,
        E: From<StoreError>,
    {
        let mut guard = self.store.lock().await;
        let specs = guard.specs(T::COLLECTION);
        let tx = guard
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;

        let mut next: T = store::load(&tx, id)?.ok_or(StoreError::NotFound(id))?;
        apply(&mut next)?;
        debug_assert_eq!(next.id(), id, "update must not change the document id");

        store::write(&tx, &specs, &next, true)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(next)
    }

    pub async fn delete(&self, id: RecordId) -> Result<T, StoreError> {
        let mut guard = self.store.lock().await;
        let tx = guard
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let doc: T = store::load(&tx, id)?.ok_or(StoreError::NotFound(id))?;
        tx.execute(
            &format!("DELETE FROM {} WHERE id = ?1", quote(T::COLLECTION)),
            params![id.to_string()],
        )?;
        tx.commit()?;
        Ok(doc)
    }
}
