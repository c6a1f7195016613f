//! SQLite layout shared by every collection.
//!
//! Each collection is a table of `(id, body, fields)` rows: `body` is the
//! document as JSON and `fields` the JSON object of its rendered index
//! fields. Keyed indexes are expression indexes over `fields`.

use std::any::TypeId;
use std::collections::HashMap;

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::{Map, Value};

use crate::document::{Document, IndexKind, IndexSpec};
use crate::error::StoreError;
use crate::id::RecordId;

pub(crate) const MIGRATIONS_TABLE: &str = "_libris_migrations";

/// Connection plus the index definitions registered on this process.
pub(crate) struct Store {
    pub(crate) conn: Connection,
    indexes: HashMap<&'static str, Vec<IndexSpec>>,
    types: HashMap<&'static str, TypeId>,
}

impl Store {
    pub(crate) fn new(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {MIGRATIONS_TABLE} (
                id TEXT PRIMARY KEY NOT NULL,
                collection TEXT NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );"
        ))?;
        Ok(Self {
            conn,
            indexes: HashMap::new(),
            types: HashMap::new(),
        })
    }

    pub(crate) fn specs(&self, collection: &str) -> Vec<IndexSpec> {
        self.indexes.get(collection).cloned().unwrap_or_default()
    }

    /// Remember index definitions for query planning. Names already known
    /// are skipped.
    pub(crate) fn register(&mut self, collection: &'static str, specs: &[IndexSpec]) {
        let known = self.indexes.entry(collection).or_default();
        for spec in specs {
            if !known.iter().any(|k| k.name == spec.name) {
                known.push(*spec);
            }
        }
    }

    pub(crate) fn bind_type<T: Document>(&mut self) -> Result<(), StoreError> {
        let wanted = TypeId::of::<T>();
        match self.types.get(T::COLLECTION) {
            Some(bound) if *bound != wanted => Err(StoreError::CollectionType(T::COLLECTION)),
            Some(_) => Ok(()),
            None => {
                ensure_table(&self.conn, T::COLLECTION)?;
                self.types.insert(T::COLLECTION, wanted);
                Ok(())
            }
        }
    }
}

pub(crate) fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

pub(crate) fn field_expr(field: &str) -> String {
    format!("json_extract(fields, '$.{}')", field.replace('\'', "''"))
}

pub(crate) fn ensure_table(conn: &Connection, collection: &str) -> Result<(), StoreError> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} (
            id TEXT PRIMARY KEY NOT NULL,
            body TEXT NOT NULL,
            fields TEXT NOT NULL
        );",
        quote(collection)
    ))?;
    Ok(())
}

fn key_exprs(spec: &IndexSpec) -> Vec<String> {
    spec.fields.iter().map(|f| field_expr(f)).collect()
}

fn any_present(exprs: &[String]) -> String {
    exprs
        .iter()
        .map(|e| format!("{e} IS NOT NULL"))
        .collect::<Vec<_>>()
        .join(" OR ")
}

fn render_key(key: &[Option<String>]) -> String {
    key.iter()
        .map(|part| part.as_deref().unwrap_or("<absent>"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Create the SQL index backing `spec`. Unique indexes are refused when the
/// stored rows already hold a duplicate key.
pub(crate) fn create_index(
    conn: &Connection,
    collection: &str,
    spec: &IndexSpec,
) -> Result<(), StoreError> {
    let exprs = key_exprs(spec);
    let sql = match spec.kind {
        IndexKind::Text => return Ok(()),
        IndexKind::Secondary => format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
            quote(spec.name),
            quote(collection),
            exprs.join(", ")
        ),
        IndexKind::Unique { sparse } => {
            let filter = if sparse {
                format!(" WHERE {}", any_present(&exprs))
            } else {
                String::new()
            };
            let duplicate = conn
                .query_row(
                    &format!(
                        "SELECT {cols} FROM {table}{filter} GROUP BY {cols} HAVING count(*) > 1 LIMIT 1",
                        cols = exprs.join(", "),
                        table = quote(collection),
                    ),
                    [],
                    |row| {
                        (0..exprs.len())
                            .map(|i| row.get::<_, Option<String>>(i))
                            .collect::<Result<Vec<_>, _>>()
                    },
                )
                .optional()?;
            if let Some(key) = duplicate {
                return Err(StoreError::UniqueViolation {
                    index: spec.name,
                    value: render_key(&key),
                });
            }
            format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ({}){filter}",
                quote(spec.name),
                quote(collection),
                exprs.join(", ")
            )
        }
    };
    conn.execute_batch(&sql)?;
    tracing::debug!(collection, index = spec.name, kind = ?spec.kind, "index ready");
    Ok(())
}

/// Rendered index fields of `doc`, absent ones as JSON null.
pub(crate) fn render_fields<T: Document>(doc: &T) -> Map<String, Value> {
    T::FIELDS
        .iter()
        .map(|f| {
            let value = doc.field(f).map_or(Value::Null, Value::String);
            (f.to_string(), value)
        })
        .collect()
}

/// Reject `fields` when another row already holds the same key in a unique
/// index. Absent keys collide unless the index is sparse.
pub(crate) fn check_unique(
    conn: &Connection,
    collection: &str,
    specs: &[IndexSpec],
    fields: &Map<String, Value>,
    owner: RecordId,
) -> Result<(), StoreError> {
    for spec in specs {
        let IndexKind::Unique { sparse } = spec.kind else {
            continue;
        };
        let key: Vec<Option<String>> = spec
            .fields
            .iter()
            .map(|f| fields.get(*f).and_then(Value::as_str).map(str::to_string))
            .collect();
        if sparse && key.iter().all(Option::is_none) {
            continue;
        }

        let clauses: Vec<String> = key_exprs(spec)
            .iter()
            .enumerate()
            .map(|(i, e)| format!("{e} IS ?{}", i + 1))
            .collect();
        let sql = format!(
            "SELECT 1 FROM {} WHERE {} AND id <> ?{} LIMIT 1",
            quote(collection),
            clauses.join(" AND "),
            key.len() + 1
        );
        let mut bound = key.clone();
        bound.push(Some(owner.to_string()));
        let taken = conn
            .query_row(&sql, params_from_iter(bound.iter()), |_| Ok(()))
            .optional()?
            .is_some();
        if taken {
            return Err(StoreError::UniqueViolation {
                index: spec.name,
                value: render_key(&key),
            });
        }
    }
    Ok(())
}

pub(crate) fn load<T: Document>(conn: &Connection, id: RecordId) -> Result<Option<T>, StoreError> {
    let body: Option<String> = conn
        .query_row(
            &format!("SELECT body FROM {} WHERE id = ?1", quote(T::COLLECTION)),
            params![id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    body.map(|b| serde_json::from_str(&b).map_err(StoreError::from))
        .transpose()
}

pub(crate) fn write<T: Document>(
    conn: &Connection,
    specs: &[IndexSpec],
    doc: &T,
    replace: bool,
) -> Result<(), StoreError> {
    let id = doc.id();
    let fields = render_fields(doc);
    check_unique(conn, T::COLLECTION, specs, &fields, id)?;

    let body = serde_json::to_string(doc)?;
    let fields = Value::Object(fields).to_string();
    let table = quote(T::COLLECTION);
    if replace {
        conn.execute(
            &format!("UPDATE {table} SET body = ?2, fields = ?3 WHERE id = ?1"),
            params![id.to_string(), body, fields],
        )?;
    } else {
        conn.execute(
            &format!("INSERT INTO {table} (id, body, fields) VALUES (?1, ?2, ?3)"),
            params![id.to_string(), body, fields],
        )?;
    }
    Ok(())
}
