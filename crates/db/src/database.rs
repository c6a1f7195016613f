use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tokio::sync::Mutex;

use crate::collection::Collection;
use crate::document::{Document, IndexSpec};
use crate::error::StoreError;
use crate::store::{self, Store, MIGRATIONS_TABLE};

/// Where the database keeps its rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Engine {
    /// Private in-memory database, gone when the handle is dropped.
    Memory,
    /// SQLite file, created along with its parent directory when missing.
    File(PathBuf),
}

/// Named set of collections plus the index migrations applied to them.
pub struct Database {
    name: String,
    store: Arc<Mutex<Store>>,
}

impl Database {
    pub fn open(name: impl Into<String>, engine: &Engine) -> Result<Self, StoreError> {
        let name = name.into();
        let conn = match engine {
            Engine::Memory => Connection::open_in_memory()?,
            Engine::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                let conn = Connection::open(path)?;
                conn.busy_timeout(Duration::from_secs(5))?;
                conn
            }
        };
        let store = Store::new(conn)?;
        tracing::info!(database = %name, engine = ?engine, "database opened");
        Ok(Self {
            name,
            store: Arc::new(Mutex::new(store)),
        })
    }

    pub fn in_memory(name: impl Into<String>) -> Result<Self, StoreError> {
        Self::open(name, &Engine::Memory)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Apply index definitions to a collection once per migration id.
    ///
    /// Returns `false` when the migration was already applied, in which case
    /// the definitions are only registered with this handle. A fresh
    /// migration creates its indexes and records its id in one transaction;
    /// on failure nothing is recorded or registered.
    pub async fn apply_indexes(
        &self,
        migration_id: &str,
        collection: &'static str,
        specs: &[IndexSpec],
    ) -> Result<bool, StoreError> {
        let mut guard = self.store.lock().await;
        let state = &mut *guard;
        let tx = state
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let applied = tx
            .query_row(
                &format!("SELECT 1 FROM {MIGRATIONS_TABLE} WHERE id = ?1"),
                params![migration_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !applied {
            store::ensure_table(&tx, collection)?;
            for spec in specs {
                store::create_index(&tx, collection, spec)?;
            }
            tx.execute(
                &format!("INSERT INTO {MIGRATIONS_TABLE} (id, collection) VALUES (?1, ?2)"),
                params![migration_id, collection],
            )?;
        }
        tx.commit()?;
        state.register(collection, specs);

        if applied {
            tracing::debug!(migration = migration_id, "migration already applied");
        } else {
            tracing::info!(
                database = %self.name,
                migration = migration_id,
                collection,
                indexes = specs.len(),
                "migration applied"
            );
        }
        Ok(!applied)
    }

    /// Ids of every migration applied so far, in lexical order.
    pub async fn applied_migrations(&self) -> Result<Vec<String>, StoreError> {
        let guard = self.store.lock().await;
        let mut stmt = guard
            .conn
            .prepare(&format!("SELECT id FROM {MIGRATIONS_TABLE} ORDER BY id"))?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Index definitions registered for `collection` on this handle.
    pub async fn indexes(&self, collection: &str) -> Vec<IndexSpec> {
        self.store.lock().await.specs(collection)
    }

    /// Handle onto the collection for `T`, creating its table on first use.
    pub async fn collection<T: Document>(&self) -> Result<Arc<Collection<T>>, StoreError> {
        self.store.lock().await.bind_type::<T>()?;
        tracing::debug!(database = %self.name, collection = T::COLLECTION, "collection ready");
        Ok(Arc::new(Collection::new(self.store.clone())))
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::{Filter, RecordId};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Tag {
        id: RecordId,
        slug: String,
    }

    impl Document for Tag {
        const COLLECTION: &'static str = "tags";
        const FIELDS: &'static [&'static str] = &["slug"];

        fn id(&self) -> RecordId {
            self.id
        }

        fn field(&self, name: &str) -> Option<String> {
            (name == "slug").then(|| self.slug.clone())
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Impostor {
        id: RecordId,
    }

    impl Document for Impostor {
        const COLLECTION: &'static str = "tags";
        const FIELDS: &'static [&'static str] = &[];

        fn id(&self) -> RecordId {
            self.id
        }

        fn field(&self, _name: &str) -> Option<String> {
            None
        }
    }

    const TAG_INDEXES: &[IndexSpec] = &[IndexSpec::unique("tag_slug_unique", &["slug"])];

    fn tag(slug: &str) -> Tag {
        Tag {
            id: RecordId::generate(),
            slug: slug.to_string(),
        }
    }

    #[tokio::test]
    async fn migrations_apply_once() {
        let db = Database::in_memory("test").unwrap();
        assert!(db.apply_indexes("tags/001", "tags", TAG_INDEXES).await.unwrap());
        assert!(!db.apply_indexes("tags/001", "tags", TAG_INDEXES).await.unwrap());
        assert_eq!(db.applied_migrations().await.unwrap(), vec!["tags/001".to_string()]);
        assert_eq!(db.indexes("tags").await, TAG_INDEXES.to_vec());
    }

    #[tokio::test]
    async fn indexes_reach_collections_created_before_and_after() {
        let early = Database::in_memory("early").unwrap();
        let tags = early.collection::<Tag>().await.unwrap();
        early.apply_indexes("tags/001", "tags", TAG_INDEXES).await.unwrap();
        tags.insert(tag("rust")).await.unwrap();
        assert!(tags.insert(tag("rust")).await.is_err());

        let late = Database::in_memory("late").unwrap();
        late.apply_indexes("tags/001", "tags", TAG_INDEXES).await.unwrap();
        let tags = late.collection::<Tag>().await.unwrap();
        tags.insert(tag("rust")).await.unwrap();
        assert!(tags.insert(tag("rust")).await.is_err());
    }

    #[tokio::test]
    async fn failed_migration_registers_nothing_and_can_be_retried() {
        let db = Database::in_memory("retry").unwrap();
        let tags = db.collection::<Tag>().await.unwrap();
        tags.insert(tag("rust")).await.unwrap();
        let twin = tags.insert(tag("rust")).await.unwrap();

        let err = db
            .apply_indexes("tags/001", "tags", TAG_INDEXES)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { index: "tag_slug_unique", .. }));
        assert!(db.indexes("tags").await.is_empty());
        assert!(db.applied_migrations().await.unwrap().is_empty());

        tags.delete(twin.id).await.unwrap();
        assert!(db.apply_indexes("tags/001", "tags", TAG_INDEXES).await.unwrap());
        assert_eq!(db.indexes("tags").await.len(), 1);
    }

    #[tokio::test]
    async fn collection_handles_share_storage() {
        let db = Database::in_memory("shared").unwrap();
        let first = db.collection::<Tag>().await.unwrap();
        let second = db.collection::<Tag>().await.unwrap();
        first.insert(tag("go")).await.unwrap();
        assert_eq!(second.count(&Filter::new()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn mismatched_document_type_is_rejected() {
        let db = Database::in_memory("typed").unwrap();
        db.collection::<Tag>().await.unwrap();
        let err = db.collection::<Impostor>().await.err().unwrap();
        assert!(matches!(err, StoreError::CollectionType("tags")));
    }

    #[tokio::test]
    async fn file_database_survives_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::File(dir.path().join("nested").join("libris.db"));

        let kept = {
            let db = Database::open("first", &engine).unwrap();
            assert!(db.apply_indexes("tags/001", "tags", TAG_INDEXES).await.unwrap());
            let tags = db.collection::<Tag>().await.unwrap();
            tags.insert(tag("rust")).await.unwrap()
        };

        let db = Database::open("second", &engine).unwrap();
        assert!(!db.apply_indexes("tags/001", "tags", TAG_INDEXES).await.unwrap());
        assert_eq!(db.applied_migrations().await.unwrap(), vec!["tags/001".to_string()]);

        let tags = db.collection::<Tag>().await.unwrap();
        let found = tags.get(kept.id).await.unwrap().unwrap();
        assert_eq!(found.slug, "rust");
        assert!(matches!(
            tags.insert(tag("rust")).await,
            Err(StoreError::UniqueViolation { .. })
        ));
    }
}
