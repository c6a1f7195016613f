//! Libris application library
//!
//! Wires the catalogue modules into the kernel registry and runs the
//! application lifecycle.

use anyhow::Context;
use libris_db::Database;
use libris_kernel::{settings::Settings, InitCtx, ModuleRegistry};

pub mod modules;

/// A registry holding every application module.
pub fn build_registry() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    modules::register_all(&mut registry);
    registry
}

/// Open the document store selected by the database settings.
pub fn open_database(settings: &Settings) -> anyhow::Result<Database> {
    let engine = settings.database.store_engine();
    Database::open(settings.database.name.clone(), &engine)
        .with_context(|| format!("failed to open database {engine:?}"))
}

/// Initialize the modules against `db` and apply their migrations.
///
/// Returns the registry ready to be served; modules are not started yet.
pub async fn bootstrap(settings: &Settings, db: &Database) -> anyhow::Result<ModuleRegistry> {
    let registry = build_registry();
    let ctx = InitCtx { settings, db };

    registry
        .init_modules(&ctx)
        .await
        .context("failed to initialize modules")?;
    let applied = registry
        .apply_migrations(db)
        .await
        .context("failed to apply migrations")?;
    tracing::info!(
        modules = registry.module_count(),
        migrations = applied,
        "bootstrap complete"
    );

    Ok(registry)
}

/// Run the full application lifecycle: bootstrap, start, serve until a
/// shutdown signal, then stop the modules in reverse order.
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    tracing::info!(
        env = ?settings.environment,
        db = %settings.database.name,
        engine = ?settings.database.engine,
        "libris-app starting"
    );

    let db = open_database(&settings)?;
    let registry = bootstrap(&settings, &db).await?;
    let ctx = InitCtx {
        settings: &settings,
        db: &db,
    };

    registry
        .start_modules(&ctx)
        .await
        .context("failed to start modules")?;

    let served = libris_http::start_server(&registry, &settings).await;

    registry
        .stop_modules()
        .await
        .context("failed to stop modules")?;
    served
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bootstrap_registers_and_migrates_books() {
        let settings = Settings::default();
        let db = Database::in_memory("bootstrap-test").unwrap();

        let registry = bootstrap(&settings, &db).await.unwrap();
        assert!(registry.get_module("books").is_some());
        assert_eq!(
            db.applied_migrations().await.unwrap(),
            vec!["books/001_book_indexes".to_string()]
        );
    }

    #[test]
    fn merged_openapi_document_parses_for_swagger() {
        let document = libris_http::router::openapi_document(&build_registry());
        let parsed: utoipa::openapi::OpenApi = serde_json::from_value(document).unwrap();
        assert!(parsed.paths.paths.contains_key("/api/books/admin"));
        assert!(parsed.paths.paths.contains_key("/api/books/{id}/renew"));
    }

    #[tokio::test]
    async fn configured_file_database_is_reused_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.database.path = dir.path().join("libris.db");

        {
            let db = open_database(&settings).unwrap();
            bootstrap(&settings, &db).await.unwrap();
        }

        let db = open_database(&settings).unwrap();
        let registry = bootstrap(&settings, &db).await.unwrap();
        assert!(registry.get_module("books").is_some());
        assert_eq!(db.applied_migrations().await.unwrap().len(), 1);
        assert!(dir.path().join("libris.db").exists());
    }
}
