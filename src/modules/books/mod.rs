pub mod error;
pub mod lending;
pub mod models;
pub mod query;
pub mod routes;
pub mod service;
pub mod validation;

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use libris_db::{Document, IndexSpec};
use libris_kernel::{InitCtx, Migration, Module};
use once_cell::sync::OnceCell;
use serde_json::json;

use models::Book;
use service::Catalogue;

/// Name of the sparse unique index guarding ISBNs.
pub const ISBN_INDEX: &str = "book_isbn_unique";

pub const BOOK_INDEXES: &[IndexSpec] = &[
    IndexSpec::unique_sparse(ISBN_INDEX, &["isbn"]),
    IndexSpec::text("book_search_text", &["title", "author", "description"]),
    IndexSpec::secondary("book_genre_category", &["genre", "category"]),
    IndexSpec::secondary("book_availability", &["available", "status"]),
];

/// Catalogue and lending module
pub struct BooksModule {
    catalogue: OnceCell<Arc<Catalogue>>,
}

impl BooksModule {
    pub const fn new() -> Self {
        Self {
            catalogue: OnceCell::new(),
        }
    }

    /// The catalogue service, available once the module is initialized.
    pub fn catalogue(&self) -> Option<Arc<Catalogue>> {
        self.catalogue.get().cloned()
    }
}

impl Default for BooksModule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Module for BooksModule {
    fn name(&self) -> &'static str {
        "books"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        let books = ctx.db.collection::<Book>().await?;
        let catalogue = Arc::new(Catalogue::new(books, ctx.settings));
        if self.catalogue.set(catalogue).is_err() {
            anyhow::bail!("books module initialized twice");
        }

        tracing::info!(
            module = self.name(),
            environment = ?ctx.settings.environment,
            max_renewals = ctx.settings.lending.max_renewals,
            "books module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        match self.catalogue.get() {
            Some(catalogue) => routes::router(catalogue.clone()),
            None => {
                tracing::warn!(module = self.name(), "routes requested before init; mounting none");
                Router::new()
            }
        }
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        Some(openapi_fragment())
    }

    fn migrations(&self) -> Vec<Migration> {
        vec![Migration {
            id: "001_book_indexes",
            collection: Book::COLLECTION,
            indexes: BOOK_INDEXES,
        }]
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        if let Some(catalogue) = self.catalogue.get() {
            let books = catalogue.count().await?;
            tracing::info!(module = self.name(), books, "books module started");
        }
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module stopped");
        Ok(())
    }
}

fn error_response(description: &str) -> serde_json::Value {
    json!({
        "description": description,
        "content": {
            "application/json": {
                "schema": { "$ref": "#/components/schemas/ErrorResponse" }
            }
        }
    })
}

fn envelope(description: &str, data: serde_json::Value) -> serde_json::Value {
    json!({
        "description": description,
        "content": {
            "application/json": {
                "schema": {
                    "type": "object",
                    "properties": {
                        "success": { "type": "boolean" },
                        "message": { "type": "string" },
                        "count": { "type": "integer" },
                        "data": data
                    },
                    "required": ["success", "message", "data"]
                }
            }
        }
    })
}

fn id_parameter() -> serde_json::Value {
    json!({
        "name": "id",
        "in": "path",
        "required": true,
        "schema": { "type": "string" }
    })
}

fn filter_parameters() -> Vec<serde_json::Value> {
    let query = |name: &str, schema: serde_json::Value, description: &str| {
        json!({
            "name": name,
            "in": "query",
            "required": false,
            "schema": schema,
            "description": description
        })
    };
    vec![
        query("q", json!({"type": "string"}), "Search title, author and description"),
        query("category", json!({"type": "string"}), "Exact category"),
        query("genre", json!({"type": "string"}), "Exact genre"),
        query("available", json!({"type": "boolean"}), "Availability"),
        query(
            "status",
            json!({"$ref": "#/components/schemas/BookStatus"}),
            "Lending status",
        ),
    ]
}

fn openapi_fragment() -> serde_json::Value {
    let book = || json!({ "$ref": "#/components/schemas/Book" });
    let book_input = || json!({
        "content": {
            "application/json": {
                "schema": { "$ref": "#/components/schemas/BookInput" }
            }
        }
    });
    let mut admin_parameters = filter_parameters();
    for name in ["page", "limit"] {
        admin_parameters.push(json!({
            "name": name,
            "in": "query",
            "required": false,
            "schema": {"type": "integer", "minimum": 1}
        }));
    }

    let lending = |summary: &str, body: Option<&str>| {
        let mut op = json!({
            "summary": summary,
            "tags": ["Lending"],
            "parameters": [id_parameter()],
            "responses": {
                "200": envelope("Updated book", book()),
                "400": error_response("Invalid input"),
                "404": error_response("Book not found"),
                "409": error_response("Lending precondition failed")
            }
        });
        if let Some(schema) = body {
            op["requestBody"] = json!({
                "content": {
                    "application/json": {
                        "schema": { "$ref": format!("#/components/schemas/{schema}") }
                    }
                }
            });
        }
        op
    };

    json!({
        "paths": {
            "/": {
                "get": {
                    "summary": "List books",
                    "tags": ["Books"],
                    "parameters": filter_parameters(),
                    "responses": {
                        "200": envelope("Matching books, newest first", json!({"type": "array", "items": book()})),
                        "400": error_response("Invalid query")
                    }
                },
                "post": {
                    "summary": "Create a book",
                    "tags": ["Books"],
                    "requestBody": book_input(),
                    "responses": {
                        "201": envelope("Created book", book()),
                        "409": error_response("Duplicate ISBN"),
                        "422": error_response("Validation error")
                    }
                }
            },
            "/admin": {
                "get": {
                    "summary": "List books page by page",
                    "tags": ["Books"],
                    "parameters": admin_parameters,
                    "responses": {
                        "200": envelope("One page of books", json!({ "$ref": "#/components/schemas/BookPage" }))
                    }
                }
            },
            "/stats": {
                "get": {
                    "summary": "Catalogue counters",
                    "tags": ["Books"],
                    "responses": {
                        "200": envelope("Counters", json!({ "$ref": "#/components/schemas/CatalogueStats" }))
                    }
                }
            },
            "/health": {
                "get": {
                    "summary": "Books health check",
                    "tags": ["Books"],
                    "responses": {
                        "200": {
                            "description": "OK",
                            "content": { "text/plain": { "schema": { "type": "string" } } }
                        }
                    }
                }
            },
            "/{id}": {
                "get": {
                    "summary": "Get a book",
                    "tags": ["Books"],
                    "parameters": [id_parameter()],
                    "responses": {
                        "200": envelope("The book", book()),
                        "404": error_response("Book not found")
                    }
                },
                "put": {
                    "summary": "Update a book",
                    "tags": ["Books"],
                    "parameters": [id_parameter()],
                    "requestBody": book_input(),
                    "responses": {
                        "200": envelope("Updated book", book()),
                        "404": error_response("Book not found"),
                        "409": error_response("Duplicate ISBN"),
                        "422": error_response("Validation error")
                    }
                },
                "patch": {
                    "summary": "Update a book",
                    "tags": ["Books"],
                    "parameters": [id_parameter()],
                    "requestBody": book_input(),
                    "responses": {
                        "200": envelope("Updated book", book()),
                        "404": error_response("Book not found"),
                        "409": error_response("Duplicate ISBN"),
                        "422": error_response("Validation error")
                    }
                },
                "delete": {
                    "summary": "Delete a book",
                    "tags": ["Books"],
                    "parameters": [id_parameter()],
                    "responses": {
                        "200": envelope("Deleted book", book()),
                        "404": error_response("Book not found")
                    }
                }
            },
            "/{id}/borrow": { "post": lending("Borrow a book", Some("BorrowRequest")) },
            "/{id}/return": { "post": lending("Return a book", None) },
            "/{id}/renew": { "post": lending("Renew a loan", Some("RenewRequest")) }
        },
        "components": {
            "schemas": {
                "BookStatus": {
                    "type": "string",
                    "enum": ["Available", "Borrowed", "Reserved", "Checked Out"]
                },
                "Borrower": {
                    "type": "object",
                    "properties": {
                        "id": { "type": "string" },
                        "name": { "type": "string" },
                        "email": { "type": "string", "format": "email" }
                    },
                    "required": ["id", "name", "email"]
                },
                "Book": {
                    "type": "object",
                    "properties": {
                        "id": { "type": "string", "format": "uuid" },
                        "title": { "type": "string" },
                        "author": { "type": "string" },
                        "description": { "type": ["string", "null"] },
                        "genre": { "type": ["string", "null"] },
                        "category": { "type": ["string", "null"] },
                        "isbn": { "type": ["string", "null"] },
                        "coverImage": { "type": ["string", "null"] },
                        "publishedYear": { "type": ["integer", "null"] },
                        "rating": { "type": "number" },
                        "reviewCount": { "type": "integer" },
                        "tags": { "type": "array", "items": { "type": "string" } },
                        "isNewRelease": { "type": "boolean" },
                        "available": { "type": "boolean" },
                        "status": { "$ref": "#/components/schemas/BookStatus" },
                        "borrowedBy": { "$ref": "#/components/schemas/Borrower" },
                        "borrowedAt": { "type": "string", "format": "date-time" },
                        "borrowDate": { "type": "string", "format": "date-time" },
                        "dueDate": { "type": "string", "format": "date-time" },
                        "renewalCount": { "type": "integer" },
                        "maxRenewals": { "type": "integer" },
                        "isOverdue": { "type": "boolean" },
                        "createdAt": { "type": "string", "format": "date-time" },
                        "updatedAt": { "type": "string", "format": "date-time" }
                    },
                    "required": [
                        "id", "title", "author", "available", "status",
                        "renewalCount", "maxRenewals", "isOverdue", "createdAt", "updatedAt"
                    ]
                },
                "BookInput": {
                    "type": "object",
                    "properties": {
                        "title": { "type": "string", "minLength": 1, "maxLength": 200 },
                        "author": { "type": "string", "minLength": 1, "maxLength": 100 },
                        "description": { "type": "string", "maxLength": 2000 },
                        "genre": { "type": "string", "maxLength": 50 },
                        "category": { "type": "string", "maxLength": 50 },
                        "isbn": { "type": "string", "minLength": 10, "maxLength": 17 },
                        "coverImage": { "type": "string", "maxLength": 500 },
                        "publishedYear": { "type": "integer", "minimum": 1000, "maximum": 2100 },
                        "rating": { "type": "number", "minimum": 0, "maximum": 5 },
                        "reviewCount": { "type": "integer", "minimum": 0 },
                        "tags": { "type": "array", "items": { "type": "string" }, "maxItems": 20 },
                        "isNewRelease": { "type": "boolean" },
                        "maxRenewals": { "type": "integer", "minimum": 0, "maximum": 10 }
                    }
                },
                "BorrowRequest": {
                    "type": "object",
                    "properties": {
                        "borrowerId": { "type": "string" },
                        "borrowerName": { "type": "string" },
                        "borrowerEmail": { "type": "string", "format": "email" },
                        "weeks": { "type": "integer", "minimum": 1 }
                    },
                    "required": ["borrowerId", "borrowerName", "borrowerEmail"]
                },
                "RenewRequest": {
                    "type": "object",
                    "properties": {
                        "weeks": { "type": "integer", "minimum": 1 }
                    }
                },
                "BookPage": {
                    "type": "object",
                    "properties": {
                        "books": { "type": "array", "items": { "$ref": "#/components/schemas/Book" } },
                        "total": { "type": "integer" },
                        "page": { "type": "integer" },
                        "limit": { "type": "integer" },
                        "totalPages": { "type": "integer" }
                    }
                },
                "CatalogueStats": {
                    "type": "object",
                    "properties": {
                        "total": { "type": "integer" },
                        "available": { "type": "integer" },
                        "borrowed": { "type": "integer" },
                        "overdue": { "type": "integer" }
                    }
                }
            }
        }
    })
}

/// Create a new instance of the books module
pub fn create_module() -> Arc<dyn Module> {
    Arc::new(BooksModule::new())
}
