use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Path, Query, State},
    routing::{get, post},
    Router,
};
use libris_http::{ApiResponse, AppError};
use serde::de::DeserializeOwned;

use super::error::BookError;
use super::models::{BookInput, BookView, BorrowRequest, CatalogueStats, RenewRequest};
use super::query::{AdminListQuery, ListFilters, Page};
use super::service::Catalogue;

type HandlerResult<T> = Result<ApiResponse<T>, AppError>;

/// Routes of the books module, relative to its mount point.
pub fn router(catalogue: Arc<Catalogue>) -> Router {
    Router::new()
        .route("/", get(list_books).post(create_book))
        .route("/admin", get(admin_list_books))
        .route("/stats", get(catalogue_stats))
        .route("/health", get(health_check))
        .route(
            "/{id}",
            get(get_book)
                .put(update_book)
                .patch(update_book)
                .delete(delete_book),
        )
        .route("/{id}/borrow", post(borrow_book))
        .route("/{id}/return", post(return_book))
        .route("/{id}/renew", post(renew_book))
        .with_state(catalogue)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "books module is healthy"
}

async fn list_books(
    State(catalogue): State<Arc<Catalogue>>,
    filters: Result<Query<ListFilters>, QueryRejection>,
) -> HandlerResult<Vec<BookView>> {
    let Query(filters) = filters.map_err(query_error)?;
    let now = catalogue.now();
    let books: Vec<BookView> = catalogue
        .list(&filters)
        .await?
        .iter()
        .map(|book| book.view(now))
        .collect();

    let count = books.len();
    Ok(ApiResponse::ok(books, "Books retrieved successfully").with_count(count))
}

async fn admin_list_books(
    State(catalogue): State<Arc<Catalogue>>,
    query: Result<Query<AdminListQuery>, QueryRejection>,
) -> HandlerResult<Page<BookView>> {
    let Query(query) = query.map_err(query_error)?;
    let now = catalogue.now();
    let page = catalogue.list_page(&query).await?.map(|book| book.view(now));
    Ok(ApiResponse::ok(page, "Books retrieved successfully"))
}

async fn catalogue_stats(State(catalogue): State<Arc<Catalogue>>) -> HandlerResult<CatalogueStats> {
    Ok(ApiResponse::ok(
        catalogue.stats().await?,
        "Catalogue statistics retrieved successfully",
    ))
}

async fn get_book(
    State(catalogue): State<Arc<Catalogue>>,
    Path(id): Path<String>,
) -> HandlerResult<BookView> {
    let book = catalogue.get(&id).await?;
    Ok(ApiResponse::ok(
        book.view(catalogue.now()),
        "Book retrieved successfully",
    ))
}

async fn create_book(State(catalogue): State<Arc<Catalogue>>, body: Bytes) -> HandlerResult<BookView> {
    let input: BookInput = parse_body(&body)?;
    let book = catalogue.create(input).await?;
    Ok(ApiResponse::created(
        book.view(catalogue.now()),
        "Book created successfully",
    ))
}

async fn update_book(
    State(catalogue): State<Arc<Catalogue>>,
    Path(id): Path<String>,
    body: Bytes,
) -> HandlerResult<BookView> {
    let input: BookInput = parse_body(&body)?;
    let book = catalogue.update(&id, input).await?;
    Ok(ApiResponse::ok(
        book.view(catalogue.now()),
        "Book updated successfully",
    ))
}

async fn delete_book(
    State(catalogue): State<Arc<Catalogue>>,
    Path(id): Path<String>,
) -> HandlerResult<BookView> {
    let book = catalogue.delete(&id).await?;
    Ok(ApiResponse::ok(
        book.view(catalogue.now()),
        "Book deleted successfully",
    ))
}

async fn borrow_book(
    State(catalogue): State<Arc<Catalogue>>,
    Path(id): Path<String>,
    body: Bytes,
) -> HandlerResult<BookView> {
    let request: BorrowRequest = parse_body(&body)?;
    let book = catalogue.borrow(&id, request).await?;
    Ok(ApiResponse::ok(
        book.view(catalogue.now()),
        "Book borrowed successfully",
    ))
}

async fn return_book(
    State(catalogue): State<Arc<Catalogue>>,
    Path(id): Path<String>,
) -> HandlerResult<BookView> {
    let book = catalogue.return_book(&id).await?;
    Ok(ApiResponse::ok(
        book.view(catalogue.now()),
        "Book returned successfully",
    ))
}

async fn renew_book(
    State(catalogue): State<Arc<Catalogue>>,
    Path(id): Path<String>,
    body: Bytes,
) -> HandlerResult<BookView> {
    let request: RenewRequest = parse_body(&body)?;
    let book = catalogue.renew(&id, request).await?;
    Ok(ApiResponse::ok(
        book.view(catalogue.now()),
        "Book renewed successfully",
    ))
}

/// JSON body, where an empty body stands for an empty object.
fn parse_body<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, BookError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| BookError::InvalidInput(format!("malformed request body: {e}")))
}

fn query_error(rejection: QueryRejection) -> AppError {
    BookError::InvalidInput(format!("invalid query string: {}", rejection.body_text())).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::books::service::tests::{catalogue, ManualClock};
    use axum::{
        body::Body,
        http::{Method, Request as HttpRequest, StatusCode},
    };
    use serde_json::{json, Value};
    use time::{macros::datetime, Duration, OffsetDateTime};
    use tower::ServiceExt;

    const START: OffsetDateTime = datetime!(2024-05-01 10:00 UTC);

    async fn app() -> (Router, Arc<ManualClock>) {
        let clock = ManualClock::at(START);
        let catalogue = catalogue(clock.clone()).await;
        (router(Arc::new(catalogue)), clock)
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = HttpRequest::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let body = match body {
            Some(value) => Body::from(value.to_string()),
            None => Body::empty(),
        };
        let response = app
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn create(app: &Router, body: Value) -> String {
        let (status, value) = send(app, Method::POST, "/", Some(body)).await;
        assert_eq!(status, StatusCode::CREATED, "{value}");
        value["data"]["id"].as_str().unwrap().to_string()
    }

    fn borrower() -> Value {
        json!({
            "borrowerId": "u-1",
            "borrowerName": "Winston Smith",
            "borrowerEmail": "winston@example.com",
            "weeks": 3
        })
    }

    #[tokio::test]
    async fn create_and_fetch_a_book() {
        let (app, _) = app().await;
        let id = create(
            &app,
            json!({"title": "1984", "author": "George Orwell", "genre": "Dystopia"}),
        )
        .await;

        let (status, body) = send(&app, Method::GET, &format!("/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["title"], "1984");
        assert_eq!(body["data"]["category"], "Dystopia");
        assert_eq!(body["data"]["available"], true);
        assert_eq!(body["data"]["status"], "Available");
        assert_eq!(body["data"]["createdAt"], "2024-05-01T10:00:00Z");
    }

    #[tokio::test]
    async fn invalid_create_reports_fields() {
        let (app, _) = app().await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/",
            Some(json!({"title": "t".repeat(201), "author": "X", "rating": 9})),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "validation_error");
        let fields: Vec<&str> = body["error"]["details"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["field"].as_str().unwrap())
            .collect();
        assert_eq!(fields, vec!["rating", "title"]);
    }

    #[tokio::test]
    async fn malformed_body_is_invalid_input() {
        let (app, _) = app().await;
        let (status, body) = send(&app, Method::POST, "/", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(body["error"]["code"], "invalid_input");

        let response = app
            .clone()
            .oneshot(
                HttpRequest::builder()
                    .method(Method::POST)
                    .uri("/")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn duplicate_isbn_conflicts() {
        let (app, _) = app().await;
        let book = json!({"title": "Dune", "author": "Frank Herbert", "isbn": "9780441013593"});
        create(&app, book.clone()).await;

        let (status, body) = send(&app, Method::POST, "/", Some(book)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "duplicate_isbn");
    }

    #[tokio::test]
    async fn unknown_and_malformed_ids_are_not_found() {
        let (app, _) = app().await;
        for uri in ["/not-an-id", "/0190b6a4-5c3e-7000-8000-000000000000"] {
            let (status, body) = send(&app, Method::GET, uri, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(body["error"]["code"], "not_found");
        }
        let (status, _) = send(&app, Method::POST, "/nope/return", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn lending_lifecycle_over_http() {
        let (app, clock) = app().await;
        let id = create(&app, json!({"title": "1984", "author": "George Orwell"})).await;

        let (status, body) = send(&app, Method::POST, &format!("/{id}/borrow"), Some(borrower())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "Borrowed");
        assert_eq!(body["data"]["borrowedBy"]["email"], "winston@example.com");
        assert_eq!(body["data"]["dueDate"], "2024-05-22T10:00:00Z");

        let (status, body) = send(&app, Method::POST, &format!("/{id}/borrow"), Some(borrower())).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "not_available");

        let (status, body) = send(&app, Method::POST, &format!("/{id}/renew"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["dueDate"], "2024-06-05T10:00:00Z");
        assert_eq!(body["data"]["renewalCount"], 1);

        clock.advance(Duration::weeks(6));
        let (_, body) = send(&app, Method::GET, &format!("/{id}"), None).await;
        assert_eq!(body["data"]["isOverdue"], true);

        let (status, body) = send(&app, Method::POST, &format!("/{id}/return"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["available"], true);
        assert_eq!(body["data"]["renewalCount"], 0);
        assert!(body["data"].get("dueDate").is_none());
        assert_eq!(body["data"]["isOverdue"], false);

        let (status, body) = send(&app, Method::POST, &format!("/{id}/return"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "not_borrowed");
    }

    #[tokio::test]
    async fn borrow_requires_borrower_details() {
        let (app, _) = app().await;
        let id = create(&app, json!({"title": "Emma", "author": "Jane Austen"})).await;

        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/{id}/borrow"),
            Some(json!({"borrowerId": "u-1"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_input");
    }

    #[tokio::test]
    async fn renewal_cap_is_enforced() {
        let (app, _) = app().await;
        let id = create(
            &app,
            json!({"title": "Emma", "author": "Jane Austen", "maxRenewals": 1}),
        )
        .await;
        send(&app, Method::POST, &format!("/{id}/borrow"), Some(borrower())).await;

        let (status, _) = send(&app, Method::POST, &format!("/{id}/renew"), Some(json!({"weeks": 1}))).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = send(&app, Method::POST, &format!("/{id}/renew"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "renewal_limit_exceeded");
    }

    #[tokio::test]
    async fn listing_filters_and_counts() {
        let (app, _) = app().await;
        let dune = create(&app, json!({"title": "Dune", "author": "Frank Herbert", "genre": "SF"})).await;
        create(&app, json!({"title": "Emma", "author": "Jane Austen", "genre": "Romance"})).await;
        send(&app, Method::POST, &format!("/{dune}/borrow"), Some(borrower())).await;

        let (status, body) = send(&app, Method::GET, "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 2);

        let (_, body) = send(&app, Method::GET, "/?available=true", None).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["data"][0]["title"], "Emma");

        let (_, body) = send(&app, Method::GET, "/?status=Borrowed&q=herbert", None).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["data"][0]["title"], "Dune");

        let (_, body) = send(&app, Method::GET, "/?status=Checked%20Out", None).await;
        assert_eq!(body["count"], 0);

        let (status, body) = send(&app, Method::GET, "/?available=maybe", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_input");
    }

    #[tokio::test]
    async fn admin_listing_is_paginated() {
        let (app, _) = app().await;
        for n in 0..5 {
            create(&app, json!({"title": format!("Book {n}"), "author": "A"})).await;
        }

        let (status, body) = send(&app, Method::GET, "/admin?page=2&limit=2", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total"], 5);
        assert_eq!(body["data"]["page"], 2);
        assert_eq!(body["data"]["limit"], 2);
        assert_eq!(body["data"]["totalPages"], 3);
        assert_eq!(body["data"]["books"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn update_and_delete() {
        let (app, _) = app().await;
        let id = create(&app, json!({"title": "Emma", "author": "Jane Austen"})).await;

        let (status, body) = send(
            &app,
            Method::PATCH,
            &format!("/{id}"),
            Some(json!({"rating": 4.5, "available": false})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["rating"], 4.5);
        assert_eq!(body["data"]["available"], true);

        let (status, _) = send(&app, Method::DELETE, &format!("/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, Method::GET, &format!("/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn stats_and_health() {
        let (app, _) = app().await;
        create(&app, json!({"title": "Emma", "author": "Jane Austen"})).await;

        let (status, body) = send(&app, Method::GET, "/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!({"total": 1, "available": 1, "borrowed": 0, "overdue": 0}));

        let response = app
            .clone()
            .oneshot(HttpRequest::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
