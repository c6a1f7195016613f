use std::sync::Arc;

use libris_db::{Collection, Filter, RecordId};
use libris_kernel::settings::{CatalogueSettings, LendingSettings, Settings};
use time::OffsetDateTime;

use super::error::BookError;
use super::models::{Book, BookInput, BorrowRequest, CatalogueStats, RenewRequest};
use super::query::{paginate, sort_newest_first, AdminListQuery, ListFilters, Page};
use super::validation::{borrower_from, loan_weeks, require_title_and_author, validate_book};

/// Source of the current time for lending decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Catalogue operations and lending transitions over the book collection.
///
/// Every mutation is a single conditional update of one record: the
/// precondition is checked against the stored copy inside the store's
/// write transaction, so two concurrent borrowers cannot both see the book as
/// available.
pub struct Catalogue {
    books: Arc<Collection<Book>>,
    lending: LendingSettings,
    paging: CatalogueSettings,
    clock: Arc<dyn Clock>,
}

impl Catalogue {
    pub fn new(books: Arc<Collection<Book>>, settings: &Settings) -> Self {
        Self {
            books,
            lending: settings.lending.clone(),
            paging: settings.catalogue.clone(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    pub async fn list(&self, filters: &ListFilters) -> Result<Vec<Book>, BookError> {
        let mut books = self.books.find(&filters.to_filter()).await?;
        sort_newest_first(&mut books);
        Ok(books)
    }

    pub async fn list_page(&self, query: &AdminListQuery) -> Result<Page<Book>, BookError> {
        let limit = query
            .limit
            .unwrap_or(self.paging.page_size)
            .clamp(1, self.paging.max_page_size);
        let page = query.page.unwrap_or(1);
        Ok(paginate(self.list(&query.filters()).await?, page, limit))
    }

    pub async fn get(&self, id: &str) -> Result<Book, BookError> {
        let id = parse_id(id)?;
        self.books.get(id).await?.ok_or(BookError::NotFound)
    }

    pub async fn create(&self, input: BookInput) -> Result<Book, BookError> {
        require_title_and_author(&input)?;
        let mut book = Book::new(self.lending.max_renewals, self.now());
        input.apply_to(&mut book);
        validate_book(&book)?;

        let book = self.books.insert(book).await?;
        tracing::info!(book_id = %book.id, title = %book.title, "book created");
        Ok(book)
    }

    /// Merge `input` into the stored record and re-check every constraint,
    /// ISBN uniqueness included, against the merged result.
    pub async fn update(&self, id: &str, input: BookInput) -> Result<Book, BookError> {
        let id = parse_id(id)?;
        let now = self.now();

        let book = self
            .books
            .update(id, |book| {
                input.apply_to(book);
                book.updated_at = now;
                validate_book(book)
            })
            .await?;
        tracing::info!(book_id = %book.id, "book updated");
        Ok(book)
    }

    pub async fn delete(&self, id: &str) -> Result<Book, BookError> {
        let id = parse_id(id)?;
        let book = self.books.delete(id).await?;
        tracing::info!(book_id = %book.id, title = %book.title, "book deleted");
        Ok(book)
    }

    pub async fn borrow(&self, id: &str, request: BorrowRequest) -> Result<Book, BookError> {
        let id = parse_id(id)?;
        let borrower = borrower_from(&request)?;
        let weeks = loan_weeks(
            request.weeks.unwrap_or(self.lending.default_loan_weeks),
            self.lending.max_loan_weeks,
        )?;
        let now = self.now();

        let book = self
            .books
            .update(id, |book| book.borrow(borrower, weeks, now).map(|_| ()))
            .await?;

        if let Some(loan) = book.loan() {
            tracing::info!(
                book_id = %book.id,
                borrower_id = %loan.borrower.id,
                due_date = %loan.due_date,
                "book borrowed"
            );
        }
        Ok(book)
    }

    pub async fn return_book(&self, id: &str) -> Result<Book, BookError> {
        let id = parse_id(id)?;
        let mut returned = None;

        let book = self
            .books
            .update(id, |book| {
                returned = Some(book.mark_returned()?);
                Ok::<(), BookError>(())
            })
            .await?;

        if let Some(loan) = returned {
            tracing::info!(
                book_id = %book.id,
                borrower_id = %loan.borrower.id,
                overdue = loan.due_date < self.now(),
                "book returned"
            );
        }
        Ok(book)
    }

    pub async fn renew(&self, id: &str, request: RenewRequest) -> Result<Book, BookError> {
        let id = parse_id(id)?;
        let weeks = loan_weeks(
            request.weeks.unwrap_or(self.lending.default_renewal_weeks),
            self.lending.max_loan_weeks,
        )?;

        let book = self
            .books
            .update(id, |book| book.renew(weeks).map(|_| ()))
            .await?;

        if let Some(loan) = book.loan() {
            tracing::info!(
                book_id = %book.id,
                renewal_count = loan.renewal_count,
                due_date = %loan.due_date,
                "loan renewed"
            );
        }
        Ok(book)
    }

    /// Counters over one read of the collection, so they always agree.
    pub async fn stats(&self) -> Result<CatalogueStats, BookError> {
        let now = self.now();
        let books = self.books.find(&Filter::new()).await?;
        let borrowed = books.iter().filter(|b| !b.available()).count();
        let overdue = books.iter().filter(|b| b.is_overdue(now)).count();

        Ok(CatalogueStats {
            total: books.len(),
            available: books.len() - borrowed,
            borrowed,
            overdue,
        })
    }

    pub async fn count(&self) -> Result<usize, BookError> {
        Ok(self.books.len().await?)
    }
}

/// Malformed identifiers cannot name a record, so they read as not found.
fn parse_id(raw: &str) -> Result<RecordId, BookError> {
    RecordId::parse(raw).ok_or(BookError::NotFound)
}
