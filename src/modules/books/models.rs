use libris_db::{Document, RecordId};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use validator::Validate;

/// Lending classification exposed to clients.
///
/// Only `Available` and `Borrowed` are produced by the lending transitions;
/// `Reserved` and `CheckedOut` are accepted as filter values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookStatus {
    Available,
    Borrowed,
    Reserved,
    #[serde(rename = "Checked Out")]
    CheckedOut,
}

impl BookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookStatus::Available => "Available",
            BookStatus::Borrowed => "Borrowed",
            BookStatus::Reserved => "Reserved",
            BookStatus::CheckedOut => "Checked Out",
        }
    }
}

/// Who holds a borrowed book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Borrower {
    #[validate(length(min = 1, max = 100))]
    pub id: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(email)]
    pub email: String,
}

/// An active loan. Owned by the book; it has no lifecycle of its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub borrower: Borrower,
    #[serde(with = "time::serde::rfc3339")]
    pub borrowed_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub due_date: OffsetDateTime,
    pub renewal_count: u32,
}

/// Lending state of a book. Availability, status and the borrower fields
/// are all derived from this single value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LendingState {
    #[default]
    Available,
    Borrowed(Loan),
}

/// Stored catalogue record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Book {
    pub id: RecordId,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 100))]
    pub author: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(max = 50))]
    pub genre: Option<String>,
    /// Defaults to the genre when not given.
    #[validate(length(max = 50))]
    pub category: Option<String>,
    #[validate(length(min = 10, max = 17))]
    pub isbn: Option<String>,
    #[validate(length(max = 500))]
    pub cover_image: Option<String>,
    #[validate(range(min = 1000, max = 2100))]
    pub published_year: Option<i32>,
    #[validate(range(min = 0.0, max = 5.0))]
    pub rating: f32,
    pub review_count: u32,
    #[validate(length(max = 20))]
    pub tags: Vec<String>,
    pub is_new_release: bool,
    #[validate(range(max = 10))]
    pub max_renewals: u32,
    pub lending: LendingState,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Last catalogue edit. Lending transitions do not touch it.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Book {
    /// A fresh, available record with empty catalogue fields.
    pub fn new(max_renewals: u32, now: OffsetDateTime) -> Self {
        Self {
            id: RecordId::generate(),
            title: String::new(),
            author: String::new(),
            description: None,
            genre: None,
            category: None,
            isbn: None,
            cover_image: None,
            published_year: None,
            rating: 0.0,
            review_count: 0,
            tags: Vec::new(),
            is_new_release: false,
            max_renewals,
            lending: LendingState::Available,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn available(&self) -> bool {
        matches!(self.lending, LendingState::Available)
    }

    pub fn status(&self) -> BookStatus {
        match self.lending {
            LendingState::Available => BookStatus::Available,
            LendingState::Borrowed(_) => BookStatus::Borrowed,
        }
    }

    pub fn loan(&self) -> Option<&Loan> {
        match &self.lending {
            LendingState::Available => None,
            LendingState::Borrowed(loan) => Some(loan),
        }
    }

    pub fn due_date(&self) -> Option<OffsetDateTime> {
        self.loan().map(|loan| loan.due_date)
    }

    pub fn renewal_count(&self) -> u32 {
        self.loan().map_or(0, |loan| loan.renewal_count)
    }

    /// Render the record for clients, computing `isOverdue` against `now`.
    pub fn view(&self, now: OffsetDateTime) -> BookView {
        let loan = self.loan();
        BookView {
            id: self.id,
            title: self.title.clone(),
            author: self.author.clone(),
            description: self.description.clone(),
            genre: self.genre.clone(),
            category: self.category.clone(),
            isbn: self.isbn.clone(),
            cover_image: self.cover_image.clone(),
            published_year: self.published_year,
            rating: self.rating,
            review_count: self.review_count,
            tags: self.tags.clone(),
            is_new_release: self.is_new_release,
            available: self.available(),
            status: self.status(),
            borrowed_by: loan.map(|l| l.borrower.clone()),
            borrowed_at: loan.map(|l| l.borrowed_at),
            borrow_date: loan.map(|l| l.borrowed_at),
            due_date: loan.map(|l| l.due_date),
            renewal_count: self.renewal_count(),
            max_renewals: self.max_renewals,
            is_overdue: self.is_overdue(now),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl Document for Book {
    const COLLECTION: &'static str = "books";
    const FIELDS: &'static [&'static str] = &[
        "title",
        "author",
        "description",
        "genre",
        "category",
        "isbn",
        "available",
        "status",
    ];

    fn id(&self) -> RecordId {
        self.id
    }

    fn field(&self, name: &str) -> Option<String> {
        match name {
            "title" => Some(self.title.clone()),
            "author" => Some(self.author.clone()),
            "description" => self.description.clone(),
            "genre" => self.genre.clone(),
            "category" => self.category.clone(),
            "isbn" => self.isbn.clone(),
            "available" => Some(self.available().to_string()),
            "status" => Some(self.status().as_str().to_string()),
            _ => None,
        }
    }
}

/// Client-facing rendering of a [`Book`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookView {
    pub id: RecordId,
    pub title: String,
    pub author: String,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub category: Option<String>,
    pub isbn: Option<String>,
    pub cover_image: Option<String>,
    pub published_year: Option<i32>,
    pub rating: f32,
    pub review_count: u32,
    pub tags: Vec<String>,
    pub is_new_release: bool,
    pub available: bool,
    pub status: BookStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub borrowed_by: Option<Borrower>,
    #[serde(
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub borrowed_at: Option<OffsetDateTime>,
    #[serde(
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub borrow_date: Option<OffsetDateTime>,
    #[serde(
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub due_date: Option<OffsetDateTime>,
    pub renewal_count: u32,
    pub max_renewals: u32,
    pub is_overdue: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Catalogue fields accepted by create and update. Absent fields keep the
/// current value; lending fields are not accepted here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookInput {
    pub title: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub category: Option<String>,
    /// An empty string clears the ISBN.
    pub isbn: Option<String>,
    pub cover_image: Option<String>,
    pub published_year: Option<i32>,
    pub rating: Option<f32>,
    pub review_count: Option<u32>,
    pub tags: Option<Vec<String>>,
    pub is_new_release: Option<bool>,
    pub max_renewals: Option<u32>,
}

impl BookInput {
    /// Merge into `book`. Text is trimmed and empty optional text is cleared.
    pub fn apply_to(self, book: &mut Book) {
        if let Some(title) = self.title {
            book.title = title.trim().to_string();
        }
        if let Some(author) = self.author {
            book.author = author.trim().to_string();
        }
        if let Some(description) = self.description {
            book.description = non_empty(&description);
        }
        if let Some(genre) = self.genre {
            book.genre = non_empty(&genre);
        }
        if let Some(category) = self.category {
            book.category = non_empty(&category);
        }
        if let Some(isbn) = self.isbn {
            book.isbn = non_empty(&isbn);
        }
        if let Some(cover_image) = self.cover_image {
            book.cover_image = non_empty(&cover_image);
        }
        if let Some(year) = self.published_year {
            book.published_year = Some(year);
        }
        if let Some(rating) = self.rating {
            book.rating = rating;
        }
        if let Some(review_count) = self.review_count {
            book.review_count = review_count;
        }
        if let Some(tags) = self.tags {
            book.tags = Vec::with_capacity(tags.len());
            for tag in tags.iter().filter_map(|t| non_empty(t)) {
                if !book.tags.contains(&tag) {
                    book.tags.push(tag);
                }
            }
        }
        if let Some(is_new_release) = self.is_new_release {
            book.is_new_release = is_new_release;
        }
        if let Some(max_renewals) = self.max_renewals {
            book.max_renewals = max_renewals;
        }

        if book.category.is_none() {
            book.category = book.genre.clone();
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Body of a borrow request. Every borrower field is required.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BorrowRequest {
    pub borrower_id: Option<String>,
    pub borrower_name: Option<String>,
    pub borrower_email: Option<String>,
    pub weeks: Option<u32>,
}

/// Body of a renew request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewRequest {
    pub weeks: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogueStats {
    pub total: usize,
    pub available: usize,
    pub borrowed: usize,
    pub overdue: usize,
}
