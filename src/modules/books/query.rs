use libris_db::Filter;
use serde::{Deserialize, Serialize};

use super::models::{Book, BookStatus};

/// Optional constraints accepted by the listing. Unset fields impose no
/// constraint; set fields combine with AND.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ListFilters {
    /// Case-insensitive search over title, author and description.
    pub q: Option<String>,
    pub category: Option<String>,
    pub genre: Option<String>,
    pub available: Option<bool>,
    pub status: Option<BookStatus>,
}

impl ListFilters {
    pub fn to_filter(&self) -> Filter {
        let mut filter = Filter::new();
        if let Some(genre) = present(&self.genre) {
            filter = filter.eq("genre", genre);
        }
        if let Some(category) = present(&self.category) {
            filter = filter.eq("category", category);
        }
        if let Some(available) = self.available {
            filter = filter.eq("available", available.to_string());
        }
        if let Some(status) = self.status {
            filter = filter.eq("status", status.as_str());
        }
        if let Some(q) = present(&self.q) {
            filter = filter.contains(q);
        }
        filter
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Query string of the admin listing: the list filters plus paging.
///
/// Kept flat rather than flattening [`ListFilters`] so typed values parse
/// from the query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub q: Option<String>,
    pub category: Option<String>,
    pub genre: Option<String>,
    pub available: Option<bool>,
    pub status: Option<BookStatus>,
}

impl AdminListQuery {
    pub fn filters(&self) -> ListFilters {
        ListFilters {
            q: self.q.clone(),
            category: self.category.clone(),
            genre: self.genre.clone(),
            available: self.available,
            status: self.status,
        }
    }
}

/// One page of results with the totals needed to render paging controls.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub books: Vec<T>,
    pub total: usize,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            books: self.books.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
            total_pages: self.total_pages,
        }
    }
}

/// Slice `items` into page `page` (1-based) of `limit` entries.
pub fn paginate<T>(items: Vec<T>, page: u32, limit: u32) -> Page<T> {
    let page = page.max(1);
    let limit = limit.max(1);
    let total = items.len();
    let total_pages = total.div_ceil(limit as usize) as u32;
    let skip = (page as usize - 1).saturating_mul(limit as usize);

    Page {
        books: items.into_iter().skip(skip).take(limit as usize).collect(),
        total,
        page,
        limit,
        total_pages,
    }
}

/// Most recently created first.
pub fn sort_newest_first(books: &mut [Book]) {
    books.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
}
