//! Lending lifecycle: `Available -> Borrowed` (borrow), `Borrowed -> Borrowed`
//! (renew) and `Borrowed -> Available` (return).
//!
//! Transitions are pure functions of the record and the current time. The
//! service applies them inside a store update so a failed precondition
//! leaves the stored record untouched.

use time::{Duration, OffsetDateTime};

use super::error::BookError;
use super::models::{Book, Borrower, LendingState, Loan};

/// Length of a loan or renewal of `weeks` weeks.
pub fn loan_period(weeks: u32) -> Duration {
    Duration::weeks(i64::from(weeks))
}

impl Book {
    pub fn borrow(
        &mut self,
        borrower: Borrower,
        weeks: u32,
        now: OffsetDateTime,
    ) -> Result<&Loan, BookError> {
        if !self.available() {
            return Err(BookError::NotAvailable);
        }

        self.lending = LendingState::Borrowed(Loan {
            borrower,
            borrowed_at: now,
            due_date: now + loan_period(weeks),
            renewal_count: 0,
        });
        self.loan().ok_or(BookError::NotBorrowed)
    }

    /// End the current loan, handing it back to the caller.
    pub fn mark_returned(&mut self) -> Result<Loan, BookError> {
        match std::mem::take(&mut self.lending) {
            LendingState::Borrowed(loan) => Ok(loan),
            LendingState::Available => Err(BookError::NotBorrowed),
        }
    }

    /// Push the due date out by `weeks` weeks. Returns the new due date.
    pub fn renew(&mut self, weeks: u32) -> Result<OffsetDateTime, BookError> {
        let max = self.max_renewals;
        let LendingState::Borrowed(loan) = &mut self.lending else {
            return Err(BookError::NotBorrowed);
        };
        if loan.renewal_count >= max {
            return Err(BookError::RenewalLimitExceeded { max });
        }

        loan.due_date += loan_period(weeks);
        loan.renewal_count += 1;
        Ok(loan.due_date)
    }

    /// Borrowed and past due. Computed at read time only.
    pub fn is_overdue(&self, now: OffsetDateTime) -> bool {
        self.due_date().is_some_and(|due| due < now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::books::models::BookStatus;
    use time::macros::datetime;

    const CREATED: OffsetDateTime = datetime!(2024-03-01 09:00 UTC);

    fn orwell() -> Book {
        let mut book = Book::new(2, CREATED);
        book.title = "1984".to_string();
        book.author = "George Orwell".to_string();
        book
    }

    fn reader() -> Borrower {
        Borrower {
            id: "u-42".to_string(),
            name: "Winston Smith".to_string(),
            email: "winston@example.com".to_string(),
        }
    }

    /// available <=> status Available <=> no borrower, loan start, or due date
    fn assert_consistent(book: &Book) {
        let view = book.view(CREATED);
        let available = view.available;
        assert_eq!(available, view.status == BookStatus::Available);
        assert_eq!(available, view.borrowed_by.is_none());
        assert_eq!(available, view.borrowed_at.is_none());
        assert_eq!(available, view.due_date.is_none());
        assert!(view.renewal_count <= view.max_renewals);
    }

    #[test]
    fn borrow_sets_loan_and_due_date() {
        let mut book = orwell();
        let loan = book.borrow(reader(), 3, CREATED).unwrap().clone();

        assert_eq!(loan.borrowed_at, CREATED);
        assert_eq!(loan.due_date, datetime!(2024-03-22 09:00 UTC));
        assert_eq!(loan.renewal_count, 0);
        assert!(!book.available());
        assert_eq!(book.status(), BookStatus::Borrowed);
        assert_consistent(&book);
    }

    #[test]
    fn borrowing_a_borrowed_book_changes_nothing() {
        let mut book = orwell();
        book.borrow(reader(), 3, CREATED).unwrap();
        let before = book.clone();

        let other = Borrower {
            id: "u-7".to_string(),
            name: "Julia".to_string(),
            email: "julia@example.com".to_string(),
        };
        let err = book.borrow(other, 1, CREATED + Duration::days(1)).unwrap_err();
        assert!(matches!(err, BookError::NotAvailable));
        assert_eq!(book, before);
    }

    #[test]
    fn borrow_then_return_restores_pre_borrow_state() {
        let mut book = orwell();
        let before = book.clone();

        book.borrow(reader(), 3, CREATED).unwrap();
        book.renew(2).unwrap();
        let loan = book.mark_returned().unwrap();

        assert_eq!(loan.renewal_count, 1);
        assert_eq!(book, before);
        assert_eq!(book.renewal_count(), 0);
        assert_consistent(&book);
    }

    #[test]
    fn returning_an_available_book_fails() {
        let mut book = orwell();
        assert!(matches!(book.mark_returned(), Err(BookError::NotBorrowed)));
        assert!(book.available());
    }

    #[test]
    fn renew_extends_due_date_and_counts() {
        let mut book = orwell();
        book.borrow(reader(), 3, CREATED).unwrap();
        let due = book.due_date().unwrap();

        let renewed = book.renew(2).unwrap();
        assert_eq!(renewed, due + Duration::days(14));
        assert_eq!(book.renewal_count(), 1);
        assert_consistent(&book);
    }

    #[test]
    fn renew_past_the_cap_fails_and_keeps_state() {
        let mut book = orwell();
        book.borrow(reader(), 3, CREATED).unwrap();

        for _ in 0..book.max_renewals {
            book.renew(2).unwrap();
        }
        let at_cap = book.clone();

        let err = book.renew(2).unwrap_err();
        assert!(matches!(err, BookError::RenewalLimitExceeded { max: 2 }));
        assert_eq!(book, at_cap);
        assert_eq!(book.renewal_count(), 2);
    }

    #[test]
    fn renew_requires_an_active_loan() {
        let mut book = orwell();
        assert!(matches!(book.renew(2), Err(BookError::NotBorrowed)));
    }

    #[test]
    fn zero_renewal_cap_blocks_every_renewal() {
        let mut book = orwell();
        book.max_renewals = 0;
        book.borrow(reader(), 1, CREATED).unwrap();
        assert!(matches!(
            book.renew(1),
            Err(BookError::RenewalLimitExceeded { max: 0 })
        ));
    }

    #[test]
    fn overdue_is_derived_from_due_date() {
        let mut book = orwell();
        assert!(!book.is_overdue(CREATED + Duration::weeks(10)));

        book.borrow(reader(), 1, CREATED).unwrap();
        let due = book.due_date().unwrap();
        assert!(!book.is_overdue(due));
        assert!(book.is_overdue(due + Duration::seconds(1)));

        // reading the flag never changes the record
        assert_eq!(book.status(), BookStatus::Borrowed);
    }

    #[test]
    fn borrow_renew_return_scenario() {
        let mut book = orwell();
        assert!(book.isbn.is_none());

        book.borrow(reader(), 3, CREATED).unwrap();
        assert_eq!(book.due_date(), Some(CREATED + Duration::days(21)));
        assert_eq!(book.renewal_count(), 0);

        book.renew(2).unwrap();
        assert_eq!(book.due_date(), Some(CREATED + Duration::days(35)));
        assert_eq!(book.renewal_count(), 1);

        book.mark_returned().unwrap();
        assert!(book.available());
        assert_eq!(book.renewal_count(), 0);
        assert_eq!(book.due_date(), None);
    }
}
