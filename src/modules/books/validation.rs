use validator::Validate;

use super::error::{BookError, FieldViolation};
use super::models::{Book, BookInput, BorrowRequest, Borrower};

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

/// A new record must name its title and author; leaving either out (or
/// blank) is an input error rather than a constraint violation.
pub fn require_title_and_author(input: &BookInput) -> Result<(), BookError> {
    let missing: Vec<&str> = [("author", &input.author), ("title", &input.title)]
        .into_iter()
        .filter(|(_, value)| is_blank(value))
        .map(|(name, _)| name)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(BookError::InvalidInput(format!(
            "missing required fields: {}",
            missing.join(", ")
        )))
    }
}

/// Check every field constraint of a (merged) record, reporting all
/// offending fields at once.
pub fn validate_book(book: &Book) -> Result<(), BookError> {
    let mut violations: Vec<FieldViolation> = match book.validate() {
        Ok(()) => Vec::new(),
        Err(errors) => errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| FieldViolation {
                field: api_field_name(&field),
                error: errs
                    .first()
                    .map(|e| e.code.to_string())
                    .unwrap_or_else(|| "invalid".to_string()),
            })
            .collect(),
    };

    if let Some(loan) = book.loan() {
        if book.max_renewals < loan.renewal_count {
            violations.push(FieldViolation {
                field: "maxRenewals".to_string(),
                error: "below_current_renewals".to_string(),
            });
        }
    }

    violations.sort_by(|a, b| a.field.cmp(&b.field));
    violations.dedup_by(|a, b| a.field == b.field);

    if violations.is_empty() {
        Ok(())
    } else {
        Err(BookError::ValidationFailed(violations))
    }
}

/// Resolve the borrower named by a borrow request.
pub fn borrower_from(request: &BorrowRequest) -> Result<Borrower, BookError> {
    let fields = [
        ("borrowerId", &request.borrower_id),
        ("borrowerName", &request.borrower_name),
        ("borrowerEmail", &request.borrower_email),
    ];
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| is_blank(value))
        .map(|(name, _)| *name)
        .collect();
    if !missing.is_empty() {
        return Err(BookError::InvalidInput(format!(
            "missing required borrower fields: {}",
            missing.join(", ")
        )));
    }

    let text = |value: &Option<String>| value.as_deref().unwrap_or_default().trim().to_string();
    let borrower = Borrower {
        id: text(&request.borrower_id),
        name: text(&request.borrower_name),
        email: text(&request.borrower_email),
    };

    if let Err(errors) = borrower.validate() {
        let mut fields: Vec<String> = errors
            .field_errors()
            .into_keys()
            .map(|field| format!("borrower{}", capitalize(&field)))
            .collect();
        fields.sort();
        return Err(BookError::InvalidInput(format!(
            "invalid borrower fields: {}",
            fields.join(", ")
        )));
    }

    Ok(borrower)
}

/// Check a requested loan length against the configured bound.
pub fn loan_weeks(weeks: u32, max_weeks: u32) -> Result<u32, BookError> {
    if weeks == 0 || weeks > max_weeks {
        return Err(BookError::InvalidInput(format!(
            "weeks must be between 1 and {max_weeks}"
        )));
    }
    Ok(weeks)
}

/// `published_year` -> `publishedYear`
fn api_field_name(field: &str) -> String {
    let mut parts = field.split('_');
    let mut name = parts.next().unwrap_or_default().to_string();
    for part in parts {
        name.push_str(&capitalize(part));
    }
    name
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::books::models::LendingState;
    use time::macros::datetime;

    fn valid_book() -> Book {
        let mut book = Book::new(2, datetime!(2024-01-01 00:00 UTC));
        book.title = "The Hobbit".to_string();
        book.author = "J.R.R. Tolkien".to_string();
        book
    }

    fn violated_fields(err: BookError) -> Vec<String> {
        match err {
            BookError::ValidationFailed(violations) => {
                violations.into_iter().map(|v| v.field).collect()
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn missing_title_or_author_is_an_input_error() {
        let err = require_title_and_author(&BookInput {
            title: Some("  ".to_string()),
            ..BookInput::default()
        })
        .unwrap_err();
        assert!(
            matches!(err, BookError::InvalidInput(ref msg) if msg == "missing required fields: author, title")
        );

        let named = BookInput {
            title: Some("Dune".to_string()),
            author: Some("Frank Herbert".to_string()),
            ..BookInput::default()
        };
        assert!(require_title_and_author(&named).is_ok());
    }

    #[test]
    fn valid_book_passes() {
        assert!(validate_book(&valid_book()).is_ok());
    }

    #[test]
    fn every_offending_field_is_reported() {
        let mut book = valid_book();
        book.title = String::new();
        book.author = "a".repeat(101);
        book.rating = 5.5;
        book.published_year = Some(99);
        book.isbn = Some("123".to_string());

        let fields = violated_fields(validate_book(&book).unwrap_err());
        assert_eq!(
            fields,
            vec!["author", "isbn", "publishedYear", "rating", "title"]
        );
    }

    #[test]
    fn renewal_cap_cannot_drop_below_current_loan() {
        let mut book = valid_book();
        book.borrow(
            Borrower {
                id: "u1".to_string(),
                name: "Bilbo".to_string(),
                email: "bilbo@example.com".to_string(),
            },
            3,
            datetime!(2024-01-02 00:00 UTC),
        )
        .unwrap();
        book.renew(2).unwrap();
        book.renew(2).unwrap();
        book.max_renewals = 1;

        let fields = violated_fields(validate_book(&book).unwrap_err());
        assert_eq!(fields, vec!["maxRenewals"]);
        assert!(matches!(book.lending, LendingState::Borrowed(_)));
    }

    #[test]
    fn borrow_request_requires_all_borrower_fields() {
        let request = BorrowRequest {
            borrower_id: Some("u1".to_string()),
            borrower_name: Some("  ".to_string()),
            ..BorrowRequest::default()
        };
        let err = borrower_from(&request).unwrap_err();
        assert_eq!(
            err.to_string(),
            "missing required borrower fields: borrowerName, borrowerEmail"
        );
    }

    #[test]
    fn borrow_request_rejects_malformed_email() {
        let request = BorrowRequest {
            borrower_id: Some("u1".to_string()),
            borrower_name: Some("Bilbo".to_string()),
            borrower_email: Some("not-an-email".to_string()),
            weeks: None,
        };
        let err = borrower_from(&request).unwrap_err();
        assert!(matches!(err, BookError::InvalidInput(ref msg) if msg.contains("borrowerEmail")));
    }

    #[test]
    fn borrow_request_trims_fields() {
        let request = BorrowRequest {
            borrower_id: Some(" u1 ".to_string()),
            borrower_name: Some("Bilbo Baggins".to_string()),
            borrower_email: Some(" bilbo@example.com".to_string()),
            weeks: Some(2),
        };
        let borrower = borrower_from(&request).unwrap();
        assert_eq!(borrower.id, "u1");
        assert_eq!(borrower.email, "bilbo@example.com");
    }

    #[test]
    fn loan_weeks_are_bounded() {
        assert!(loan_weeks(0, 52).is_err());
        assert!(loan_weeks(53, 52).is_err());
        assert_eq!(loan_weeks(3, 52).unwrap(), 3);
    }

    #[test]
    fn field_names_are_camel_cased() {
        assert_eq!(api_field_name("published_year"), "publishedYear");
        assert_eq!(api_field_name("title"), "title");
        assert_eq!(api_field_name("cover_image"), "coverImage");
    }
}
