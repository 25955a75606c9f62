//! Borrow record model and related types

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::user::Borrower;

/// How long a copy may be kept before it is due
pub const BORROW_PERIOD_DAYS: i64 = 7;

/// Borrower details as they were when the book was borrowed.
///
/// Later profile edits never rewrite these fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BorrowerSnapshot {
    #[sqlx(rename = "borrower_id")]
    pub id: i32,
    #[sqlx(rename = "borrower_name")]
    pub name: String,
    #[sqlx(rename = "borrower_email")]
    pub email: String,
}

impl From<&Borrower> for BorrowerSnapshot {
    fn from(borrower: &Borrower) -> Self {
        BorrowerSnapshot {
            id: borrower.id,
            name: borrower.name.clone(),
            email: borrower.email.clone(),
        }
    }
}

/// One borrower's custody of one book copy
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BorrowRecord {
    pub id: i32,
    #[sqlx(flatten)]
    pub borrower: BorrowerSnapshot,
    pub book_id: i32,
    pub book_title: String,
    /// Book price when borrowed
    pub price: Decimal,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub returned: bool,
    pub return_date: Option<DateTime<Utc>>,
    /// Meaningful once `returned` is set
    pub fine: Decimal,
    pub notified: bool,
}

/// Everything needed to open a borrow
#[derive(Debug, Clone)]
pub struct NewBorrow {
    pub book_id: i32,
    pub borrower: BorrowerSnapshot,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
}

impl NewBorrow {
    pub fn new(book_id: i32, borrower: &Borrower, now: DateTime<Utc>) -> Self {
        NewBorrow {
            book_id,
            borrower: borrower.into(),
            borrow_date: now,
            due_date: now + Duration::days(BORROW_PERIOD_DAYS),
        }
    }
}

/// Body of a borrow request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct BorrowRequest {
    /// Email of the borrowing account
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
}

/// Admin listing filters
#[derive(Debug, Default, Clone, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct BorrowFilter {
    /// Only returned (`true`) or only outstanding (`false`) records
    pub returned: Option<bool>,
    /// Case-insensitive search in borrower email, borrower name or book title
    pub q: Option<String>,
}

impl BorrowFilter {
    /// Lowercased search term, `None` when blank
    pub fn search(&self) -> Option<String> {
        self.q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase)
    }

    /// In-process equivalent of the SQL filter
    pub fn matches(&self, record: &BorrowRecord) -> bool {
        if let Some(returned) = self.returned {
            if record.returned != returned {
                return false;
            }
        }
        match self.search() {
            Some(q) => {
                record.borrower.email.to_lowercase().contains(&q)
                    || record.borrower.name.to_lowercase().contains(&q)
                    || record.book_title.to_lowercase().contains(&q)
            }
            None => true,
        }
    }
}

/// Outcome of closing a borrow
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReturnReceipt {
    pub fine: Decimal,
    /// Fine rendered in the configured currency
    pub fine_display: String,
    pub borrow: BorrowRecord,
}
