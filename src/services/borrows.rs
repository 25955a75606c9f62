//! Borrow lifecycle service
//!
//! Opens and closes borrows. The store applies each step atomically; this
//! layer picks the clock, the fine policy and the retry rule.

use chrono::{DateTime, Utc};
use std::future::Future;

use crate::{
    error::{AppError, AppResult, ConflictKind},
    models::{
        borrow::{BorrowFilter, BorrowRecord, NewBorrow, ReturnReceipt},
        user::Borrower,
    },
    repository::Repository,
};

use super::{currency::CurrencyFormatter, fines::FinePolicy};

/// Run `op`, retrying once on a transient storage conflict
async fn retry_transient<T, F, Fut>(what: &str, mut op: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    match op().await {
        Err(e) if e.is_transient() => {
            tracing::warn!(operation = what, error = %e, "Transient storage conflict, retrying once");
            match op().await {
                Err(e) if e.is_transient() => {
                    tracing::warn!(operation = what, error = %e, "Storage conflict persisted after retry");
                    Err(AppError::Conflict(ConflictKind::ConcurrentUpdate))
                }
                other => other,
            }
        }
        other => other,
    }
}

#[derive(Clone)]
pub struct BorrowService {
    repository: Repository,
    fines: FinePolicy,
    currency: CurrencyFormatter,
}

impl BorrowService {
    pub fn new(repository: Repository, fines: FinePolicy, currency: CurrencyFormatter) -> Self {
        Self {
            repository,
            fines,
            currency,
        }
    }

    /// Record that `borrower` takes one copy of a book
    pub async fn borrow(&self, book_id: i32, borrower: &Borrower) -> AppResult<BorrowRecord> {
        self.borrow_at(book_id, borrower, Utc::now()).await
    }

    /// [`Self::borrow`] with an explicit clock
    pub async fn borrow_at(
        &self,
        book_id: i32,
        borrower: &Borrower,
        now: DateTime<Utc>,
    ) -> AppResult<BorrowRecord> {
        let new_borrow = NewBorrow::new(book_id, borrower, now);

        let record = retry_transient("borrow", || self.repository.borrows.checkout(&new_borrow)).await?;

        tracing::info!(
            borrow_id = record.id,
            book_id = record.book_id,
            borrower_id = record.borrower.id,
            due_date = %record.due_date,
            "Book borrowed"
        );

        Ok(record)
    }

    /// Record a borrow by the account behind `email`.
    ///
    /// A missing book is reported before an unknown account.
    pub async fn borrow_for_email(&self, book_id: i32, email: &str) -> AppResult<BorrowRecord> {
        self.repository.books.get(book_id).await?;
        let user = self.repository.users.find_by_email(email).await?;
        self.borrow(book_id, &user.into()).await
    }

    /// Close a borrow, restock the book and charge any late fine
    pub async fn return_book(&self, borrow_id: i32) -> AppResult<ReturnReceipt> {
        self.return_book_at(borrow_id, Utc::now()).await
    }

    /// [`Self::return_book`] with an explicit clock
    pub async fn return_book_at(&self, borrow_id: i32, now: DateTime<Utc>) -> AppResult<ReturnReceipt> {
        let record = retry_transient("return", || {
            self.repository.borrows.close(borrow_id, now, &self.fines)
        })
        .await?;

        tracing::info!(
            borrow_id = record.id,
            book_id = record.book_id,
            fine = %record.fine,
            "Book returned"
        );

        Ok(ReturnReceipt {
            fine: record.fine,
            fine_display: self.currency.format(record.fine),
            borrow: record,
        })
    }

    /// All borrows of one borrower, newest first
    pub async fn borrows_of(&self, borrower_id: i32) -> AppResult<Vec<BorrowRecord>> {
        self.repository.borrows.list_by_borrower(borrower_id).await
    }

    /// Admin listing
    pub async fn list(&self, filter: &BorrowFilter) -> AppResult<Vec<BorrowRecord>> {
        self.repository.borrows.list(filter).await
    }

    pub async fn get(&self, borrow_id: i32) -> AppResult<BorrowRecord> {
        self.repository.borrows.get(borrow_id).await
    }
}
