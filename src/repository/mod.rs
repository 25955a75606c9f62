//! Repository layer for database operations
//!
//! Each store is an async trait with a PostgreSQL implementation and an
//! in-memory one. Multi-entity writes (`checkout`, `close`) are single calls
//! so that every implementation applies them all-or-nothing.

pub mod books;
pub mod borrows;
pub mod memory;
pub mod users;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use std::sync::Arc;

use crate::{
    error::AppResult,
    models::{
        book::{Book, BookQuery, CreateBook},
        borrow::{BorrowFilter, BorrowRecord, NewBorrow},
        user::User,
    },
    services::fines::FinePolicy,
};

/// `%needle%` for a case-insensitive `LIKE … ESCAPE '\'`, with the
/// needle's own wildcards matched literally
pub(crate) fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Catalog storage
#[async_trait]
pub trait BookStore: Send + Sync {
    /// `NotFound(Book)` when absent
    async fn get(&self, id: i32) -> AppResult<Book>;
    /// Page of books, newest first, plus the total match count
    async fn list(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)>;
    async fn create(&self, book: &CreateBook) -> AppResult<Book>;
    /// `NotFound(Book)` when absent, `Conflict(BookOnLoan)` while borrowed
    async fn delete(&self, id: i32) -> AppResult<()>;
}

/// Durable collection of borrow records
#[async_trait]
pub trait BorrowLedger: Send + Sync {
    /// `NotFound(Borrow)` when absent
    async fn get(&self, id: i32) -> AppResult<BorrowRecord>;

    /// Reserve a copy and open a borrow, atomically.
    ///
    /// Fails with `NotFound(Book)`, `Unavailable` or
    /// `Conflict(AlreadyBorrowed)`, checked in that order; on failure nothing
    /// is written.
    async fn checkout(&self, borrow: &NewBorrow) -> AppResult<BorrowRecord>;

    /// Close a borrow and put the copy back, atomically.
    ///
    /// Fails with `NotFound(Borrow)`, `Conflict(AlreadyReturned)` or
    /// `NotFound(Book)`; on failure nothing is written.
    async fn close(
        &self,
        id: i32,
        returned_at: DateTime<Utc>,
        policy: &FinePolicy,
    ) -> AppResult<BorrowRecord>;

    /// Every record of one borrower, newest first
    async fn list_by_borrower(&self, borrower_id: i32) -> AppResult<Vec<BorrowRecord>>;

    /// Filtered records, newest first
    async fn list(&self, filter: &BorrowFilter) -> AppResult<Vec<BorrowRecord>>;

    /// Unreturned, unnotified records due before `cutoff`
    async fn find_overdue_unnotified(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<BorrowRecord>>;

    /// Flip `notified`; false when the record was already notified or closed
    async fn mark_notified(&self, id: i32) -> AppResult<bool>;
}

/// Borrower lookup
#[async_trait]
pub trait BorrowerDirectory: Send + Sync {
    /// `NotFound(User)` when no account has this (normalized) email
    async fn find_by_email(&self, email: &str) -> AppResult<User>;
}

/// Main repository struct holding the stores
#[derive(Clone)]
pub struct Repository {
    pub pool: Option<Pool<Postgres>>,
    pub books: Arc<dyn BookStore>,
    pub borrows: Arc<dyn BorrowLedger>,
    pub users: Arc<dyn BorrowerDirectory>,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            books: Arc::new(books::BooksRepository::new(pool.clone())),
            borrows: Arc::new(borrows::BorrowsRepository::new(pool.clone())),
            users: Arc::new(users::UsersRepository::new(pool.clone())),
            pool: Some(pool),
        }
    }

    /// Repository backed by a shared in-process store
    pub fn in_memory(store: memory::MemoryStore) -> Self {
        Self {
            pool: None,
            books: Arc::new(store.clone()),
            borrows: Arc::new(store.clone()),
            users: Arc::new(store),
        }
    }

    /// Check that the backing store answers
    pub async fn ping(&self) -> AppResult<()> {
        if let Some(pool) = &self.pool {
            sqlx::query("SELECT 1").execute(pool).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::contains_pattern;

    #[test]
    fn search_wildcards_are_escaped() {
        assert_eq!(contains_pattern("Dune"), "%dune%");
        assert_eq!(contains_pattern("100%_off"), r"%100\%\_off%");
        assert_eq!(contains_pattern(r"a\b"), r"%a\\b%");
    }
}
