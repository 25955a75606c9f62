//! Borrow ledger backed by PostgreSQL
//!
//! Oversell is prevented by a conditional decrement (`quantity > 0`), double
//! borrowing by the `borrows_active_unique` partial index. Both writes of a
//! lifecycle step share one transaction; dropping it rolls everything back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult, ConflictKind, Entity},
    models::borrow::{BorrowFilter, BorrowRecord, NewBorrow},
    services::fines::FinePolicy,
};

use super::{contains_pattern, BorrowLedger};

const ACTIVE_BORROW_INDEX: &str = "borrows_active_unique";

const BORROW_COLUMNS: &str = "id, borrower_id, borrower_name, borrower_email, book_id, book_title, \
     price, borrow_date, due_date, returned, return_date, fine, notified";

#[derive(Clone)]
pub struct BorrowsRepository {
    pool: Pool<Postgres>,
}

impl BorrowsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BorrowLedger for BorrowsRepository {
    /// Get borrow record by ID
    async fn get(&self, id: i32) -> AppResult<BorrowRecord> {
        sqlx::query_as::<_, BorrowRecord>(&format!(
            "SELECT {} FROM borrows WHERE id = $1",
            BORROW_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound(Entity::Borrow))
    }

    async fn checkout(&self, borrow: &NewBorrow) -> AppResult<BorrowRecord> {
        let mut tx = self.pool.begin().await?;

        let quantity: Option<i32> = sqlx::query_scalar("SELECT quantity FROM books WHERE id = $1")
            .bind(borrow.book_id)
            .fetch_optional(&mut *tx)
            .await?;
        match quantity {
            None => return Err(AppError::NotFound(Entity::Book)),
            Some(q) if q < 1 => return Err(AppError::Unavailable),
            Some(_) => {}
        }

        let already_borrowed: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM borrows
                WHERE borrower_id = $1 AND book_id = $2 AND returned = FALSE
            )
            "#,
        )
        .bind(borrow.borrower.id)
        .bind(borrow.book_id)
        .fetch_one(&mut *tx)
        .await?;
        if already_borrowed {
            return Err(AppError::Conflict(ConflictKind::AlreadyBorrowed));
        }

        // The checks above are advisory; this decrement is the real guard
        let reserved: Option<(Decimal, String)> = sqlx::query_as(
            r#"
            UPDATE books
            SET quantity = quantity - 1, updated_at = NOW()
            WHERE id = $1 AND quantity > 0
            RETURNING price, title
            "#,
        )
        .bind(borrow.book_id)
        .fetch_optional(&mut *tx)
        .await?;
        let (price, title) = reserved.ok_or(AppError::Unavailable)?;

        let inserted = sqlx::query_as::<_, BorrowRecord>(&format!(
            r#"
            INSERT INTO borrows (
                borrower_id, borrower_name, borrower_email, book_id, book_title,
                price, borrow_date, due_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            BORROW_COLUMNS
        ))
        .bind(borrow.borrower.id)
        .bind(&borrow.borrower.name)
        .bind(&borrow.borrower.email)
        .bind(borrow.book_id)
        .bind(&title)
        .bind(price)
        .bind(borrow.borrow_date)
        .bind(borrow.due_date)
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::from);

        let record = match inserted {
            Err(e) if e.is_unique_violation(ACTIVE_BORROW_INDEX) => {
                return Err(AppError::Conflict(ConflictKind::AlreadyBorrowed));
            }
            other => other?,
        };

        tx.commit().await?;
        Ok(record)
    }

    async fn close(
        &self,
        id: i32,
        returned_at: DateTime<Utc>,
        policy: &FinePolicy,
    ) -> AppResult<BorrowRecord> {
        let mut tx = self.pool.begin().await?;

        let record = sqlx::query_as::<_, BorrowRecord>(&format!(
            "SELECT {} FROM borrows WHERE id = $1 FOR UPDATE",
            BORROW_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound(Entity::Borrow))?;

        if record.returned {
            return Err(AppError::Conflict(ConflictKind::AlreadyReturned));
        }

        let restocked = sqlx::query(
            "UPDATE books SET quantity = quantity + 1, updated_at = NOW() WHERE id = $1",
        )
        .bind(record.book_id)
        .execute(&mut *tx)
        .await?;
        if restocked.rows_affected() == 0 {
            return Err(AppError::NotFound(Entity::Book));
        }

        let fine = policy.assess(record.due_date, returned_at);

        let closed = sqlx::query_as::<_, BorrowRecord>(&format!(
            r#"
            UPDATE borrows
            SET returned = TRUE, return_date = $2, fine = $3
            WHERE id = $1 AND returned = FALSE
            RETURNING {}
            "#,
            BORROW_COLUMNS
        ))
        .bind(id)
        .bind(returned_at)
        .bind(fine)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::Conflict(ConflictKind::AlreadyReturned))?;

        tx.commit().await?;
        Ok(closed)
    }

    async fn list_by_borrower(&self, borrower_id: i32) -> AppResult<Vec<BorrowRecord>> {
        let records = sqlx::query_as::<_, BorrowRecord>(&format!(
            "SELECT {} FROM borrows WHERE borrower_id = $1 ORDER BY borrow_date DESC, id DESC",
            BORROW_COLUMNS
        ))
        .bind(borrower_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn list(&self, filter: &BorrowFilter) -> AppResult<Vec<BorrowRecord>> {
        let mut conditions = Vec::new();
        let mut search = None;

        if let Some(returned) = filter.returned {
            conditions.push(format!("returned = {}", if returned { "TRUE" } else { "FALSE" }));
        }

        if let Some(q) = filter.search() {
            search = Some(contains_pattern(&q));
            conditions.push(
                r"(LOWER(borrower_email) LIKE $1 ESCAPE '\' OR LOWER(borrower_name) LIKE $1 ESCAPE '\' OR LOWER(book_title) LIKE $1 ESCAPE '\')"
                    .to_string(),
            );
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let query = format!(
            "SELECT {} FROM borrows {} ORDER BY borrow_date DESC, id DESC",
            BORROW_COLUMNS, where_clause
        );

        let mut builder = sqlx::query_as::<_, BorrowRecord>(&query);
        if let Some(ref pattern) = search {
            builder = builder.bind(pattern);
        }

        Ok(builder.fetch_all(&self.pool).await?)
    }

    async fn find_overdue_unnotified(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<BorrowRecord>> {
        let records = sqlx::query_as::<_, BorrowRecord>(&format!(
            r#"
            SELECT {}
            FROM borrows
            WHERE returned = FALSE AND notified = FALSE AND due_date < $1
            ORDER BY due_date
            "#,
            BORROW_COLUMNS
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn mark_notified(&self, id: i32) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE borrows SET notified = TRUE WHERE id = $1 AND notified = FALSE AND returned = FALSE",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
