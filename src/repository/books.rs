//! Books repository for database operations

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult, ConflictKind, Entity},
    models::book::{Book, BookQuery, CreateBook},
};

use super::{contains_pattern, BookStore};

const BOOK_COLUMNS: &str =
    "id, title, author, description, price, quantity, availability, created_at, updated_at";

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookStore for BooksRepository {
    /// Get book by ID
    async fn get(&self, id: i32) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(&format!("SELECT {} FROM books WHERE id = $1", BOOK_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::NotFound(Entity::Book))
    }

    /// Search books by title/author with pagination
    async fn list(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        let mut params: Vec<String> = Vec::new();
        let where_clause = match query.search() {
            Some(q) => {
                params.push(contains_pattern(q));
                r"WHERE LOWER(title) LIKE $1 ESCAPE '\' OR LOWER(author) LIKE $1 ESCAPE '\'".to_string()
            }
            None => String::new(),
        };

        let count_query = format!("SELECT COUNT(*) FROM books {}", where_clause);
        let mut count_builder = sqlx::query_scalar::<_, i64>(&count_query);
        for param in &params {
            count_builder = count_builder.bind(param);
        }
        let total = count_builder.fetch_one(&self.pool).await?;

        let select_query = format!(
            r#"
            SELECT {}
            FROM books
            {}
            ORDER BY created_at DESC, id DESC
            LIMIT {} OFFSET {}
            "#,
            BOOK_COLUMNS,
            where_clause,
            query.limit(),
            query.offset()
        );
        let mut select_builder = sqlx::query_as::<_, Book>(&select_query);
        for param in &params {
            select_builder = select_builder.bind(param);
        }
        let books = select_builder.fetch_all(&self.pool).await?;

        Ok((books, total))
    }

    /// Create a new book
    async fn create(&self, book: &CreateBook) -> AppResult<Book> {
        let created = sqlx::query_as::<_, Book>(&format!(
            r#"
            INSERT INTO books (title, author, description, price, quantity)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            BOOK_COLUMNS
        ))
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.description)
        .bind(book.price)
        .bind(book.quantity)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    /// Delete a book that has no copies out
    async fn delete(&self, id: i32) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        // Lock the row so no borrow can start while we look at the ledger
        let exists: Option<i32> = sqlx::query_scalar("SELECT id FROM books WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(AppError::NotFound(Entity::Book));
        }

        let on_loan: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM borrows WHERE book_id = $1 AND returned = FALSE)",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if on_loan {
            return Err(AppError::Conflict(ConflictKind::BookOnLoan));
        }

        sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
