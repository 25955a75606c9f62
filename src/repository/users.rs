//! Users repository: borrower lookup by email

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult, Entity},
    models::user::{normalize_email, User, UserRow},
};

use super::BorrowerDirectory;

#[derive(Clone)]
pub struct UsersRepository {
    pool: Pool<Postgres>,
}

impl UsersRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BorrowerDirectory for UsersRepository {
    async fn find_by_email(&self, email: &str) -> AppResult<User> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, name, email, role, account_verified, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound(Entity::User))?;

        Ok(row.into())
    }
}
