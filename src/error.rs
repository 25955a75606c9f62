//! Error types for Biblio server

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Stable numeric error codes returned to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthenticated = 2,
    NotAuthorized = 3,
    DbFailure = 4,
    NoSuchBook = 5,
    NoSuchBorrow = 6,
    NoSuchUser = 7,
    BookUnavailable = 8,
    AlreadyBorrowed = 9,
    AlreadyReturned = 10,
    BookOnLoan = 11,
    ConcurrentUpdate = 12,
    BadValue = 13,
}

/// Entities that lookups can fail to find
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Book,
    Borrow,
    User,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Book => write!(f, "Book"),
            Entity::Borrow => write!(f, "Borrow record"),
            Entity::User => write!(f, "User"),
        }
    }
}

/// Lifecycle conflicts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// The borrower already holds an unreturned copy of this book
    AlreadyBorrowed,
    /// The borrow record was closed earlier
    AlreadyReturned,
    /// The book still has unreturned borrows
    BookOnLoan,
    /// A transient storage conflict persisted after one retry
    ConcurrentUpdate,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKind::AlreadyBorrowed => write!(f, "User has already borrowed this book"),
            ConflictKind::AlreadyReturned => write!(f, "This book is already returned"),
            ConflictKind::BookOnLoan => write!(f, "Book has copies that are still borrowed"),
            ConflictKind::ConcurrentUpdate => {
                write!(f, "The record was modified concurrently, please retry")
            }
        }
    }
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("{0} not found")]
    NotFound(Entity),

    #[error("Book is currently unavailable")]
    Unavailable,

    #[error("{0}")]
    Conflict(ConflictKind),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Serialization failures and deadlocks, which are worth one retry
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Database(sqlx::Error::Database(e)) => {
                matches!(e.code().as_deref(), Some("40001") | Some("40P01"))
            }
            _ => false,
        }
    }

    /// True when the database rejected a write on the named unique index
    pub fn is_unique_violation(&self, constraint: &str) -> bool {
        match self {
            AppError::Database(sqlx::Error::Database(e)) => {
                e.is_unique_violation() && e.constraint() == Some(constraint)
            }
            _ => false,
        }
    }

    fn parts(&self) -> (StatusCode, ErrorCode, String) {
        match self {
            AppError::Authentication(msg) => {
                (StatusCode::UNAUTHORIZED, ErrorCode::NotAuthenticated, msg.clone())
            }
            AppError::Authorization(msg) => {
                (StatusCode::FORBIDDEN, ErrorCode::NotAuthorized, msg.clone())
            }
            AppError::NotFound(entity) => {
                let code = match entity {
                    Entity::Book => ErrorCode::NoSuchBook,
                    Entity::Borrow => ErrorCode::NoSuchBorrow,
                    Entity::User => ErrorCode::NoSuchUser,
                };
                (StatusCode::NOT_FOUND, code, self.to_string())
            }
            AppError::Unavailable => {
                (StatusCode::BAD_REQUEST, ErrorCode::BookUnavailable, self.to_string())
            }
            AppError::Conflict(kind) => {
                let code = match kind {
                    ConflictKind::AlreadyBorrowed => ErrorCode::AlreadyBorrowed,
                    ConflictKind::AlreadyReturned => ErrorCode::AlreadyReturned,
                    ConflictKind::BookOnLoan => ErrorCode::BookOnLoan,
                    ConflictKind::ConcurrentUpdate => ErrorCode::ConcurrentUpdate,
                };
                (StatusCode::CONFLICT, code, kind.to_string())
            }
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, ErrorCode::BadValue, msg.clone())
            }
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, ErrorCode::BadValue, msg.clone())
            }
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::DbFailure,
                "Database error".to_string(),
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::Failure,
                "Internal server error".to_string(),
            ),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let detail = errs
                    .iter()
                    .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
                    .unwrap_or_else(|| "is invalid".to_string());
                format!("{}: {}", field, detail)
            })
            .collect();
        fields.sort();
        AppError::Validation(fields.join("; "))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            // Well-formed JSON of the wrong shape, e.g. a missing field
            JsonRejection::JsonDataError(e) => AppError::Validation(e.body_text()),
            other => AppError::BadRequest(other.body_text()),
        }
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        match rejection {
            PathRejection::FailedToDeserializePathParams(e) => AppError::BadRequest(e.body_text()),
            other => AppError::Internal(other.body_text()),
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Database(e) => tracing::error!("Database error: {:?}", e),
            AppError::Internal(msg) => tracing::error!("Internal error: {}", msg),
            _ => {}
        }

        let (status, code, message) = self.parts();

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_errors_keep_their_own_status() {
        assert_eq!(AppError::NotFound(Entity::Book).parts().0, StatusCode::NOT_FOUND);
        assert_eq!(AppError::Unavailable.parts().0, StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::Conflict(ConflictKind::AlreadyBorrowed).parts().0,
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Conflict(ConflictKind::AlreadyReturned).parts().1,
            ErrorCode::AlreadyReturned
        );
    }

    #[test]
    fn storage_failures_do_not_leak_details() {
        let (status, code, message) =
            AppError::Internal("pool timed out on host db-3".to_string()).parts();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(code, ErrorCode::Failure);
        assert_eq!(message, "Internal server error");

        let (_, _, message) = AppError::Database(sqlx::Error::RowNotFound).parts();
        assert_eq!(message, "Database error");
    }

    #[test]
    fn not_found_message_names_the_entity() {
        assert_eq!(AppError::NotFound(Entity::Borrow).to_string(), "Borrow record not found");
        assert_eq!(AppError::NotFound(Entity::User).to_string(), "User not found");
    }

    #[test]
    fn only_database_errors_are_transient_candidates() {
        assert!(!AppError::Unavailable.is_transient());
        assert!(!AppError::Database(sqlx::Error::RowNotFound).is_transient());
    }
}
