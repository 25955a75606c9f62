//! Borrow lifecycle endpoints

use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::{
    error::AppResult,
    models::{
        borrow::{BorrowFilter, BorrowRecord, BorrowRequest, ReturnReceipt},
        user::normalize_email,
    },
};

use super::{
    extract::{JsonBody, PathParam, QueryParams},
    AuthenticatedUser,
};

/// Record a borrow for the account with the given email
#[utoipa::path(
    post,
    path = "/borrow/{id}",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    request_body = BorrowRequest,
    responses(
        (status = 201, description = "Book borrowed", body = BorrowRecord),
        (status = 400, description = "Invalid email or no copies left"),
        (status = 404, description = "Book or user not found"),
        (status = 409, description = "User already holds this book")
    )
)]
pub async fn borrow_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    PathParam(book_id): PathParam<i32>,
    JsonBody(mut request): JsonBody<BorrowRequest>,
) -> AppResult<(StatusCode, Json<BorrowRecord>)> {
    claims.require_admin()?;

    request.email = normalize_email(&request.email);
    request.validate()?;

    let record = state
        .services
        .borrows
        .borrow_for_email(book_id, &request.email)
        .await?;

    Ok((StatusCode::CREATED, Json(record)))
}

/// Return a borrowed book
#[utoipa::path(
    put,
    path = "/borrow/{id}",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Borrow record ID")
    ),
    responses(
        (status = 200, description = "Book returned", body = ReturnReceipt),
        (status = 404, description = "Borrow record or book not found"),
        (status = 409, description = "Already returned")
    )
)]
pub async fn return_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    PathParam(borrow_id): PathParam<i32>,
) -> AppResult<Json<ReturnReceipt>> {
    claims.require_admin()?;

    let receipt = state.services.borrows.return_book(borrow_id).await?;
    Ok(Json(receipt))
}

/// Borrow history of the caller
#[utoipa::path(
    get,
    path = "/borrow/mine",
    tag = "borrows",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Caller's borrow records", body = Vec<BorrowRecord>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn my_borrows(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<BorrowRecord>>> {
    let records = state.services.borrows.borrows_of(claims.user_id).await?;
    Ok(Json(records))
}

/// All borrow records (admin)
#[utoipa::path(
    get,
    path = "/borrow/all",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(BorrowFilter),
    responses(
        (status = 200, description = "Matching borrow records", body = Vec<BorrowRecord>),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Administrator privileges required")
    )
)]
pub async fn all_borrows(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    QueryParams(filter): QueryParams<BorrowFilter>,
) -> AppResult<Json<Vec<BorrowRecord>>> {
    claims.require_admin()?;

    let records = state.services.borrows.list(&filter).await?;
    Ok(Json(records))
}
