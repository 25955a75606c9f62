//! Borrow ledger against a real PostgreSQL database
//!
//! Needs `DATABASE_URL` pointing at a disposable database, then run with:
//! cargo test --test pg_ledger -- --ignored

use std::sync::Arc;

use biblio_server::{
    config::CurrencyConfig,
    error::{AppError, ConflictKind, Entity},
    models::{
        book::{Book, CreateBook},
        user::Borrower,
    },
    repository::Repository,
    services::{borrows::BorrowService, currency::CurrencyFormatter, fines::FinePolicy},
};
use chrono::Utc;
use rust_decimal_macros::dec;
use sqlx::{postgres::PgPoolOptions, PgPool};

async fn connect() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(16)
        .connect(&url)
        .await
        .expect("Failed to connect to database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

fn service(pool: &PgPool) -> (Repository, BorrowService) {
    let repository = Repository::new(pool.clone());
    let service = BorrowService::new(
        repository.clone(),
        FinePolicy::free(),
        CurrencyFormatter::new(&CurrencyConfig::default()),
    );
    (repository, service)
}

async fn add_book(repository: &Repository, quantity: i32) -> Book {
    repository
        .books
        .create(&CreateBook {
            title: format!("Ledger test {}", Utc::now().timestamp_nanos_opt().unwrap_or_default()),
            author: "Test Author".to_string(),
            description: "Created by pg_ledger tests".to_string(),
            price: dec!(120),
            quantity,
        })
        .await
        .expect("Failed to create book")
}

/// Accounts are provisioned elsewhere; insert them directly
async fn add_borrower(pool: &PgPool, tag: &str) -> Borrower {
    let email = format!(
        "{}-{}@example.com",
        tag,
        Utc::now().timestamp_nanos_opt().unwrap_or_default()
    );
    let id: i32 = sqlx::query_scalar("INSERT INTO users (name, email) VALUES ($1, $2) RETURNING id")
        .bind(tag)
        .bind(&email)
        .fetch_one(pool)
        .await
        .expect("Failed to insert user");

    Borrower {
        id,
        name: tag.to_string(),
        email,
    }
}

async fn open_borrows(pool: &PgPool, book_id: i32) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM borrows WHERE book_id = $1 AND returned = FALSE")
        .bind(book_id)
        .fetch_one(pool)
        .await
        .expect("Failed to count borrows")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore]
async fn concurrent_checkouts_never_oversell() {
    let pool = connect().await;
    let (repository, service) = service(&pool);
    let copies = 3;
    let attempts = 16;
    let book = add_book(&repository, copies).await;

    let mut readers = Vec::new();
    for i in 0..attempts {
        readers.push(add_borrower(&pool, &format!("oversell{}", i)).await);
    }

    let service = Arc::new(service);
    let handles: Vec<_> = readers
        .into_iter()
        .map(|reader| {
            let service = service.clone();
            tokio::spawn(async move { service.borrow(book.id, &reader).await })
        })
        .collect();

    let mut succeeded = 0;
    let mut unavailable = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(AppError::Unavailable) => unavailable += 1,
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }

    assert_eq!(succeeded, copies);
    assert_eq!(unavailable, attempts - copies);
    assert_eq!(repository.books.get(book.id).await.unwrap().quantity, 0);
    assert_eq!(open_borrows(&pool, book.id).await, copies as i64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn concurrent_duplicate_checkout_is_a_conflict() {
    let pool = connect().await;
    let (repository, service) = service(&pool);
    let book = add_book(&repository, 5).await;
    let reader = add_borrower(&pool, "duplicate").await;

    let service = Arc::new(service);
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let service = service.clone();
            let reader = reader.clone();
            tokio::spawn(async move { service.borrow(book.id, &reader).await })
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(AppError::Conflict(ConflictKind::AlreadyBorrowed)) => {}
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(repository.books.get(book.id).await.unwrap().quantity, 4);
    assert_eq!(open_borrows(&pool, book.id).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn concurrent_returns_restock_once() {
    let pool = connect().await;
    let (repository, service) = service(&pool);
    let book = add_book(&repository, 1).await;
    let reader = add_borrower(&pool, "returner").await;
    let record = service.borrow(book.id, &reader).await.unwrap();

    let service = Arc::new(service);
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move { service.return_book(record.id).await })
        })
        .collect();

    let mut closed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => closed += 1,
            Err(AppError::Conflict(ConflictKind::AlreadyReturned)) => {}
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }

    assert_eq!(closed, 1);
    assert_eq!(repository.books.get(book.id).await.unwrap().quantity, 1);

    let again = service.return_book(record.id).await;
    assert!(matches!(again, Err(AppError::Conflict(ConflictKind::AlreadyReturned))));
    assert_eq!(repository.books.get(book.id).await.unwrap().quantity, 1);
}

#[tokio::test]
#[ignore]
async fn checkout_preconditions_in_order() {
    let pool = connect().await;
    let (repository, service) = service(&pool);
    let reader = add_borrower(&pool, "order").await;

    let missing = service.borrow(i32::MAX, &reader).await;
    assert!(matches!(missing, Err(AppError::NotFound(Entity::Book))));

    let empty = add_book(&repository, 0).await;
    assert!(!empty.availability);
    let unavailable = service.borrow(empty.id, &reader).await;
    assert!(matches!(unavailable, Err(AppError::Unavailable)));

    let unknown = service.return_book(i32::MAX).await;
    assert!(matches!(unknown, Err(AppError::NotFound(Entity::Borrow))));
}
