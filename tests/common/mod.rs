#![allow(dead_code)]

use std::sync::Arc;

use biblio_server::{
    config::{AppConfig, CurrencyConfig, FineConfig, ScannerConfig},
    models::{
        book::{Book, CreateBook},
        user::{Borrower, Role},
    },
    repository::{memory::MemoryStore, Repository},
    services::{borrows::BorrowService, currency::CurrencyFormatter, fines::FinePolicy, Services},
    AppState,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub const JWT_SECRET: &str = "test-secret";

pub struct TestLibrary {
    pub store: MemoryStore,
    pub repository: Repository,
    pub service: BorrowService,
}

impl TestLibrary {
    pub fn new(fines: FineConfig) -> Self {
        let store = MemoryStore::new();
        let repository = Repository::in_memory(store.clone());
        let service = BorrowService::new(
            repository.clone(),
            FinePolicy::new(&fines),
            CurrencyFormatter::new(&CurrencyConfig::default()),
        );
        Self {
            store,
            repository,
            service,
        }
    }

    pub async fn add_book(&self, title: &str, quantity: i32) -> Book {
        self.repository
            .books
            .create(&CreateBook {
                title: title.to_string(),
                author: "Test Author".to_string(),
                description: "A book used in tests".to_string(),
                price: dec!(250),
                quantity,
            })
            .await
            .expect("book created")
    }

    pub async fn add_borrower(&self, name: &str) -> Borrower {
        let email = format!("{}@example.com", name.to_lowercase());
        self.store.insert_user(name, &email, Role::User).await.into()
    }

    pub async fn quantity_of(&self, book_id: i32) -> i32 {
        self.repository.books.get(book_id).await.expect("book exists").quantity
    }
}

pub fn no_fines() -> FineConfig {
    FineConfig::default()
}

pub fn hourly_fine(rate: Decimal) -> FineConfig {
    FineConfig {
        per_hour: rate,
        per_day: Decimal::ZERO,
    }
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig {
        server: Default::default(),
        database: Default::default(),
        auth: Default::default(),
        logging: Default::default(),
        email: Default::default(),
        fines: FineConfig::default(),
        currency: CurrencyConfig::default(),
        scanner: ScannerConfig::default(),
    };
    config.database.url = "memory:".to_string();
    config.auth.jwt_secret = JWT_SECRET.to_string();
    config
}

/// Application state over a fresh in-memory store
pub fn test_state(config: AppConfig) -> (AppState, MemoryStore) {
    let store = MemoryStore::new();
    let services = Services::new(Repository::in_memory(store.clone()), &config);
    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };
    (state, store)
}
