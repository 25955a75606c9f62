//! Biblio Library Backend
//!
//! Book catalog plus a borrow/return lifecycle that keeps inventory
//! consistent under concurrent requests, charges late fines and reminds
//! borrowers of overdue books.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
