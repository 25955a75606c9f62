//! Business logic services

pub mod borrows;
pub mod catalog;
pub mod currency;
pub mod email;
pub mod fines;
pub mod overdue;

use std::sync::Arc;

use chrono::Duration;

use crate::{config::AppConfig, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub catalog: catalog::CatalogService,
    pub borrows: borrows::BorrowService,
    pub email: email::EmailService,
    repository: Repository,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, config: &AppConfig) -> Self {
        let currency = currency::CurrencyFormatter::new(&config.currency);
        let fines = fines::FinePolicy::new(&config.fines);

        Self {
            catalog: catalog::CatalogService::new(repository.clone()),
            borrows: borrows::BorrowService::new(repository.clone(), fines, currency),
            email: email::EmailService::new(config.email.clone()),
            repository,
        }
    }

    /// Scanner that mails reminders through the email service
    pub fn overdue_scanner(&self, grace: Duration) -> overdue::OverdueScanner {
        overdue::OverdueScanner::new(
            self.repository.borrows.clone(),
            Arc::new(self.email.clone()),
            grace,
        )
    }
}
