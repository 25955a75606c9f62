//! Overdue reminder scanner

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::time;

use crate::{
    config::ScannerConfig,
    error::AppResult,
    models::borrow::BorrowRecord,
    repository::BorrowLedger,
};

use super::email::Notifier;

pub const REMINDER_SUBJECT: &str = "Book Return Reminder";

/// Counts from one scan
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    pub matched: usize,
    pub notified: usize,
    pub failed: usize,
}

fn reminder_body(record: &BorrowRecord) -> String {
    format!(
        "Dear {name},\n\n\
         This is a reminder that your borrowed book \"{title}\" was due on {due}.\n\
         Please return it as soon as possible.\n\n\
         Thank you!",
        name = record.borrower.name,
        title = record.book_title,
        due = record.due_date.format("%d %b %Y"),
    )
}

pub struct OverdueScanner {
    ledger: Arc<dyn BorrowLedger>,
    notifier: Arc<dyn Notifier>,
    grace: Duration,
}

impl OverdueScanner {
    pub fn new(ledger: Arc<dyn BorrowLedger>, notifier: Arc<dyn Notifier>, grace: Duration) -> Self {
        Self {
            ledger,
            notifier,
            grace,
        }
    }

    /// Remind every borrower whose book is overdue by more than the grace
    /// window and who has not been reminded yet.
    ///
    /// A failed delivery leaves that record unmarked for the next run and
    /// does not stop the others.
    pub async fn scan_and_notify(&self, now: DateTime<Utc>) -> AppResult<ScanReport> {
        let overdue = self.ledger.find_overdue_unnotified(now - self.grace).await?;
        let mut report = ScanReport {
            matched: overdue.len(),
            ..ScanReport::default()
        };

        for record in &overdue {
            if let Err(e) = self
                .notifier
                .send(&record.borrower.email, REMINDER_SUBJECT, &reminder_body(record))
                .await
            {
                tracing::warn!(borrow_id = record.id, error = %e, "Failed to send overdue reminder");
                report.failed += 1;
                continue;
            }

            match self.ledger.mark_notified(record.id).await {
                Ok(_) => report.notified += 1,
                Err(e) => {
                    tracing::error!(borrow_id = record.id, error = %e, "Reminder sent but not recorded");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Run forever on a fixed interval
    pub async fn run(self, config: ScannerConfig) {
        let mut ticker = time::interval(time::Duration::from_secs(config.interval_secs.max(1)));
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.scan_and_notify(Utc::now()).await {
                Ok(report) if report.matched > 0 => tracing::info!(
                    matched = report.matched,
                    notified = report.notified,
                    failed = report.failed,
                    "Overdue scan finished"
                ),
                Ok(_) => tracing::debug!("Overdue scan found nothing"),
                Err(e) => tracing::error!(error = %e, "Overdue scan failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::AppError,
        models::{book::CreateBook, borrow::NewBorrow, user::Borrower},
        repository::{memory::MemoryStore, BookStore},
        services::email::MockNotifier,
    };
    use rust_decimal_macros::dec;

    async fn ledger_with_overdue(count: i32) -> (MemoryStore, DateTime<Utc>) {
        let store = MemoryStore::new();
        let now = Utc::now();
        let book = BookStore::create(
            &store,
            &CreateBook {
                title: "Dune".to_string(),
                author: "Frank Herbert".to_string(),
                description: "Desert planet".to_string(),
                price: dec!(499),
                quantity: count,
            },
        )
        .await
        .unwrap();

        for id in 1..=count {
            let borrower = Borrower {
                id,
                name: format!("Reader {}", id),
                email: format!("reader{}@example.com", id),
            };
            // Due nine days ago
            let new = NewBorrow::new(book.id, &borrower, now - Duration::days(16));
            store.checkout(&new).await.unwrap();
        }

        (store, now)
    }

    #[tokio::test]
    async fn one_failed_delivery_does_not_stop_the_scan() {
        let (store, now) = ledger_with_overdue(3).await;
        let ledger: Arc<dyn BorrowLedger> = Arc::new(store.clone());

        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .withf(|to, subject, _| to == "reader2@example.com" && subject == REMINDER_SUBJECT)
            .times(1)
            .returning(|_, _, _| Err(AppError::Internal("smtp down".to_string())));
        notifier
            .expect_send()
            .withf(|to, _, body| to != "reader2@example.com" && body.contains("Dune"))
            .times(2)
            .returning(|_, _, _| Ok(()));

        let scanner = OverdueScanner::new(ledger.clone(), Arc::new(notifier), Duration::hours(24));
        let report = scanner.scan_and_notify(now).await.unwrap();

        assert_eq!(report, ScanReport { matched: 3, notified: 2, failed: 1 });

        let pending = ledger.find_overdue_unnotified(now).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].borrower.email, "reader2@example.com");
    }

    #[tokio::test]
    async fn records_within_grace_are_left_alone() {
        let (store, now) = ledger_with_overdue(1).await;
        let mut notifier = MockNotifier::new();
        notifier.expect_send().never();

        // Nine days late, but a ten day grace window
        let scanner = OverdueScanner::new(Arc::new(store), Arc::new(notifier), Duration::days(10));
        let report = scanner.scan_and_notify(now).await.unwrap();

        assert_eq!(report, ScanReport::default());
    }

    #[test]
    fn reminder_names_borrower_and_title() {
        let now = Utc::now();
        let borrower = Borrower {
            id: 1,
            name: "Meera".to_string(),
            email: "meera@example.com".to_string(),
        };
        let new = NewBorrow::new(3, &borrower, now);
        let record = BorrowRecord {
            id: 1,
            borrower: new.borrower,
            book_id: 3,
            book_title: "Gitanjali".to_string(),
            price: dec!(120),
            borrow_date: new.borrow_date,
            due_date: new.due_date,
            returned: false,
            return_date: None,
            fine: dec!(0),
            notified: false,
        };

        let body = reminder_body(&record);
        assert!(body.starts_with("Dear Meera,"));
        assert!(body.contains("\"Gitanjali\""));
    }
}
