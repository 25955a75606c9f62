//! In-process store for development and tests.
//!
//! All collections live behind one mutex, and every operation finishes its
//! checks and writes inside a single critical section without awaiting, so a
//! cancelled caller can never leave a step half-applied.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::{
    error::{AppError, AppResult, ConflictKind, Entity},
    models::{
        book::{Book, BookQuery, CreateBook},
        borrow::{BorrowFilter, BorrowRecord, NewBorrow},
        user::{normalize_email, Role, User},
    },
    services::fines::FinePolicy,
};

use super::{BookStore, BorrowLedger, BorrowerDirectory};

#[derive(Default)]
struct MemoryState {
    books: BTreeMap<i32, Book>,
    borrows: BTreeMap<i32, BorrowRecord>,
    users: BTreeMap<i32, User>,
    /// (borrower_id, book_id) of every unreturned record
    active: HashSet<(i32, i32)>,
    next_book_id: i32,
    next_borrow_id: i32,
    next_user_id: i32,
}

fn next_id(counter: &mut i32) -> i32 {
    *counter += 1;
    *counter
}

fn newest_first(records: &mut [BorrowRecord]) {
    records.sort_by(|a, b| b.borrow_date.cmp(&a.borrow_date).then(b.id.cmp(&a.id)));
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account; accounts are otherwise managed outside this service
    pub async fn insert_user(&self, name: &str, email: &str, role: Role) -> User {
        let mut state = self.state.lock().await;
        let id = next_id(&mut state.next_user_id);
        let user = User {
            id,
            name: name.to_string(),
            email: normalize_email(email),
            role,
            account_verified: true,
            created_at: Utc::now(),
        };
        state.users.insert(id, user.clone());
        user
    }

    /// Change an account's display name, as the account service would
    pub async fn rename_user(&self, id: i32, name: &str) -> AppResult<User> {
        let mut state = self.state.lock().await;
        let user = state.users.get_mut(&id).ok_or(AppError::NotFound(Entity::User))?;
        user.name = name.to_string();
        Ok(user.clone())
    }

    /// Drop a catalog entry without the on-loan guard, the way an edit made
    /// directly in storage would
    pub async fn discard_book(&self, id: i32) -> Option<Book> {
        self.state.lock().await.books.remove(&id)
    }
}

#[async_trait]
impl BookStore for MemoryStore {
    async fn get(&self, id: i32) -> AppResult<Book> {
        let state = self.state.lock().await;
        state.books.get(&id).cloned().ok_or(AppError::NotFound(Entity::Book))
    }

    async fn list(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        let state = self.state.lock().await;
        let needle = query.search().map(str::to_lowercase);

        let mut matching: Vec<&Book> = state
            .books
            .values()
            .filter(|b| match &needle {
                Some(q) => b.title.to_lowercase().contains(q) || b.author.to_lowercase().contains(q),
                None => true,
            })
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit() as usize)
            .cloned()
            .collect();

        Ok((page, total))
    }

    async fn create(&self, book: &CreateBook) -> AppResult<Book> {
        let mut state = self.state.lock().await;
        let id = next_id(&mut state.next_book_id);
        let now = Utc::now();
        let mut created = Book {
            id,
            title: book.title.clone(),
            author: book.author.clone(),
            description: book.description.clone(),
            price: book.price,
            quantity: book.quantity,
            availability: false,
            created_at: now,
            updated_at: now,
        };
        created.sync_availability();
        state.books.insert(id, created.clone());
        Ok(created)
    }

    async fn delete(&self, id: i32) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if !state.books.contains_key(&id) {
            return Err(AppError::NotFound(Entity::Book));
        }
        if state.active.iter().any(|(_, book_id)| *book_id == id) {
            return Err(AppError::Conflict(ConflictKind::BookOnLoan));
        }
        state.books.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl BorrowLedger for MemoryStore {
    async fn get(&self, id: i32) -> AppResult<BorrowRecord> {
        let state = self.state.lock().await;
        state.borrows.get(&id).cloned().ok_or(AppError::NotFound(Entity::Borrow))
    }

    async fn checkout(&self, borrow: &NewBorrow) -> AppResult<BorrowRecord> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let book = state
            .books
            .get_mut(&borrow.book_id)
            .ok_or(AppError::NotFound(Entity::Book))?;
        if book.quantity < 1 {
            return Err(AppError::Unavailable);
        }
        let key = (borrow.borrower.id, borrow.book_id);
        if state.active.contains(&key) {
            return Err(AppError::Conflict(ConflictKind::AlreadyBorrowed));
        }

        book.quantity -= 1;
        book.sync_availability();
        book.updated_at = borrow.borrow_date;
        let (price, title) = (book.price, book.title.clone());

        let id = next_id(&mut state.next_borrow_id);
        let record = BorrowRecord {
            id,
            borrower: borrow.borrower.clone(),
            book_id: borrow.book_id,
            book_title: title,
            price,
            borrow_date: borrow.borrow_date,
            due_date: borrow.due_date,
            returned: false,
            return_date: None,
            fine: Decimal::ZERO,
            notified: false,
        };
        state.active.insert(key);
        state.borrows.insert(id, record.clone());

        Ok(record)
    }

    async fn close(
        &self,
        id: i32,
        returned_at: DateTime<Utc>,
        policy: &FinePolicy,
    ) -> AppResult<BorrowRecord> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let record = state.borrows.get_mut(&id).ok_or(AppError::NotFound(Entity::Borrow))?;
        if record.returned {
            return Err(AppError::Conflict(ConflictKind::AlreadyReturned));
        }
        let book = state
            .books
            .get_mut(&record.book_id)
            .ok_or(AppError::NotFound(Entity::Book))?;

        book.quantity += 1;
        book.sync_availability();
        book.updated_at = returned_at;

        record.returned = true;
        record.return_date = Some(returned_at);
        record.fine = policy.assess(record.due_date, returned_at);
        state.active.remove(&(record.borrower.id, record.book_id));

        Ok(record.clone())
    }

    async fn list_by_borrower(&self, borrower_id: i32) -> AppResult<Vec<BorrowRecord>> {
        let state = self.state.lock().await;
        let mut records: Vec<BorrowRecord> = state
            .borrows
            .values()
            .filter(|r| r.borrower.id == borrower_id)
            .cloned()
            .collect();
        newest_first(&mut records);
        Ok(records)
    }

    async fn list(&self, filter: &BorrowFilter) -> AppResult<Vec<BorrowRecord>> {
        let state = self.state.lock().await;
        let mut records: Vec<BorrowRecord> =
            state.borrows.values().filter(|r| filter.matches(r)).cloned().collect();
        newest_first(&mut records);
        Ok(records)
    }

    async fn find_overdue_unnotified(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<BorrowRecord>> {
        let state = self.state.lock().await;
        let mut records: Vec<BorrowRecord> = state
            .borrows
            .values()
            .filter(|r| !r.returned && !r.notified && r.due_date < cutoff)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.due_date);
        Ok(records)
    }

    async fn mark_notified(&self, id: i32) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        match state.borrows.get_mut(&id) {
            Some(record) if !record.notified && !record.returned => {
                record.notified = true;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(AppError::NotFound(Entity::Borrow)),
        }
    }
}

#[async_trait]
impl BorrowerDirectory for MemoryStore {
    async fn find_by_email(&self, email: &str) -> AppResult<User> {
        let email = normalize_email(email);
        let state = self.state.lock().await;
        state
            .users
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(AppError::NotFound(Entity::User))
    }
}
