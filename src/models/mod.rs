//! Data models for Biblio

pub mod book;
pub mod borrow;
pub mod user;

// Re-export commonly used types
pub use book::{Book, BookQuery, CreateBook};
pub use borrow::{BorrowFilter, BorrowRecord, BorrowerSnapshot, NewBorrow, ReturnReceipt};
pub use user::{Borrower, Role, User, UserClaims};
