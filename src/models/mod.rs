//! Data models for Shelfkeeper

pub mod book;
pub mod borrow_record;
pub mod user;

// Re-export commonly used types
pub use book::{Book, BookQuery, CreateBook, DeleteOutcome, NewBook, UpdateBook};
pub use borrow_record::{BorrowRecord, BorrowStatus, RecordQuery};
pub use user::{Role, User, UserClaims};
