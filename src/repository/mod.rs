//! Repository layer for catalog, ledger and account storage.
//!
//! The inventory core talks to storage through [`InventoryStore`] and the
//! transaction handle it hands out, [`InventoryTx`]. Postgres is the
//! production engine; [`memory::MemoryStore`] implements the same contract
//! in-process for development and tests.

pub mod books;
pub mod borrow_records;
pub mod memory;
pub mod transaction;
pub mod users;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::{Book, BookQuery, BorrowRecord, NewBook, RecordQuery, Role, User},
};

/// Catalog and ledger storage with transactional, row-locked writes.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Open a transaction. Dropping the handle without committing rolls it back.
    async fn begin(&self) -> AppResult<Box<dyn InventoryTx>>;

    async fn get_book(&self, id: i32) -> AppResult<Option<Book>>;

    async fn find_book(&self, title: &str, author: &str) -> AppResult<Option<Book>>;

    /// Books matching every provided filter, newest first
    async fn list_books(&self, query: &BookQuery) -> AppResult<Vec<Book>>;

    async fn create_book(&self, book: &NewBook) -> AppResult<Book>;

    /// Ledger rows matching the query, newest first
    async fn list_records(&self, query: &RecordQuery) -> AppResult<Vec<BorrowRecord>>;

    /// Cheap connectivity check for readiness probes
    async fn ping(&self) -> AppResult<()>;
}

/// An open transaction against the catalog and the ledger.
#[async_trait]
pub trait InventoryTx: Send {
    /// Read a book and hold an exclusive lock on its row until the
    /// transaction ends.
    async fn lock_book_for_update(&mut self, id: i32) -> AppResult<Option<Book>>;

    /// Persist every mutable column of a locked book.
    async fn save_book(&mut self, book: &Book) -> AppResult<Book>;

    async fn delete_book(&mut self, id: i32) -> AppResult<()>;

    /// The borrowed-status record for (user, book), if any
    async fn find_outstanding(&mut self, user_id: i32, book_id: i32) -> AppResult<Option<BorrowRecord>>;

    async fn insert_record(
        &mut self,
        user_id: i32,
        book_id: i32,
        borrow_date: DateTime<Utc>,
    ) -> AppResult<BorrowRecord>;

    async fn mark_returned(&mut self, record_id: i32, return_date: DateTime<Utc>) -> AppResult<BorrowRecord>;

    async fn commit(self: Box<Self>) -> AppResult<()>;
}

/// Account storage
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_by_id(&self, id: i32) -> AppResult<Option<User>>;

    async fn get_by_username(&self, username: &str) -> AppResult<Option<User>>;

    /// Insert a user; a taken username is a `Conflict`.
    async fn create(&self, username: &str, password_hash: &str, role: Role) -> AppResult<User>;
}

/// Main repository struct holding the storage engines
#[derive(Clone)]
pub struct Repository {
    pub inventory: Arc<dyn InventoryStore>,
    pub users: Arc<dyn UserStore>,
}

impl Repository {
    /// Create a Postgres-backed repository with the given database pool
    pub fn postgres(pool: Pool<Postgres>, lock_timeout: Duration) -> Self {
        Self {
            inventory: Arc::new(books::PgInventoryStore::new(pool.clone(), lock_timeout)),
            users: Arc::new(users::PgUserStore::new(pool)),
        }
    }

    /// Create an in-process repository; contents are lost on shutdown
    pub fn in_memory(lock_timeout: Duration) -> Self {
        let store = Arc::new(memory::MemoryStore::new(lock_timeout));
        Self {
            inventory: store.clone(),
            users: store,
        }
    }
}

/// Escape LIKE wildcards so user input only ever matches literally.
pub(crate) fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}
