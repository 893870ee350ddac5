//! In-process storage engine.
//!
//! Rows live in ordered maps behind a single `parking_lot` mutex that is only
//! ever held for the duration of a synchronous read or apply. Row locks are
//! per-book `tokio` mutexes owned by the transaction holding them, so a
//! second transaction on the same book parks until the first one commits or
//! is dropped. Transactions stage their writes and apply them in one step on
//! commit; dropping a transaction discards the staged writes.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};

use super::{InventoryStore, InventoryTx, UserStore};
use crate::{
    error::{AppError, AppResult},
    models::{Book, BookQuery, BorrowRecord, BorrowStatus, NewBook, RecordQuery, Role, User},
};

#[derive(Default)]
struct Tables {
    books: BTreeMap<i32, Book>,
    records: BTreeMap<i32, BorrowRecord>,
    users: BTreeMap<i32, User>,
    book_seq: i32,
    record_seq: i32,
    user_seq: i32,
}

fn next_id(seq: &mut i32) -> i32 {
    *seq += 1;
    *seq
}

type RowLocks = Mutex<HashMap<i32, Arc<RowLock<()>>>>;

pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    row_locks: Arc<RowLocks>,
    lock_timeout: Duration,
}

impl MemoryStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            row_locks: Arc::new(Mutex::new(HashMap::new())),
            lock_timeout,
        }
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn begin(&self) -> AppResult<Box<dyn InventoryTx>> {
        Ok(Box::new(MemoryTx {
            tables: self.tables.clone(),
            row_locks: self.row_locks.clone(),
            lock_timeout: self.lock_timeout,
            held: HashMap::new(),
            books: HashMap::new(),
            records: BTreeMap::new(),
        }))
    }

    async fn get_book(&self, id: i32) -> AppResult<Option<Book>> {
        Ok(self.tables.lock().books.get(&id).cloned())
    }

    async fn find_book(&self, title: &str, author: &str) -> AppResult<Option<Book>> {
        let tables = self.tables.lock();
        Ok(tables
            .books
            .values()
            .find(|b| b.title == title && b.author == author)
            .cloned())
    }

    async fn list_books(&self, query: &BookQuery) -> AppResult<Vec<Book>> {
        let tables = self.tables.lock();
        Ok(tables
            .books
            .values()
            .rev()
            .filter(|b| query.matches(b))
            .cloned()
            .collect())
    }

    async fn create_book(&self, book: &NewBook) -> AppResult<Book> {
        let mut tables = self.tables.lock();

        // books_title_author_key
        if tables
            .books
            .values()
            .any(|b| b.title == book.title && b.author == book.author)
        {
            return Err(AppError::Conflict(format!(
                "A book titled '{}' by {} already exists",
                book.title, book.author
            )));
        }

        let now = Utc::now();
        let id = next_id(&mut tables.book_seq);
        let created = Book {
            id,
            title: book.title.clone(),
            author: book.author.clone(),
            summary: book.summary.clone(),
            cover_path: book.cover_path.clone(),
            initial_stock: book.initial_stock,
            stock: book.initial_stock,
            total_stock: book.initial_stock,
            created_at: now,
            updated_at: now,
        };
        tables.books.insert(id, created.clone());
        Ok(created)
    }

    async fn list_records(&self, query: &RecordQuery) -> AppResult<Vec<BorrowRecord>> {
        let tables = self.tables.lock();
        Ok(tables
            .records
            .values()
            .rev()
            .filter(|r| query.matches(r))
            .cloned()
            .collect())
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get_by_id(&self, id: i32) -> AppResult<Option<User>> {
        Ok(self.tables.lock().users.get(&id).cloned())
    }

    async fn get_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let tables = self.tables.lock();
        Ok(tables.users.values().find(|u| u.username == username).cloned())
    }

    async fn create(&self, username: &str, password_hash: &str, role: Role) -> AppResult<User> {
        let mut tables = self.tables.lock();
        if tables.users.values().any(|u| u.username == username) {
            return Err(AppError::Conflict(format!("User {} already exists", username)));
        }

        let now = Utc::now();
        let id = next_id(&mut tables.user_seq);
        let user = User {
            id,
            username: username.to_string(),
            password: password_hash.to_string(),
            role,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(id, user.clone());
        Ok(user)
    }
}

pub struct MemoryTx {
    tables: Arc<Mutex<Tables>>,
    row_locks: Arc<RowLocks>,
    lock_timeout: Duration,
    held: HashMap<i32, OwnedMutexGuard<()>>,
    /// Staged book rows; `None` marks a deletion
    books: HashMap<i32, Option<Book>>,
    records: BTreeMap<i32, BorrowRecord>,
}

impl MemoryTx {
    fn read_book(&self, id: i32) -> Option<Book> {
        match self.books.get(&id) {
            Some(staged) => staged.clone(),
            None => self.tables.lock().books.get(&id).cloned(),
        }
    }

    fn read_record(&self, id: i32) -> Option<BorrowRecord> {
        match self.records.get(&id) {
            Some(staged) => Some(staged.clone()),
            None => self.tables.lock().records.get(&id).cloned(),
        }
    }

    fn outstanding(&self, user_id: i32, book_id: i32) -> Option<BorrowRecord> {
        let is_match = |r: &&BorrowRecord| {
            r.user_id == user_id && r.book_id == book_id && r.is_outstanding()
        };

        if let Some(staged) = self.records.values().find(is_match) {
            return Some(staged.clone());
        }
        let tables = self.tables.lock();
        tables
            .records
            .values()
            .filter(|r| !self.records.contains_key(&r.id))
            .find(is_match)
            .cloned()
    }
}

#[async_trait]
impl InventoryTx for MemoryTx {
    async fn lock_book_for_update(&mut self, id: i32) -> AppResult<Option<Book>> {
        if !self.held.contains_key(&id) {
            // Only live books get a lock entry; commit drops the entry of a deleted one.
            let lock = {
                let mut row_locks = self.row_locks.lock();
                if !self.tables.lock().books.contains_key(&id) {
                    return Ok(None);
                }
                row_locks.entry(id).or_default().clone()
            };
            let guard = tokio::time::timeout(self.lock_timeout, lock.lock_owned())
                .await
                .map_err(|_| {
                    AppError::Conflict(format!("Timed out waiting for the lock on book {}", id))
                })?;

            // Deleted while we were waiting
            if !self.tables.lock().books.contains_key(&id) {
                return Ok(None);
            }
            self.held.insert(id, guard);
        }
        Ok(self.read_book(id))
    }

    async fn save_book(&mut self, book: &Book) -> AppResult<Book> {
        let mut current = self
            .read_book(book.id)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book.id)))?;

        current.title = book.title.clone();
        current.author = book.author.clone();
        current.summary = book.summary.clone();
        current.cover_path = book.cover_path.clone();
        current.stock = book.stock;
        current.total_stock = book.total_stock;
        current.updated_at = Utc::now();

        self.books.insert(book.id, Some(current.clone()));
        Ok(current)
    }

    async fn delete_book(&mut self, id: i32) -> AppResult<()> {
        if self.read_book(id).is_none() {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }
        self.books.insert(id, None);
        Ok(())
    }

    async fn find_outstanding(&mut self, user_id: i32, book_id: i32) -> AppResult<Option<BorrowRecord>> {
        Ok(self.outstanding(user_id, book_id))
    }

    async fn insert_record(
        &mut self,
        user_id: i32,
        book_id: i32,
        borrow_date: DateTime<Utc>,
    ) -> AppResult<BorrowRecord> {
        // borrow_records_one_outstanding
        if self.outstanding(user_id, book_id).is_some() {
            return Err(AppError::Conflict(format!(
                "User {} already has book {} on loan",
                user_id, book_id
            )));
        }

        let id = next_id(&mut self.tables.lock().record_seq);
        let now = Utc::now();
        let record = BorrowRecord {
            id,
            user_id,
            book_id,
            borrow_date,
            return_date: None,
            status: BorrowStatus::Borrowed,
            created_at: now,
            updated_at: now,
        };
        self.records.insert(id, record.clone());
        Ok(record)
    }

    async fn mark_returned(&mut self, record_id: i32, return_date: DateTime<Utc>) -> AppResult<BorrowRecord> {
        let mut record = self
            .read_record(record_id)
            .filter(BorrowRecord::is_outstanding)
            .ok_or_else(|| {
                AppError::NotFound(format!("Outstanding borrow record {} not found", record_id))
            })?;

        record.return_date = Some(return_date);
        record.status = BorrowStatus::Returned;
        record.updated_at = Utc::now();
        self.records.insert(record_id, record.clone());
        Ok(record)
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let MemoryTx {
            tables,
            row_locks,
            held,
            books,
            records,
            ..
        } = *self;

        let mut deleted = Vec::new();
        {
            let mut tables = tables.lock();
            for (id, staged) in books {
                match staged {
                    Some(book) => {
                        tables.books.insert(id, book);
                    }
                    None => {
                        tables.books.remove(&id);
                        deleted.push(id);
                    }
                }
            }
            tables.records.extend(records);
        }

        if !deleted.is_empty() {
            let mut row_locks = row_locks.lock();
            for id in &deleted {
                row_locks.remove(id);
            }
        }

        // Row locks are released only once the writes are visible.
        drop(held);
        Ok(())
    }
}
