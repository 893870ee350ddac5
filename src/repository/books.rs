//! Books repository (Postgres) for catalog operations

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{Pool, Postgres, QueryBuilder};

use super::{borrow_records, like_pattern, transaction::PgInventoryTx, InventoryStore, InventoryTx};
use crate::{
    error::{AppError, AppResult},
    models::{Book, BookQuery, BorrowRecord, NewBook, RecordQuery},
};

pub(super) const BOOK_COLUMNS: &str = "id, title, author, summary, cover_path, \
     initial_stock, stock, total_stock, created_at, updated_at";

#[derive(Clone)]
pub struct PgInventoryStore {
    pool: Pool<Postgres>,
    lock_timeout: Duration,
}

impl PgInventoryStore {
    pub fn new(pool: Pool<Postgres>, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }
}

#[async_trait]
impl InventoryStore for PgInventoryStore {
    async fn begin(&self) -> AppResult<Box<dyn InventoryTx>> {
        let mut tx = self.pool.begin().await?;

        // SET cannot take bind parameters; the value is a plain integer.
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await?;

        Ok(Box::new(PgInventoryTx::new(tx)))
    }

    async fn get_book(&self, id: i32) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(&format!("SELECT {} FROM books WHERE id = $1", BOOK_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(book)
    }

    async fn find_book(&self, title: &str, author: &str) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(&format!(
            "SELECT {} FROM books WHERE title = $1 AND author = $2",
            BOOK_COLUMNS
        ))
        .bind(title)
        .bind(author)
        .fetch_optional(&self.pool)
        .await?;
        Ok(book)
    }

    async fn list_books(&self, query: &BookQuery) -> AppResult<Vec<Book>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM books WHERE 1=1", BOOK_COLUMNS));

        let filters = [
            ("title", &query.title),
            ("author", &query.author),
            ("summary", &query.summary),
        ];
        for (column, term) in filters {
            if let Some(term) = term.as_deref().filter(|t| !t.is_empty()) {
                builder
                    .push(format!(" AND {} ILIKE ", column))
                    .push_bind(like_pattern(term));
            }
        }
        builder.push(" ORDER BY id DESC");

        let books = builder.build_query_as::<Book>().fetch_all(&self.pool).await?;
        Ok(books)
    }

    async fn create_book(&self, book: &NewBook) -> AppResult<Book> {
        let created = sqlx::query_as::<_, Book>(&format!(
            r#"
            INSERT INTO books (title, author, summary, cover_path, initial_stock, stock, total_stock)
            VALUES ($1, $2, $3, $4, $5, $5, $5)
            RETURNING {}
            "#,
            BOOK_COLUMNS
        ))
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.summary)
        .bind(&book.cover_path)
        .bind(book.initial_stock)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)
        .map_err(|e| {
            if e.is_unique_violation() {
                AppError::Conflict(format!(
                    "A book titled '{}' by {} already exists",
                    book.title, book.author
                ))
            } else {
                e
            }
        })?;

        Ok(created)
    }

    async fn list_records(&self, query: &RecordQuery) -> AppResult<Vec<BorrowRecord>> {
        borrow_records::list(&self.pool, query).await
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
