//! Postgres transaction handle for the inventory core

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, Transaction};

use super::{books::BOOK_COLUMNS, borrow_records, InventoryTx};
use crate::{
    error::{AppError, AppResult},
    models::{Book, BorrowRecord},
};

/// Wraps a sqlx transaction; sqlx rolls back on drop if `commit` never ran.
pub struct PgInventoryTx {
    tx: Transaction<'static, Postgres>,
}

impl PgInventoryTx {
    pub fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl InventoryTx for PgInventoryTx {
    async fn lock_book_for_update(&mut self, id: i32) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(&format!(
            "SELECT {} FROM books WHERE id = $1 FOR UPDATE",
            BOOK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(book)
    }

    async fn save_book(&mut self, book: &Book) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(&format!(
            r#"
            UPDATE books
            SET title = $2, author = $3, summary = $4, cover_path = $5,
                stock = $6, total_stock = $7, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            BOOK_COLUMNS
        ))
        .bind(book.id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.summary)
        .bind(&book.cover_path)
        .bind(book.stock)
        .bind(book.total_stock)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book.id)))
    }

    async fn delete_book(&mut self, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }
        Ok(())
    }

    async fn find_outstanding(&mut self, user_id: i32, book_id: i32) -> AppResult<Option<BorrowRecord>> {
        borrow_records::find_outstanding(&mut *self.tx, user_id, book_id).await
    }

    async fn insert_record(
        &mut self,
        user_id: i32,
        book_id: i32,
        borrow_date: DateTime<Utc>,
    ) -> AppResult<BorrowRecord> {
        borrow_records::insert(&mut *self.tx, user_id, book_id, borrow_date).await
    }

    async fn mark_returned(&mut self, record_id: i32, return_date: DateTime<Utc>) -> AppResult<BorrowRecord> {
        borrow_records::mark_returned(&mut *self.tx, record_id, return_date).await
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
